//! Memory consolidation
//!
//! Collapses a set of related memories into one summarized entry whose
//! content is an extractive summary of the concatenated sources and whose
//! `consolidated_from` records the inputs.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::embedding::Embedder;
use crate::error::{MnemoError, Result};
use crate::storage::{queries, Storage};
use crate::text::extractive_summary;
use crate::types::{new_id, ContentType, Memory, MemoryTier};

/// Character budget for the consolidated summary
const SUMMARY_MAX_CHARS: usize = 4000;

/// Options for a consolidation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidateOptions {
    pub memory_ids: Vec<String>,
    /// Keep the source memories instead of deleting them
    #[serde(default)]
    pub preserve_originals: bool,
    pub namespace: Option<String>,
}

/// Service for memory consolidation
#[derive(Clone)]
pub struct ConsolidationService {
    storage: Storage,
    embedder: Arc<dyn Embedder>,
    settings: Arc<Settings>,
}

impl ConsolidationService {
    pub fn new(storage: Storage, embedder: Arc<dyn Embedder>, settings: Arc<Settings>) -> Self {
        Self {
            storage,
            embedder,
            settings,
        }
    }

    /// Consolidate the given memories into a single summarized entry
    pub async fn consolidate(&self, options: ConsolidateOptions) -> Result<Memory> {
        let count = options.memory_ids.len();
        if count < self.settings.consolidation_min_memories
            || count > self.settings.consolidation_max_memories
        {
            return Err(MnemoError::Validation(format!(
                "consolidation requires between {} and {} memories, got {}",
                self.settings.consolidation_min_memories,
                self.settings.consolidation_max_memories,
                count
            )));
        }

        // Fetch sources up front; all must exist
        let sources = self.storage.with_connection(|conn| {
            let mut sources = Vec::with_capacity(count);
            for id in &options.memory_ids {
                match queries::find_memory(conn, id)? {
                    Some(memory) => sources.push(memory),
                    None => return Err(MnemoError::NotFound(format!("memory {}", id))),
                }
            }
            Ok(sources)
        })?;

        let namespace = options
            .namespace
            .clone()
            .unwrap_or_else(|| sources[0].namespace.clone());

        let combined = sources
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let summary = extractive_summary(&combined, SUMMARY_MAX_CHARS);

        let mut tags: Vec<String> = Vec::new();
        let mut metadata: HashMap<String, serde_json::Value> = HashMap::new();
        for source in &sources {
            for tag in &source.tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
            metadata = queries::merge_metadata(&metadata, &source.metadata);
        }

        let now = Utc::now();
        let consolidated = Memory {
            id: new_id(),
            content: summary,
            content_type: ContentType::Text,
            tier: MemoryTier::LongTerm,
            tags,
            metadata,
            agent_id: None,
            created_at: now,
            updated_at: now,
            expires_at: None,
            importance_score: 0.5,
            access_count: 0,
            last_accessed_at: None,
            consolidated_from: Some(options.memory_ids.clone()),
            namespace,
            schema_id: None,
            structured_content: None,
            version: 1,
        };

        let embedding = self.embedder.embed(&consolidated.content, false)?;

        self.storage.with_transaction(|conn| {
            queries::insert_memory(conn, &consolidated, &embedding)?;

            if !options.preserve_originals {
                queries::delete_memories(conn, &options.memory_ids)?;
            }
            Ok(())
        })?;

        tracing::info!(
            sources = count,
            id = %consolidated.id,
            preserved = options.preserve_originals,
            "memories consolidated"
        );

        Ok(consolidated)
    }
}
