//! Duplicate detection and merging
//!
//! Scans a namespace for near-identical memories by embedding similarity.
//! Candidate pairs come from an LSH index when enabled, falling back to a
//! brute-force O(N^2) pass. Merging keeps one primary per group, absorbs
//! tags/metadata, and deletes the duplicates.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::Result;
use crate::search::LshIndex;
use crate::storage::{queries, Storage};
use crate::types::{DuplicateGroup, MemoryUpdate, MergeStrategy};

/// Options for a deduplication pass
#[derive(Debug, Clone)]
pub struct DedupOptions {
    pub namespace: Option<String>,
    pub similarity_threshold: f32,
    pub dry_run: bool,
    pub merge_strategy: MergeStrategy,
    pub merge_metadata: bool,
    pub limit: usize,
    pub use_lsh: bool,
}

impl Default for DedupOptions {
    fn default() -> Self {
        Self {
            namespace: None,
            similarity_threshold: 0.95,
            dry_run: true,
            merge_strategy: MergeStrategy::KeepNewest,
            merge_metadata: true,
            limit: 1000,
            use_lsh: true,
        }
    }
}

/// Outcome of a deduplication pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupOutcome {
    pub groups: Vec<DuplicateGroup>,
    pub total_groups: usize,
    pub total_duplicates: usize,
    pub merged: usize,
    pub dry_run: bool,
    pub algorithm: String,
}

/// Service for duplicate detection and merging
#[derive(Clone)]
pub struct DedupService {
    storage: Storage,
    embedder: Arc<dyn Embedder>,
}

impl DedupService {
    pub fn new(storage: Storage, embedder: Arc<dyn Embedder>) -> Self {
        Self { storage, embedder }
    }

    /// Find duplicate groups within a namespace
    pub async fn find_duplicates(
        &self,
        namespace: &str,
        similarity_threshold: f32,
        limit: usize,
        use_lsh: bool,
    ) -> Result<Vec<DuplicateGroup>> {
        let embeddings = self
            .storage
            .with_connection(|conn| queries::all_embeddings(conn, Some(namespace), Some(limit)))?;

        if embeddings.is_empty() {
            return Ok(vec![]);
        }

        let lsh = if use_lsh {
            let mut index = LshIndex::with_dimensions(self.embedder.dimensions());
            for (id, embedding) in &embeddings {
                index.add(id, embedding);
            }
            Some(index)
        } else {
            None
        };

        let all_ids: Vec<&String> = embeddings.iter().map(|(id, _)| id).collect();
        let by_id: std::collections::HashMap<&str, &Vec<f32>> = embeddings
            .iter()
            .map(|(id, e)| (id.as_str(), e))
            .collect();

        let mut groups = Vec::new();
        let mut processed: HashSet<String> = HashSet::new();

        for (memory_id, embedding) in &embeddings {
            if processed.contains(memory_id) {
                continue;
            }

            let candidates: Vec<String> = match &lsh {
                Some(index) => index
                    .query_candidates(embedding, 100)
                    .into_iter()
                    .collect(),
                None => all_ids.iter().map(|id| (*id).clone()).collect(),
            };

            let mut duplicates = Vec::new();
            let mut similarities = Vec::new();

            for candidate_id in candidates {
                if candidate_id == *memory_id || processed.contains(&candidate_id) {
                    continue;
                }
                let Some(candidate_embedding) = by_id.get(candidate_id.as_str()) else {
                    continue;
                };

                let similarity = cosine_similarity(embedding, candidate_embedding);
                if similarity >= similarity_threshold {
                    duplicates.push(candidate_id.clone());
                    similarities.push(similarity);
                    processed.insert(candidate_id);
                }
            }

            if !duplicates.is_empty() {
                let avg_similarity =
                    similarities.iter().sum::<f32>() / similarities.len() as f32;
                groups.push(DuplicateGroup {
                    primary_id: memory_id.clone(),
                    duplicate_ids: duplicates,
                    avg_similarity,
                });
                processed.insert(memory_id.clone());
            }
        }

        Ok(groups)
    }

    /// Detect and optionally merge duplicates
    pub async fn deduplicate(&self, options: DedupOptions) -> Result<DedupOutcome> {
        let namespace = options
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());

        let groups = self
            .find_duplicates(
                &namespace,
                options.similarity_threshold,
                options.limit,
                options.use_lsh,
            )
            .await?;

        let total_duplicates: usize = groups.iter().map(|g| g.duplicate_ids.len()).sum();

        let mut merged = 0;
        if !options.dry_run {
            for group in &groups {
                match self.merge_group(group, &options) {
                    Ok(count) => merged += count,
                    Err(e) => {
                        tracing::warn!(
                            primary = %group.primary_id,
                            error = %e,
                            "dedup merge failed, continuing"
                        );
                    }
                }
            }
        }

        Ok(DedupOutcome {
            total_groups: groups.len(),
            total_duplicates,
            merged,
            dry_run: options.dry_run,
            algorithm: if options.use_lsh { "lsh" } else { "brute_force" }.to_string(),
            groups,
        })
    }

    fn merge_group(&self, group: &DuplicateGroup, options: &DedupOptions) -> Result<usize> {
        self.storage.with_transaction(|conn| {
            let mut memories = Vec::new();
            for id in std::iter::once(&group.primary_id).chain(group.duplicate_ids.iter()) {
                if let Some(memory) = queries::find_memory(conn, id)? {
                    memories.push(memory);
                }
            }
            if memories.len() < 2 {
                return Ok(0);
            }

            let primary = match options.merge_strategy {
                MergeStrategy::KeepNewest => {
                    memories.iter().max_by_key(|m| m.created_at).cloned()
                }
                MergeStrategy::KeepOldest => {
                    memories.iter().min_by_key(|m| m.created_at).cloned()
                }
                MergeStrategy::HighestImportance => memories
                    .iter()
                    .max_by(|a, b| {
                        a.importance_score
                            .partial_cmp(&b.importance_score)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .cloned(),
            };
            let Some(primary) = primary else {
                return Ok(0);
            };

            let duplicates: Vec<_> = memories
                .into_iter()
                .filter(|m| m.id != primary.id)
                .collect();

            if options.merge_metadata {
                let mut tags: Vec<String> = primary.tags.clone();
                let mut metadata = primary.metadata.clone();
                for dup in &duplicates {
                    for tag in &dup.tags {
                        if !tags.contains(tag) {
                            tags.push(tag.clone());
                        }
                    }
                    metadata = queries::merge_metadata(&metadata, &dup.metadata);
                }

                queries::update_memory(
                    conn,
                    &primary.id,
                    &MemoryUpdate {
                        tags: Some(tags),
                        metadata: Some(metadata),
                        ..Default::default()
                    },
                    Some("dedup merge"),
                )?;
            }

            let mut removed = 0;
            for dup in &duplicates {
                if queries::delete_memory(conn, &dup.id)? {
                    removed += 1;
                }
            }
            Ok(removed)
        })
    }
}
