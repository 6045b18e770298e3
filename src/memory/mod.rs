//! Entry service: CRUD, tier rules, namespace scoping, batch operations,
//! search orchestration, TTL sweeping

pub mod consolidate;
pub mod decay;
pub mod dedup;
pub mod importance;
pub mod namespace;

pub use consolidate::ConsolidationService;
pub use decay::DecayService;
pub use dedup::DedupService;
pub use importance::ImportanceService;
pub use namespace::{NamespaceResolver, SHARED_NAMESPACE};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::embedding::Embedder;
use crate::error::{MnemoError, Result};
use crate::search::reciprocal_rank_fusion;
use crate::storage::{queries, Storage};
use crate::text::tokenizer;
use crate::types::*;

/// Parameters for `MemoryService::store`
#[derive(Debug, Clone, Default)]
pub struct StoreRequest {
    pub content: String,
    pub content_type: ContentType,
    pub tier: MemoryTier,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub agent_id: Option<String>,
    pub ttl_seconds: Option<i64>,
    pub namespace: Option<String>,
}

impl StoreRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Service for memory operations
#[derive(Clone)]
pub struct MemoryService {
    storage: Storage,
    embedder: Arc<dyn Embedder>,
    settings: Arc<Settings>,
    resolver: NamespaceResolver,
}

impl MemoryService {
    pub fn new(storage: Storage, embedder: Arc<dyn Embedder>, settings: Arc<Settings>) -> Self {
        let resolver = NamespaceResolver::new(settings.default_namespace.clone());
        Self {
            storage,
            embedder,
            settings,
            resolver,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn resolver(&self) -> &NamespaceResolver {
        &self.resolver
    }

    fn validate_content(&self, content: &str) -> Result<()> {
        if content.is_empty() {
            return Err(MnemoError::Validation("content cannot be empty".to_string()));
        }
        if content.chars().count() > self.settings.max_content_length {
            return Err(MnemoError::Validation(format!(
                "content exceeds maximum length of {} characters",
                self.settings.max_content_length
            )));
        }
        Ok(())
    }

    fn build_memory(&self, req: &StoreRequest, namespace: String) -> Memory {
        let now = Utc::now();

        // Short-term entries pick up the configured default TTL when the
        // caller gives none
        let ttl = req.ttl_seconds.or(match req.tier {
            MemoryTier::ShortTerm => Some(self.settings.short_term_ttl_seconds),
            _ => None,
        });
        let expires_at = ttl.map(|secs| now + chrono::Duration::seconds(secs));

        Memory {
            id: new_id(),
            content: req.content.clone(),
            content_type: req.content_type,
            tier: req.tier,
            tags: req.tags.clone(),
            metadata: req.metadata.clone(),
            agent_id: req.agent_id.clone(),
            created_at: now,
            updated_at: now,
            expires_at,
            importance_score: 0.5,
            access_count: 0,
            last_accessed_at: None,
            consolidated_from: None,
            namespace,
            schema_id: None,
            structured_content: None,
            version: 1,
        }
    }

    /// Store a new memory entry with its document embedding
    pub async fn store(&self, req: StoreRequest) -> Result<Memory> {
        self.validate_content(&req.content)?;

        let explicit = req.namespace.is_some();
        let namespace = self.resolver.resolve(req.namespace.as_deref());
        self.resolver.validate_shared_write(&namespace, explicit)?;

        let memory = self.build_memory(&req, namespace);
        let embedding = self.embedder.embed(&memory.content, false)?;

        self.storage
            .with_transaction(|conn| queries::insert_memory(conn, &memory, &embedding))?;

        Ok(memory)
    }

    /// Store a typed memory carrying schema linkage and structured fields
    pub(crate) async fn store_with_schema(
        &self,
        req: StoreRequest,
        schema_id: String,
        structured_content: HashMap<String, serde_json::Value>,
    ) -> Result<Memory> {
        self.validate_content(&req.content)?;

        let explicit = req.namespace.is_some();
        let namespace = self.resolver.resolve(req.namespace.as_deref());
        self.resolver.validate_shared_write(&namespace, explicit)?;

        let mut memory = self.build_memory(&req, namespace);
        memory.schema_id = Some(schema_id);
        memory.structured_content = Some(structured_content);

        let embedding = self.embedder.embed(&memory.content, false)?;
        self.storage
            .with_transaction(|conn| queries::insert_memory(conn, &memory, &embedding))?;

        Ok(memory)
    }

    /// Get a memory by id, logging the access
    pub async fn get(&self, id: &str) -> Result<Option<Memory>> {
        let rate_limit = self.settings.access_log_rate_limit_seconds;

        self.storage.with_connection(|conn| {
            let Some(_memory) = queries::find_memory(conn, id)? else {
                return Ok(None);
            };

            queries::log_access(conn, id, "get", rate_limit)?;
            // Re-read to surface the updated access fields
            queries::find_memory(conn, id)
        })
    }

    /// Update a memory through the whitelisted field set
    ///
    /// The pre-image is snapshotted and a content change regenerates the
    /// document embedding, all in one transaction.
    pub async fn update(&self, id: &str, update: MemoryUpdate) -> Result<Option<Memory>> {
        self.update_with_reason(id, update, None).await
    }

    pub async fn update_with_reason(
        &self,
        id: &str,
        update: MemoryUpdate,
        change_reason: Option<String>,
    ) -> Result<Option<Memory>> {
        if let Some(ref content) = update.content {
            self.validate_content(content)?;
        }

        let new_embedding = update
            .content
            .as_deref()
            .map(|content| self.embedder.embed(content, false))
            .transpose()?;

        self.storage.with_transaction(|conn| {
            let updated = queries::update_memory(conn, id, &update, change_reason.as_deref())?;

            if updated.is_some() {
                if let Some(ref embedding) = new_embedding {
                    queries::replace_embedding(conn, id, embedding)?;
                }
            }
            Ok(updated)
        })
    }

    /// Delete one memory; returns the deleted id list
    pub async fn delete(&self, id: &str) -> Result<Vec<String>> {
        let deleted = self
            .storage
            .with_transaction(|conn| queries::delete_memory(conn, id))?;

        Ok(if deleted { vec![id.to_string()] } else { vec![] })
    }

    /// Delete by id list, tier, or age; returns the deleted ids
    pub async fn delete_many(
        &self,
        ids: Option<Vec<String>>,
        tier: Option<MemoryTier>,
        older_than: Option<DateTime<Utc>>,
    ) -> Result<Vec<String>> {
        self.storage.with_transaction(|conn| {
            let mut targets: Vec<String> = ids.unwrap_or_default();

            if tier.is_some() || older_than.is_some() {
                targets.extend(queries::select_ids(conn, tier, older_than)?);
            }
            targets.sort();
            targets.dedup();

            if targets.is_empty() {
                return Ok(vec![]);
            }

            queries::delete_memories(conn, &targets)?;
            Ok(targets)
        })
    }

    /// List memories with filters and pagination
    pub async fn list(
        &self,
        filters: ListFilters,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Memory>, i64)> {
        let limit = limit.min(1000);
        self.storage
            .with_connection(|conn| queries::list_memories(conn, &filters, limit, offset))
    }

    /// Delete memories whose TTL has elapsed; returns the deleted count
    pub async fn cleanup_expired(&self) -> Result<usize> {
        self.storage.with_transaction(|conn| {
            let ids = queries::expired_ids(conn, Utc::now())?;
            if ids.is_empty() {
                return Ok(0);
            }
            queries::delete_memories(conn, &ids)?;
            tracing::debug!(count = ids.len(), "expired memories removed");
            Ok(ids.len())
        })
    }

    // -----------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------

    /// Search memories by semantic similarity, keywords, or both
    pub async fn search(&self, req: SearchRequest) -> Result<Vec<SearchResult>> {
        let mut filters = req.filters.clone();
        filters.namespace = Some(self.resolver.resolve(filters.namespace.as_deref()));

        let top_k = if req.top_k == 0 {
            self.settings.search_default_top_k
        } else {
            req.top_k
        };

        let mut results = match req.mode {
            SearchMode::Semantic => self.semantic_search(&req.query, top_k, &filters)?,
            SearchMode::Keyword => self.keyword_only_search(&req.query, top_k, &filters)?,
            SearchMode::Hybrid => self.hybrid_search(&req.query, top_k, &filters)?,
        };

        // Similarity cutoff applies where a semantic signal exists
        if req.min_similarity > 0.0 && req.mode != SearchMode::Keyword {
            results.retain(|r| r.similarity >= req.min_similarity);
        }

        match req.sort_by {
            SortBy::Similarity => {}
            SortBy::Importance => {
                results.sort_by(|a, b| {
                    b.memory
                        .importance_score
                        .partial_cmp(&a.memory.importance_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            }
            SortBy::Combined => {
                let w = req.importance_weight;
                for r in &mut results {
                    let primary = r.combined_score.unwrap_or(r.similarity);
                    r.combined_score =
                        Some((1.0 - w) * primary + w * r.memory.importance_score);
                }
                results.sort_by(|a, b| {
                    b.combined_score
                        .unwrap_or(0.0)
                        .partial_cmp(&a.combined_score.unwrap_or(0.0))
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            }
        }

        // Access logging for entries surfaced by search
        let rate_limit = self.settings.access_log_rate_limit_seconds;
        self.storage.with_connection(|conn| {
            for r in &results {
                queries::log_access(conn, &r.memory.id, "search", rate_limit)?;
            }
            Ok(())
        })?;

        Ok(results)
    }

    fn semantic_search(
        &self,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>> {
        let embedding = self.embedder.embed(query, true)?;

        let rows = self
            .storage
            .with_connection(|conn| queries::vector_search(conn, &embedding, top_k, filters))?;

        Ok(rows
            .into_iter()
            .map(|(memory, similarity)| SearchResult {
                memory,
                similarity,
                keyword_score: 0.0,
                combined_score: None,
            })
            .collect())
    }

    fn keyword_only_search(
        &self,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>> {
        let fts_query = tokenizer().tokenize_query(query);

        self.storage.with_connection(|conn| {
            let pairs = queries::keyword_search(conn, &fts_query, top_k, filters)?;

            let mut results = Vec::with_capacity(pairs.len());
            for (id, score) in pairs {
                if let Some(memory) = queries::find_memory(conn, &id)? {
                    results.push(SearchResult {
                        memory,
                        similarity: 0.0,
                        keyword_score: score.abs() as f32,
                        combined_score: None,
                    });
                }
            }
            Ok(results)
        })
    }

    fn hybrid_search(
        &self,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>> {
        let embedding = self.embedder.embed(query, true)?;
        let fts_query = tokenizer().tokenize_query(query);
        let fetch_k = top_k * 2;

        self.storage.with_connection(|conn| {
            let semantic = queries::vector_search(conn, &embedding, fetch_k, filters)?;
            let keyword = queries::keyword_search(conn, &fts_query, fetch_k, filters)?;

            let semantic_list: Vec<(String, f32)> = semantic
                .iter()
                .map(|(m, sim)| (m.id.clone(), *sim))
                .collect();
            let keyword_list: Vec<(String, f32)> = keyword
                .iter()
                .map(|(id, score)| (id.clone(), score.abs() as f32))
                .collect();

            let fused = reciprocal_rank_fusion(
                &[semantic_list, keyword_list],
                self.settings.rrf_constant,
            );

            let semantic_map: HashMap<&str, &(Memory, f32)> =
                semantic.iter().map(|pair| (pair.0.id.as_str(), pair)).collect();
            let keyword_map: HashMap<&str, f64> =
                keyword.iter().map(|(id, s)| (id.as_str(), *s)).collect();

            let mut results = Vec::new();
            for (id, rrf_score) in fused.into_iter().take(top_k) {
                let (memory, similarity) = match semantic_map.get(id.as_str()) {
                    Some((memory, sim)) => (memory.clone(), *sim),
                    None => match queries::find_memory(conn, &id)? {
                        Some(memory) => (memory, 0.0),
                        None => continue,
                    },
                };

                results.push(SearchResult {
                    memory,
                    similarity,
                    keyword_score: keyword_map
                        .get(id.as_str())
                        .map(|s| s.abs() as f32)
                        .unwrap_or(0.0),
                    combined_score: Some(rrf_score),
                });
            }
            Ok(results)
        })
    }

    /// Find memories similar to an existing one
    pub async fn find_similar(
        &self,
        id: &str,
        top_k: usize,
        min_similarity: f32,
        namespace: Option<&str>,
        search_scope: SearchScope,
        exclude_linked: bool,
    ) -> Result<Vec<SearchResult>> {
        let namespace = self.resolver.resolve(namespace);

        self.storage.with_connection(|conn| {
            if queries::find_memory(conn, id)?.is_none() {
                return Err(MnemoError::NotFound(format!("memory {}", id)));
            }

            let Some(embedding) = queries::get_embedding(conn, id)? else {
                return Ok(vec![]);
            };

            let filters = SearchFilters {
                namespace: Some(namespace.clone()),
                search_scope,
                ..Default::default()
            };

            let linked = if exclude_linked {
                queries::linked_ids(conn, id)?
            } else {
                Default::default()
            };

            // +1 to account for the entry itself
            let rows = queries::vector_search(conn, &embedding, top_k + 1, &filters)?;

            let results = rows
                .into_iter()
                .filter(|(m, sim)| {
                    m.id != id && *sim >= min_similarity && !linked.contains(&m.id)
                })
                .take(top_k)
                .map(|(memory, similarity)| SearchResult {
                    memory,
                    similarity,
                    keyword_score: 0.0,
                    combined_score: None,
                })
                .collect();

            Ok(results)
        })
    }

    // -----------------------------------------------------------------
    // Batch operations
    // -----------------------------------------------------------------

    fn check_batch_size(&self, len: usize) -> Result<()> {
        if len == 0 {
            return Err(MnemoError::Validation(
                "batch must contain at least one item".to_string(),
            ));
        }
        if len > self.settings.batch_max_size {
            return Err(MnemoError::ResourceExhausted(format!(
                "batch size {} exceeds maximum of {}",
                len, self.settings.batch_max_size
            )));
        }
        Ok(())
    }

    /// Store multiple memories with one batched embedding call
    ///
    /// `Rollback` aborts the whole batch on any validation or insert
    /// failure; `Stop` commits successes preceding the first failure;
    /// `Continue` records failures and commits every success.
    pub async fn batch_store(
        &self,
        items: Vec<BatchStoreItem>,
        on_error: BatchErrorMode,
        namespace: Option<&str>,
    ) -> Result<BatchOutcome> {
        self.check_batch_size(items.len())?;

        let explicit = namespace.is_some();
        let resolved = self.resolver.resolve(namespace);
        self.resolver.validate_shared_write(&resolved, explicit)?;

        // Validate every item before any embedding work; rollback aborts
        // on the first invalid item
        let mut validation: Vec<Option<String>> = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match self.validate_content(&item.content) {
                Ok(()) => validation.push(None),
                Err(e) => {
                    if on_error == BatchErrorMode::Rollback {
                        return Err(MnemoError::Validation(format!("item {}: {}", i, e)));
                    }
                    validation.push(Some(e.to_string()));
                }
            }
        }

        // One batched embedding call over the valid items
        let valid_texts: Vec<&str> = items
            .iter()
            .zip(&validation)
            .filter(|(_, err)| err.is_none())
            .map(|(item, _)| item.content.as_str())
            .collect();
        let mut valid_embeddings = if valid_texts.is_empty() {
            vec![]
        } else {
            self.embedder.embed_batch(&valid_texts, false)?
        }
        .into_iter();

        let memories: Vec<Memory> = items
            .iter()
            .map(|item| {
                self.build_memory(
                    &StoreRequest {
                        content: item.content.clone(),
                        content_type: item.content_type,
                        tier: item.tier,
                        tags: item.tags.clone(),
                        metadata: item.metadata.clone(),
                        agent_id: item.agent_id.clone(),
                        ttl_seconds: item.ttl_seconds,
                        namespace: None,
                    },
                    resolved.clone(),
                )
            })
            .collect();

        self.storage.with_transaction(|conn| {
            let mut ids = Vec::new();
            let mut errors = Vec::new();

            'items: for (i, memory) in memories.iter().enumerate() {
                let item_result = match &validation[i] {
                    Some(message) => Err(MnemoError::Validation(message.clone())),
                    None => {
                        let embedding = valid_embeddings
                            .next()
                            .ok_or_else(|| MnemoError::Dependency(
                                "embedding batch shorter than input".to_string(),
                            ))?;
                        queries::insert_memory(conn, memory, &embedding)
                    }
                };

                match item_result {
                    Ok(()) => ids.push(memory.id.clone()),
                    Err(e) => match on_error {
                        BatchErrorMode::Rollback => return Err(e),
                        BatchErrorMode::Stop => {
                            errors.push(BatchItemError {
                                item: i.to_string(),
                                error: e.to_string(),
                            });
                            break 'items;
                        }
                        BatchErrorMode::Continue => {
                            errors.push(BatchItemError {
                                item: i.to_string(),
                                error: e.to_string(),
                            });
                        }
                    },
                }
            }

            Ok(BatchOutcome {
                success_count: ids.len(),
                error_count: errors.len(),
                ids,
                errors,
            })
        })
    }

    /// Update multiple memories with batched embedding regeneration
    pub async fn batch_update(
        &self,
        updates: Vec<BatchUpdateItem>,
        on_error: BatchErrorMode,
    ) -> Result<BatchOutcome> {
        self.check_batch_size(updates.len())?;

        // Validate changed contents up front, then batch-embed the valid ones
        let mut validation: Vec<Option<String>> = Vec::with_capacity(updates.len());
        for item in &updates {
            match item.update.content.as_deref() {
                Some(content) => match self.validate_content(content) {
                    Ok(()) => validation.push(None),
                    Err(e) => {
                        if on_error == BatchErrorMode::Rollback {
                            return Err(MnemoError::Validation(format!(
                                "item {}: {}",
                                item.id, e
                            )));
                        }
                        validation.push(Some(e.to_string()));
                    }
                },
                None => validation.push(None),
            }
        }

        let mut embedding_map: HashMap<usize, Vec<f32>> = HashMap::new();
        let changed: Vec<(usize, &str)> = updates
            .iter()
            .enumerate()
            .filter(|(i, _)| validation[*i].is_none())
            .filter_map(|(i, u)| u.update.content.as_deref().map(|c| (i, c)))
            .collect();

        if !changed.is_empty() {
            let texts: Vec<&str> = changed.iter().map(|(_, c)| *c).collect();
            let embeddings = self.embedder.embed_batch(&texts, false)?;
            for ((i, _), embedding) in changed.into_iter().zip(embeddings) {
                embedding_map.insert(i, embedding);
            }
        }

        self.storage.with_transaction(|conn| {
            let mut ids = Vec::new();
            let mut errors = Vec::new();

            for (i, item) in updates.iter().enumerate() {
                let item_result = (|| -> Result<()> {
                    if let Some(message) = &validation[i] {
                        return Err(MnemoError::Validation(message.clone()));
                    }

                    let updated = queries::update_memory(conn, &item.id, &item.update, None)?;
                    if updated.is_none() {
                        return Err(MnemoError::NotFound(format!("memory {}", item.id)));
                    }

                    if let Some(embedding) = embedding_map.get(&i) {
                        queries::replace_embedding(conn, &item.id, embedding)?;
                    }
                    Ok(())
                })();

                match item_result {
                    Ok(()) => ids.push(item.id.clone()),
                    Err(e) => match on_error {
                        BatchErrorMode::Rollback => return Err(e),
                        BatchErrorMode::Stop => {
                            errors.push(BatchItemError {
                                item: item.id.clone(),
                                error: e.to_string(),
                            });
                            break;
                        }
                        BatchErrorMode::Continue => {
                            errors.push(BatchItemError {
                                item: item.id.clone(),
                                error: e.to_string(),
                            });
                        }
                    },
                }
            }

            Ok(BatchOutcome {
                success_count: ids.len(),
                error_count: errors.len(),
                ids,
                errors,
            })
        })
    }

    /// Spawn the background TTL sweeper
    pub fn spawn_ttl_sweeper(&self) -> TtlSweeper {
        let service = self.clone();
        let interval = Duration::from_secs(self.settings.cleanup_interval_seconds);
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = service.cleanup_expired().await {
                            tracing::warn!(error = %e, "ttl sweep failed");
                        }
                    }
                    changed = cancel_rx.changed() => {
                        if changed.is_err() || *cancel_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        TtlSweeper {
            cancel: cancel_tx,
            task,
        }
    }
}

/// Handle for the background TTL sweeper
pub struct TtlSweeper {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TtlSweeper {
    /// Signal cancellation and wait for the task to drain (<= 5s)
    pub async fn shutdown(self) {
        let _ = self.cancel.send(true);
        let _ = tokio::time::timeout(Duration::from_secs(5), self.task).await;
    }
}
