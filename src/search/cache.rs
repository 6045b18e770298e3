//! Semantic result cache
//!
//! In-memory cache for context-building results keyed by
//! SHA-256(namespace:query). Lookups fall back to an LSH sidecar over the
//! cached query embeddings, so a near-identical query can reuse a result
//! without an exact key match. Entries expire by TTL and are evicted LRU
//! at capacity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::lsh::LshIndex;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::types::{CacheStats, ContextResult};

/// One cached result
struct CacheEntry {
    /// Original `namespace:query` string, used by pattern invalidation
    key_text: String,
    query_embedding: Vec<f32>,
    result: ContextResult,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    hit_count: u64,
    last_accessed: Option<DateTime<Utc>>,
}

/// Semantic cache with TTL and LRU eviction
pub struct SemanticCache {
    entries: DashMap<String, CacheEntry>,
    lsh: Mutex<LshIndex>,
    embedder: Arc<dyn Embedder>,
    max_size: usize,
    ttl_seconds: u64,
    similarity_threshold: f32,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SemanticCache {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        max_size: usize,
        ttl_seconds: u64,
        similarity_threshold: f32,
    ) -> Self {
        let dimensions = embedder.dimensions();
        Self {
            entries: DashMap::new(),
            lsh: Mutex::new(LshIndex::with_dimensions(dimensions)),
            embedder,
            max_size,
            ttl_seconds,
            similarity_threshold,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn cache_key(query: &str, namespace: Option<&str>) -> (String, String) {
        let key_text = match namespace {
            Some(ns) => format!("{}:{}", ns, query),
            None => query.to_string(),
        };
        let mut hasher = Sha256::new();
        hasher.update(key_text.as_bytes());
        (hex::encode(hasher.finalize()), key_text)
    }

    /// Look up a cached result for a query
    pub async fn get(&self, query: &str, namespace: Option<&str>) -> Result<Option<ContextResult>> {
        let query_embedding = self.embedder.embed(query, true)?;
        let (key, _) = Self::cache_key(query, namespace);
        let now = Utc::now();

        // Exact key
        if let Some(mut entry) = self.entries.get_mut(&key) {
            if entry.expires_at < now {
                drop(entry);
                self.entries.remove(&key);
                self.lsh.lock().remove(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }

            entry.hit_count += 1;
            entry.last_accessed = Some(now);
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(entry.result.clone()));
        }

        // Similarity fallback over cached query embeddings
        let candidates = self
            .lsh
            .lock()
            .find_similar(&query_embedding, 5, self.similarity_threshold);

        for (candidate_key, _similarity) in candidates {
            if let Some(mut entry) = self.entries.get_mut(&candidate_key) {
                if entry.expires_at < now {
                    continue;
                }
                entry.hit_count += 1;
                entry.last_accessed = Some(now);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(entry.result.clone()));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    /// Store a result under the query
    pub async fn put(
        &self,
        query: &str,
        namespace: Option<&str>,
        result: ContextResult,
    ) -> Result<()> {
        let query_embedding = self.embedder.embed(query, true)?;
        let (key, key_text) = Self::cache_key(query, namespace);
        let now = Utc::now();

        if self.entries.len() >= self.max_size && !self.entries.contains_key(&key) {
            self.evict_lru();
        }

        self.lsh.lock().add(&key, &query_embedding);
        self.entries.insert(
            key,
            CacheEntry {
                key_text,
                query_embedding,
                result,
                created_at: now,
                expires_at: now + chrono::Duration::seconds(self.ttl_seconds as i64),
                hit_count: 0,
                last_accessed: None,
            },
        );

        Ok(())
    }

    /// Remove entries matching a substring of `namespace:query`,
    /// or everything when no pattern is given. Returns removed count.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        match pattern {
            None => {
                let count = self.entries.len();
                self.entries.clear();
                self.lsh.lock().clear();
                count
            }
            Some(pattern) => {
                let keys: Vec<String> = self
                    .entries
                    .iter()
                    .filter(|e| e.value().key_text.contains(pattern))
                    .map(|e| e.key().clone())
                    .collect();

                let mut lsh = self.lsh.lock();
                for key in &keys {
                    self.entries.remove(key);
                    lsh.remove(key);
                }
                keys.len()
            }
        }
    }

    /// Remove expired entries from both the map and the LSH sidecar
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().expires_at < now)
            .map(|e| e.key().clone())
            .collect();

        let mut lsh = self.lsh.lock();
        for key in &expired {
            self.entries.remove(key);
            lsh.remove(key);
        }

        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "cache entries expired");
        }
        expired.len()
    }

    fn evict_lru(&self) {
        let lru_key = self
            .entries
            .iter()
            .min_by_key(|e| e.value().last_accessed.unwrap_or(e.value().created_at))
            .map(|e| e.key().clone());

        if let Some(key) = lru_key {
            self.entries.remove(&key);
            self.lsh.lock().remove(&key);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            total_entries: self.entries.len(),
            hit_count: hits,
            miss_count: misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }

    /// Embedding stored for a cached query, if present (for diagnostics)
    pub fn cached_embedding(&self, query: &str, namespace: Option<&str>) -> Option<Vec<f32>> {
        let (key, _) = Self::cache_key(query, namespace);
        self.entries.get(&key).map(|e| e.query_embedding.clone())
    }

    /// Spawn the background TTL sweeper, running every ttl/2 seconds
    pub fn spawn_sweeper(self: &Arc<Self>) -> CacheSweeper {
        let cache = Arc::clone(self);
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let interval = Duration::from_secs((self.ttl_seconds / 2).max(1));

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        cache.sweep_expired();
                    }
                    changed = cancel_rx.changed() => {
                        if changed.is_err() || *cancel_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        CacheSweeper {
            cancel: cancel_tx,
            task,
        }
    }
}

/// Handle for the background cache sweeper
pub struct CacheSweeper {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CacheSweeper {
    /// Signal cancellation and wait for the task to drain (<= 5s)
    pub async fn shutdown(self) {
        let _ = self.cancel.send(true);
        let _ = tokio::time::timeout(Duration::from_secs(5), self.task).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::TfIdfEmbedder;
    use crate::types::ContextResult;

    fn empty_result() -> ContextResult {
        ContextResult {
            memories: vec![],
            total_tokens: 0,
            token_budget: 1000,
            memories_count: 0,
            summarized_count: 0,
            related_count: 0,
            cache_hit: false,
        }
    }

    fn cache() -> SemanticCache {
        SemanticCache::new(Arc::new(TfIdfEmbedder::new(64)), 100, 3600, 0.95)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = cache();

        cache.put("what is rust", None, empty_result()).await.unwrap();
        let hit = cache.get("what is rust", None).await.unwrap();
        assert!(hit.is_some());

        let stats = cache.stats();
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.total_entries, 1);
    }

    #[tokio::test]
    async fn test_namespace_isolates_keys() {
        let cache = cache();

        cache
            .put("query", Some("ns-a"), empty_result())
            .await
            .unwrap();
        assert!(cache.get("query", Some("ns-b")).await.unwrap().is_none());
        assert!(cache.get("query", Some("ns-a")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_pattern() {
        let cache = cache();

        cache.put("alpha query", None, empty_result()).await.unwrap();
        cache.put("beta query", None, empty_result()).await.unwrap();

        let removed = cache.invalidate(Some("alpha"));
        assert_eq!(removed, 1);
        assert!(cache.get("alpha query", None).await.unwrap().is_none());
        assert!(cache.get("beta query", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let cache = cache();
        cache.put("one", None, empty_result()).await.unwrap();
        cache.put("two", None, empty_result()).await.unwrap();

        assert_eq!(cache.invalidate(None), 2);
        assert_eq!(cache.stats().total_entries, 0);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        // Zero TTL: the entry is dead by the next lookup
        let cache = SemanticCache::new(Arc::new(TfIdfEmbedder::new(64)), 100, 0, 0.95);

        cache.put("soon gone", None, empty_result()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(cache.get("soon gone", None).await.unwrap().is_none());
        // The expired lookup already dropped the entry
        assert_eq!(cache.stats().total_entries, 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_expired() {
        let cache = SemanticCache::new(Arc::new(TfIdfEmbedder::new(64)), 100, 0, 0.95);

        cache.put("stale one", None, empty_result()).await.unwrap();
        cache.put("stale two", None, empty_result()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(cache.sweep_expired(), 2);
        assert_eq!(cache.stats().total_entries, 0);
    }

    #[tokio::test]
    async fn test_sweeper_cancel_and_drain() {
        let cache = Arc::new(cache());
        let sweeper = cache.spawn_sweeper();
        // Shutdown returns promptly even though the sweep interval is long
        sweeper.shutdown().await;
    }

    #[tokio::test]
    async fn test_lru_eviction_at_capacity() {
        let cache = SemanticCache::new(Arc::new(TfIdfEmbedder::new(64)), 100, 3600, 0.95);

        // Fill to capacity, then touch the first entry so the second is LRU
        for i in 0..100 {
            cache
                .put(&format!("query number {}", i), None, empty_result())
                .await
                .unwrap();
        }
        cache.get("query number 0", None).await.unwrap();

        cache.put("overflow entry", None, empty_result()).await.unwrap();
        assert_eq!(cache.stats().total_entries, 100);
        assert!(cache.get("query number 0", None).await.unwrap().is_some());
    }
}
