//! Runtime configuration
//!
//! Every option has a default and can be overridden through `MNEMO_*`
//! environment variables, e.g. `MNEMO_DATABASE_PATH` or
//! `MNEMO_CACHE_TTL_SECONDS`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for a Mnemo instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// SQLite database file path
    pub database_path: String,
    /// Embedding vector dimensions (fixed at migration time, 1..=4096)
    pub embedding_dimensions: usize,
    /// Default TTL for short-term memories when none is given (seconds)
    pub short_term_ttl_seconds: i64,
    /// TTL sweeper cadence in seconds (minimum 60)
    pub cleanup_interval_seconds: u64,
    /// Default number of search results
    pub search_default_top_k: usize,
    /// Maximum batch operation size (<= 1000)
    pub batch_max_size: usize,
    /// Access log dedupe window in seconds
    pub access_log_rate_limit_seconds: i64,
    /// Maximum content length in characters
    pub max_content_length: usize,
    /// Access count where importance frequency saturates
    pub importance_max_accesses: i64,
    /// Reciprocal Rank Fusion constant (k)
    pub rrf_constant: f32,
    /// Minimum memories required for consolidation
    pub consolidation_min_memories: usize,
    /// Maximum memories per consolidation batch
    pub consolidation_max_memories: usize,
    /// Default namespace (None = "default")
    pub default_namespace: Option<String>,
    /// Enable the semantic result cache
    pub cache_enabled: bool,
    /// Maximum number of cache entries
    pub cache_max_size: usize,
    /// Cache entry time-to-live in seconds
    pub cache_ttl_seconds: u64,
    /// Similarity threshold for LSH cache hits
    pub cache_similarity_threshold: f32,
    /// Safety buffer ratio for token budgets (0.0..=0.3)
    pub token_buffer_ratio: f32,
    /// Default maximum depth for graph traversal
    pub graph_max_depth: usize,
    /// Default maximum results from graph traversal
    pub graph_max_results: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
            embedding_dimensions: 384,
            short_term_ttl_seconds: 3600,
            cleanup_interval_seconds: 300,
            search_default_top_k: 10,
            batch_max_size: 100,
            access_log_rate_limit_seconds: 60,
            max_content_length: 1_000_000,
            importance_max_accesses: 100,
            rrf_constant: 60.0,
            consolidation_min_memories: 2,
            consolidation_max_memories: 50,
            default_namespace: None,
            cache_enabled: true,
            cache_max_size: 1000,
            cache_ttl_seconds: 3600,
            cache_similarity_threshold: 0.95,
            token_buffer_ratio: 0.1,
            graph_max_depth: 3,
            graph_max_results: 50,
        }
    }
}

fn default_db_path() -> String {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    cwd.join("data").join("mnemo.db").to_string_lossy().to_string()
}

fn env_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Settings {
    /// Load settings from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut s = Self::default();

        if let Ok(path) = std::env::var("MNEMO_DATABASE_PATH") {
            s.database_path = path;
        }
        if let Some(v) = env_var("MNEMO_EMBEDDING_DIMENSIONS") {
            s.embedding_dimensions = v;
        }
        if let Some(v) = env_var("MNEMO_SHORT_TERM_TTL_SECONDS") {
            s.short_term_ttl_seconds = v;
        }
        if let Some(v) = env_var("MNEMO_CLEANUP_INTERVAL_SECONDS") {
            s.cleanup_interval_seconds = v;
        }
        if let Some(v) = env_var("MNEMO_SEARCH_DEFAULT_TOP_K") {
            s.search_default_top_k = v;
        }
        if let Some(v) = env_var("MNEMO_BATCH_MAX_SIZE") {
            s.batch_max_size = v;
        }
        if let Some(v) = env_var("MNEMO_ACCESS_LOG_RATE_LIMIT_SECONDS") {
            s.access_log_rate_limit_seconds = v;
        }
        if let Some(v) = env_var("MNEMO_MAX_CONTENT_LENGTH") {
            s.max_content_length = v;
        }
        if let Some(v) = env_var("MNEMO_IMPORTANCE_MAX_ACCESSES") {
            s.importance_max_accesses = v;
        }
        if let Some(v) = env_var("MNEMO_RRF_CONSTANT") {
            s.rrf_constant = v;
        }
        if let Some(v) = env_var("MNEMO_CONSOLIDATION_MIN_MEMORIES") {
            s.consolidation_min_memories = v;
        }
        if let Some(v) = env_var("MNEMO_CONSOLIDATION_MAX_MEMORIES") {
            s.consolidation_max_memories = v;
        }
        if let Ok(ns) = std::env::var("MNEMO_DEFAULT_NAMESPACE") {
            if !ns.is_empty() {
                s.default_namespace = Some(ns);
            }
        }
        if let Some(v) = env_var("MNEMO_CACHE_ENABLED") {
            s.cache_enabled = v;
        }
        if let Some(v) = env_var("MNEMO_CACHE_MAX_SIZE") {
            s.cache_max_size = v;
        }
        if let Some(v) = env_var("MNEMO_CACHE_TTL_SECONDS") {
            s.cache_ttl_seconds = v;
        }
        if let Some(v) = env_var("MNEMO_CACHE_SIMILARITY_THRESHOLD") {
            s.cache_similarity_threshold = v;
        }
        if let Some(v) = env_var("MNEMO_TOKEN_BUFFER_RATIO") {
            s.token_buffer_ratio = v;
        }
        if let Some(v) = env_var("MNEMO_GRAPH_MAX_DEPTH") {
            s.graph_max_depth = v;
        }
        if let Some(v) = env_var("MNEMO_GRAPH_MAX_RESULTS") {
            s.graph_max_results = v;
        }

        s.clamped()
    }

    /// Clamp values into their documented ranges
    pub fn clamped(mut self) -> Self {
        self.embedding_dimensions = self.embedding_dimensions.clamp(1, 4096);
        self.cleanup_interval_seconds = self.cleanup_interval_seconds.max(60);
        self.batch_max_size = self.batch_max_size.clamp(1, 1000);
        self.access_log_rate_limit_seconds = self.access_log_rate_limit_seconds.max(1);
        self.importance_max_accesses = self.importance_max_accesses.max(1);
        self.rrf_constant = self.rrf_constant.max(1.0);
        self.consolidation_min_memories = self.consolidation_min_memories.max(2);
        self.consolidation_max_memories = self
            .consolidation_max_memories
            .max(self.consolidation_min_memories);
        self.cache_max_size = self.cache_max_size.clamp(100, 10_000);
        self.cache_ttl_seconds = self.cache_ttl_seconds.clamp(60, 86_400);
        self.cache_similarity_threshold = self.cache_similarity_threshold.clamp(0.8, 1.0);
        self.token_buffer_ratio = self.token_buffer_ratio.clamp(0.0, 0.3);
        self.graph_max_depth = self.graph_max_depth.clamp(1, 10);
        self.graph_max_results = self.graph_max_results.clamp(1, 500);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.embedding_dimensions, 384);
        assert_eq!(s.batch_max_size, 100);
        assert_eq!(s.rrf_constant, 60.0);
        assert!(s.cache_enabled);
    }

    #[test]
    fn test_clamping() {
        let s = Settings {
            cleanup_interval_seconds: 5,
            batch_max_size: 5000,
            token_buffer_ratio: 0.9,
            ..Settings::default()
        }
        .clamped();

        assert_eq!(s.cleanup_interval_seconds, 60);
        assert_eq!(s.batch_max_size, 1000);
        assert!((s.token_buffer_ratio - 0.3).abs() < f32::EPSILON);
    }
}
