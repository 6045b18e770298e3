//! Core types for Mnemo

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a memory (UUIDv4 string)
pub type MemoryId = String;

/// Generate a fresh opaque id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A memory entry in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier
    pub id: MemoryId,
    /// Main content of the memory
    pub content: String,
    /// Content classification
    #[serde(default)]
    pub content_type: ContentType,
    /// Lifecycle tier
    #[serde(default)]
    pub tier: MemoryTier,
    /// Tags for categorization (unordered)
    #[serde(default)]
    pub tags: Vec<String>,
    /// Arbitrary metadata as JSON
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Owning agent, if any
    pub agent_id: Option<String>,
    /// When the memory was created
    pub created_at: DateTime<Utc>,
    /// When the memory was last updated
    pub updated_at: DateTime<Utc>,
    /// When the memory expires (None = never)
    pub expires_at: Option<DateTime<Utc>>,
    /// Importance score (0.0 - 1.0)
    #[serde(default = "default_importance")]
    pub importance_score: f32,
    /// Number of times accessed
    #[serde(default)]
    pub access_count: i64,
    /// When the memory was last accessed
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Source memory ids if this entry was produced by consolidation
    pub consolidated_from: Option<Vec<MemoryId>>,
    /// Logical partition
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Schema this entry conforms to, if typed
    pub schema_id: Option<String>,
    /// Structured fields matching the schema
    pub structured_content: Option<HashMap<String, serde_json::Value>>,
    /// Current version number (>= 1)
    #[serde(default = "default_version")]
    pub version: i64,
}

fn default_importance() -> f32 {
    0.5
}

fn default_version() -> i64 {
    1
}

fn default_namespace() -> String {
    "default".to_string()
}

impl Memory {
    /// Build a new memory with generated id and current timestamps
    pub fn new(content: impl Into<String>, namespace: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            content: content.into(),
            content_type: ContentType::Text,
            tier: MemoryTier::LongTerm,
            tags: vec![],
            metadata: HashMap::new(),
            agent_id: None,
            created_at: now,
            updated_at: now,
            expires_at: None,
            importance_score: 0.5,
            access_count: 0,
            last_accessed_at: None,
            consolidated_from: None,
            namespace: namespace.into(),
            schema_id: None,
            structured_content: None,
            version: 1,
        }
    }
}

/// Content type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    #[default]
    Text,
    Code,
    Json,
    Yaml,
    ImageRef,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Code => "code",
            ContentType::Json => "json",
            ContentType::Yaml => "yaml",
            ContentType::ImageRef => "image-ref",
        }
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(ContentType::Text),
            "code" => Ok(ContentType::Code),
            "json" => Ok(ContentType::Json),
            "yaml" => Ok(ContentType::Yaml),
            "image-ref" | "image_ref" => Ok(ContentType::ImageRef),
            _ => Err(format!("Unknown content type: {}", s)),
        }
    }
}

/// Memory tier for tiered storage
///
/// Tiers influence TTL defaults and eviction but not access semantics:
/// - `ShortTerm`: session-scale context, default TTL applied at store time
/// - `LongTerm`: durable knowledge (default)
/// - `Working`: scratch space for in-flight tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    ShortTerm,
    #[default]
    LongTerm,
    Working,
}

impl MemoryTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryTier::ShortTerm => "short_term",
            MemoryTier::LongTerm => "long_term",
            MemoryTier::Working => "working",
        }
    }
}

impl std::str::FromStr for MemoryTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "short_term" => Ok(MemoryTier::ShortTerm),
            "long_term" => Ok(MemoryTier::LongTerm),
            "working" => Ok(MemoryTier::Working),
            _ => Err(format!("Unknown memory tier: {}", s)),
        }
    }
}

/// Search mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Semantic,
    Keyword,
    Hybrid,
}

/// Namespace scoping for searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    /// Only the given namespace
    #[default]
    Current,
    /// The given namespace plus "shared"
    Shared,
    /// No namespace predicate
    All,
}

/// Result ordering after search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Similarity,
    Importance,
    Combined,
}

/// Search result with scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The matched memory
    pub memory: Memory,
    /// Semantic similarity (0 when the result came from keyword only)
    pub similarity: f32,
    /// |BM25| magnitude (0 when the result came from semantic only)
    #[serde(default)]
    pub keyword_score: f32,
    /// Fused or blended score, when a fusion/blend ran
    pub combined_score: Option<f32>,
}

/// Filters composable over all search modes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    pub tier: Option<MemoryTier>,
    /// All-of tag filter
    pub tags: Option<Vec<String>>,
    pub content_type: Option<ContentType>,
    pub namespace: Option<String>,
    #[serde(default)]
    pub search_scope: SearchScope,
}

/// Options for `MemoryService::search`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: usize,
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default)]
    pub filters: SearchFilters,
    /// Minimum similarity cutoff (semantic/hybrid only)
    #[serde(default)]
    pub min_similarity: f32,
    #[serde(default)]
    pub sort_by: SortBy,
    /// Weight of importance in combined sorting
    #[serde(default = "default_importance_weight")]
    pub importance_weight: f32,
}

fn default_importance_weight() -> f32 {
    0.3
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: 10,
            mode: SearchMode::Semantic,
            filters: SearchFilters::default(),
            min_similarity: 0.0,
            sort_by: SortBy::Similarity,
            importance_weight: 0.3,
        }
    }
}

/// Filters for `MemoryService::list`
#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    pub tier: Option<MemoryTier>,
    pub tags: Option<Vec<String>>,
    pub content_type: Option<ContentType>,
    pub namespace: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

/// Whitelisted field set for `MemoryService::update`
#[derive(Debug, Clone, Default)]
pub struct MemoryUpdate {
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    pub tier: Option<MemoryTier>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

impl MemoryUpdate {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.tags.is_none()
            && self.metadata.is_none()
            && self.tier.is_none()
            && self.expires_at.is_none()
    }
}

/// Error handling mode for batch operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BatchErrorMode {
    /// Abort the whole batch on any failure, no partial effect
    #[default]
    Rollback,
    /// Record failures and keep going
    Continue,
    /// Commit successes up to the first failure, then stop
    Stop,
}

/// One item for `batch_store`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStoreItem {
    pub content: String,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub tier: MemoryTier,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub agent_id: Option<String>,
    pub ttl_seconds: Option<i64>,
}

/// One item for `batch_update`
#[derive(Debug, Clone)]
pub struct BatchUpdateItem {
    pub id: MemoryId,
    pub update: MemoryUpdate,
}

/// Per-item failure inside a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemError {
    /// Index (batch_store) or id (batch_update)
    pub item: String,
    pub error: String,
}

/// Outcome of a batch operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub success_count: usize,
    pub error_count: usize,
    pub ids: Vec<MemoryId>,
    pub errors: Vec<BatchItemError>,
}

// ---------------------------------------------------------------------------
// Links & dependencies
// ---------------------------------------------------------------------------

/// Link type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    #[default]
    Related,
    Parent,
    Child,
    Similar,
    Reference,
    DependsOn,
    DerivedFrom,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Related => "related",
            LinkType::Parent => "parent",
            LinkType::Child => "child",
            LinkType::Similar => "similar",
            LinkType::Reference => "reference",
            LinkType::DependsOn => "depends_on",
            LinkType::DerivedFrom => "derived_from",
        }
    }

    /// Type of the reverse edge created for bidirectional links
    pub fn reversed(&self) -> LinkType {
        match self {
            LinkType::Parent => LinkType::Child,
            LinkType::Child => LinkType::Parent,
            other => *other,
        }
    }
}

impl std::str::FromStr for LinkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "related" => Ok(LinkType::Related),
            "parent" => Ok(LinkType::Parent),
            "child" => Ok(LinkType::Child),
            "similar" => Ok(LinkType::Similar),
            "reference" => Ok(LinkType::Reference),
            "depends_on" => Ok(LinkType::DependsOn),
            "derived_from" => Ok(LinkType::DerivedFrom),
            _ => Err(format!("Unknown link type: {}", s)),
        }
    }
}

/// Directed link between two memories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryLink {
    pub id: String,
    pub source_id: MemoryId,
    pub target_id: MemoryId,
    pub link_type: LinkType,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Link strength (0.0 - 1.0)
    pub strength: f32,
    /// Follow this edge in update-cascade analysis
    pub cascade_on_update: bool,
    /// Follow this edge in delete-cascade analysis
    pub cascade_on_delete: bool,
    pub created_at: DateTime<Utc>,
}

/// Link direction filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkDirection {
    Outgoing,
    Incoming,
    #[default]
    Both,
}

/// Node produced by graph traversal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalNode {
    pub memory_id: MemoryId,
    pub depth: usize,
    /// Link type that led here (None for the start node)
    pub link_type: Option<LinkType>,
    pub path: Vec<MemoryId>,
}

/// Dependency notification types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Update,
    Delete,
    Stale,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Update => "update",
            NotificationType::Delete => "delete",
            NotificationType::Stale => "stale",
        }
    }
}

impl std::str::FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "update" => Ok(NotificationType::Update),
            "delete" => Ok(NotificationType::Delete),
            "stale" => Ok(NotificationType::Stale),
            _ => Err(format!("Unknown notification type: {}", s)),
        }
    }
}

/// Dependency change notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyNotification {
    pub id: String,
    pub source_id: MemoryId,
    pub target_id: MemoryId,
    pub notification_type: NotificationType,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Memory affected by a dependency cascade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffectedMemory {
    pub memory_id: MemoryId,
    pub depth: usize,
    pub link_type: LinkType,
    pub strength: f32,
}

/// Result of dependency impact analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyAnalysis {
    pub source_id: MemoryId,
    pub affected: Vec<AffectedMemory>,
    pub total_affected: usize,
    pub max_depth_reached: usize,
    pub has_cycles: bool,
    /// Cycle paths, longest first
    pub cycle_paths: Vec<Vec<MemoryId>>,
}

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Pre-image snapshot captured before a mutating update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryVersion {
    pub id: String,
    pub memory_id: MemoryId,
    /// The version number this snapshot superseded
    pub version: i64,
    pub content: String,
    pub content_type: ContentType,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub change_reason: Option<String>,
}

/// Version history for a memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionHistory {
    pub memory_id: MemoryId,
    pub current_version: i64,
    /// Snapshot count plus the live version
    pub total_versions: i64,
    pub versions: Vec<MemoryVersion>,
}

/// Difference between two versions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDiff {
    pub memory_id: MemoryId,
    pub old_version: i64,
    pub new_version: i64,
    pub content_changed: bool,
    /// Unified diff over content lines, trimmed to 2000 lines
    pub content_diff: Option<String>,
    pub tags_added: Vec<String>,
    pub tags_removed: Vec<String>,
    /// key -> {old, new}
    pub metadata_changed: HashMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Decay / dedup / consolidation
// ---------------------------------------------------------------------------

/// Decay configuration (singleton row)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayConfig {
    pub enabled: bool,
    /// Importance score threshold (0.0 - 1.0)
    pub threshold: f32,
    /// Days before a memory becomes deletion-eligible
    pub grace_period_days: i64,
    /// Max deletions per run (1 - 10000)
    pub max_delete_per_run: i64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 0.1,
            grace_period_days: 7,
            max_delete_per_run: 100,
            last_run_at: None,
            updated_at: Utc::now(),
        }
    }
}

/// Result of a decay run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayRunResult {
    pub deleted_count: usize,
    pub deleted_ids: Vec<MemoryId>,
    pub failed_ids: Vec<MemoryId>,
    pub errors: Vec<BatchItemError>,
    pub threshold: f32,
    pub grace_period_days: i64,
    pub dry_run: bool,
}

/// A group of duplicate memories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub primary_id: MemoryId,
    pub duplicate_ids: Vec<MemoryId>,
    /// Mean similarity between the primary and each duplicate
    pub avg_similarity: f32,
}

/// Strategy for choosing the surviving memory in a dedup merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    #[default]
    KeepNewest,
    KeepOldest,
    HighestImportance,
}

// ---------------------------------------------------------------------------
// Schemas
// ---------------------------------------------------------------------------

/// Schema field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Datetime,
    Array,
    Object,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Datetime => "datetime",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }
}

/// Schema field definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub indexed: bool,
    /// Optional rules: min, max, pattern, enum
    pub validation: Option<HashMap<String, serde_json::Value>>,
}

/// Memory schema definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySchema {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub version: i64,
    pub fields: Vec<SchemaField>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Knowledge base
// ---------------------------------------------------------------------------

/// Knowledge document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub source: Option<String>,
    pub category: Option<String>,
    pub version: i64,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Chunk of a knowledge document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub chunk_index: usize,
    /// Heading breadcrumb for Markdown-aware chunking
    #[serde(default)]
    pub section_path: Vec<String>,
    pub has_previous: bool,
    pub has_next: bool,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Chunk search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkResult {
    pub chunk: Chunk,
    pub document: Document,
    pub similarity: f32,
}

/// Chunking strategy for document import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    #[default]
    Sentence,
    Paragraph,
    /// Markdown-aware, carries section breadcrumbs
    Semantic,
}

// ---------------------------------------------------------------------------
// Context building
// ---------------------------------------------------------------------------

/// Selection strategy for the context builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContextStrategy {
    #[default]
    Relevance,
    Recency,
    Importance,
    Graph,
}

/// Where a context item came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextSource {
    Direct,
    Related,
}

/// Memory item in a context result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMemory {
    pub id: MemoryId,
    pub content: String,
    pub original_tokens: usize,
    pub tokens: usize,
    pub summarized: bool,
    pub similarity: f32,
    pub importance_score: f32,
    pub created_at: DateTime<Utc>,
    pub source: ContextSource,
    pub depth: usize,
    pub link_type: Option<LinkType>,
}

/// Result of context building
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextResult {
    pub memories: Vec<ContextMemory>,
    pub total_tokens: usize,
    pub token_budget: usize,
    pub memories_count: usize,
    pub summarized_count: usize,
    pub related_count: usize,
    pub cache_hit: bool,
}

/// Parameters for context building
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRequest {
    pub query: String,
    /// Token budget (100 - 128000)
    pub token_budget: usize,
    pub top_k: usize,
    pub include_related: bool,
    /// Graph expansion depth (1 - 5)
    pub max_depth: usize,
    pub auto_summarize: bool,
    pub min_similarity: f32,
    pub namespace: Option<String>,
    pub use_cache: bool,
    #[serde(default)]
    pub strategy: ContextStrategy,
    pub link_types: Option<Vec<LinkType>>,
}

impl ContextRequest {
    pub fn new(query: impl Into<String>, token_budget: usize) -> Self {
        Self {
            query: query.into(),
            token_budget,
            top_k: 20,
            include_related: true,
            max_depth: 2,
            auto_summarize: true,
            min_similarity: 0.5,
            namespace: None,
            use_cache: true,
            strategy: ContextStrategy::Relevance,
            link_types: None,
        }
    }
}

/// Semantic cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    pub hit_rate: f64,
}

// ---------------------------------------------------------------------------
// Export / import
// ---------------------------------------------------------------------------

/// Import mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Clear the main tables, then load
    Replace,
    #[default]
    Merge,
}

/// Conflict policy for merge imports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Existing id wins, archive record dropped
    #[default]
    Skip,
    /// Upsert
    Update,
    /// Abort the import
    Error,
}

/// Result of an export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    pub exported_at: DateTime<Utc>,
    pub schema_version: i64,
    pub counts: HashMap<String, usize>,
    pub file_path: String,
    pub file_size_bytes: u64,
}

/// Result of an import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResult {
    pub imported_at: DateTime<Utc>,
    pub schema_version: i64,
    pub mode: ImportMode,
    pub counts: HashMap<String, usize>,
    pub skipped_count: usize,
    pub error_count: usize,
    pub errors: Vec<BatchItemError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_type_reversal() {
        assert_eq!(LinkType::Parent.reversed(), LinkType::Child);
        assert_eq!(LinkType::Child.reversed(), LinkType::Parent);
        assert_eq!(LinkType::Related.reversed(), LinkType::Related);
        assert_eq!(LinkType::DependsOn.reversed(), LinkType::DependsOn);
    }

    #[test]
    fn test_tier_roundtrip() {
        for tier in [MemoryTier::ShortTerm, MemoryTier::LongTerm, MemoryTier::Working] {
            assert_eq!(tier.as_str().parse::<MemoryTier>().unwrap(), tier);
        }
        assert!("permanent".parse::<MemoryTier>().is_err());
    }

    #[test]
    fn test_content_type_roundtrip() {
        for ct in [
            ContentType::Text,
            ContentType::Code,
            ContentType::Json,
            ContentType::Yaml,
            ContentType::ImageRef,
        ] {
            assert_eq!(ct.as_str().parse::<ContentType>().unwrap(), ct);
        }
    }
}
