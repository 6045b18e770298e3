//! Mnemo - embedded memory engine for AI agents
//!
//! Stores text fragments indexed by dense vectors and full-text tokens,
//! serves semantic / keyword / hybrid queries, and maintains the lifecycle
//! layer around them: tiered TTL storage, importance scoring and decay,
//! deduplication, consolidation, versioning, and a typed link graph with
//! cascade notifications.

pub mod archive;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod knowledge;
pub mod memory;
pub mod schema;
pub mod search;
pub mod storage;
pub mod text;
pub mod types;
pub mod versioning;

pub use config::Settings;
pub use error::{MnemoError, Result};
pub use storage::Storage;
pub use types::*;

use std::sync::Arc;

use archive::ArchiveService;
use context::ContextBuilder;
use embedding::{Embedder, TfIdfEmbedder};
use graph::GraphService;
use knowledge::KnowledgeService;
use memory::{
    ConsolidationService, DecayService, DedupService, ImportanceService, MemoryService,
};
use schema::SchemaService;
use search::SemanticCache;
use versioning::VersioningService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// One fully wired Mnemo instance
///
/// All cross-service wiring is explicit construction; swap the embedder for
/// a test double or a real model behind the `Embedder` trait.
pub struct Mnemo {
    pub settings: Arc<Settings>,
    pub storage: Storage,
    pub embedder: Arc<dyn Embedder>,
    pub memory: MemoryService,
    pub graph: GraphService,
    pub importance: ImportanceService,
    pub decay: DecayService,
    pub dedup: DedupService,
    pub consolidation: ConsolidationService,
    pub versioning: VersioningService,
    pub schema: SchemaService,
    pub knowledge: KnowledgeService,
    pub archive: ArchiveService,
    pub cache: Arc<SemanticCache>,
    pub context: ContextBuilder,
}

impl Mnemo {
    /// Open an instance with the given settings and embedder
    pub fn open_with(settings: Settings, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let settings = Arc::new(settings.clamped());
        let storage = Storage::open(&settings.database_path, embedder.dimensions())?;
        Ok(Self::wire(settings, storage, embedder))
    }

    /// Open an instance backed by an in-memory database (for testing)
    pub fn open_in_memory(settings: Settings, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let settings = Arc::new(settings.clamped());
        let storage = Storage::open_in_memory(embedder.dimensions())?;
        Ok(Self::wire(settings, storage, embedder))
    }

    /// Open with settings from the environment and the built-in embedder
    pub fn open() -> Result<Self> {
        let settings = Settings::from_env();
        let embedder: Arc<dyn Embedder> =
            Arc::new(TfIdfEmbedder::new(settings.embedding_dimensions));
        Self::open_with(settings, embedder)
    }

    fn wire(settings: Arc<Settings>, storage: Storage, embedder: Arc<dyn Embedder>) -> Self {
        let memory = MemoryService::new(storage.clone(), Arc::clone(&embedder), settings.clone());
        let graph = GraphService::new(storage.clone());
        let cache = Arc::new(SemanticCache::new(
            Arc::clone(&embedder),
            settings.cache_max_size,
            settings.cache_ttl_seconds,
            settings.cache_similarity_threshold,
        ));

        Self {
            importance: ImportanceService::new(storage.clone(), settings.clone()),
            decay: DecayService::new(storage.clone()),
            dedup: DedupService::new(storage.clone(), Arc::clone(&embedder)),
            consolidation: ConsolidationService::new(
                storage.clone(),
                Arc::clone(&embedder),
                settings.clone(),
            ),
            versioning: VersioningService::new(storage.clone(), Arc::clone(&embedder)),
            schema: SchemaService::new(storage.clone(), memory.clone()),
            knowledge: KnowledgeService::new(storage.clone(), Arc::clone(&embedder)),
            archive: ArchiveService::new(storage.clone(), Arc::clone(&embedder)),
            context: ContextBuilder::new(
                memory.clone(),
                graph.clone(),
                Arc::clone(&cache),
                settings.clone(),
            ),
            memory,
            graph,
            cache,
            storage,
            embedder,
            settings,
        }
    }
}
