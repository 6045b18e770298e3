//! Shared test fixtures
#![allow(dead_code)]

use std::sync::Arc;

use mnemo::embedding::TfIdfEmbedder;
use mnemo::memory::StoreRequest;
use mnemo::{Memory, Mnemo, Settings};

pub const TEST_DIMS: usize = 64;

/// In-memory instance with the deterministic hashing embedder
pub fn test_instance() -> Mnemo {
    test_instance_with(Settings::default())
}

pub fn test_instance_with(mut settings: Settings) -> Mnemo {
    settings.embedding_dimensions = TEST_DIMS;
    Mnemo::open_in_memory(settings, Arc::new(TfIdfEmbedder::new(TEST_DIMS)))
        .expect("open in-memory instance")
}

/// Store a plain long-term memory and return it
pub async fn store(mnemo: &Mnemo, content: &str) -> Memory {
    mnemo
        .memory
        .store(StoreRequest::new(content))
        .await
        .expect("store memory")
}

/// Store with tags
pub async fn store_tagged(mnemo: &Mnemo, content: &str, tags: &[&str]) -> Memory {
    let mut req = StoreRequest::new(content);
    req.tags = tags.iter().map(|t| t.to_string()).collect();
    mnemo.memory.store(req).await.expect("store memory")
}
