//! Entry service integration tests: CRUD, batches, TTL, access logging

mod common;

use common::{store, store_tagged, test_instance, test_instance_with};
use pretty_assertions::assert_eq;

use mnemo::memory::StoreRequest;
use mnemo::types::*;
use mnemo::{MnemoError, Settings};

#[tokio::test]
async fn test_store_get_roundtrip() {
    let mnemo = test_instance();

    let content = "Exact content survives the roundtrip, bytes and all. 日本語も。";
    let stored = store_tagged(&mnemo, content, &["alpha", "beta"]).await;

    let fetched = mnemo.memory.get(&stored.id).await.unwrap().unwrap();
    assert_eq!(fetched.content, content);

    let mut expected_tags = stored.tags.clone();
    let mut actual_tags = fetched.tags.clone();
    expected_tags.sort();
    actual_tags.sort();
    assert_eq!(actual_tags, expected_tags);
    assert_eq!(fetched.namespace, "default");
    assert_eq!(fetched.version, 1);
}

#[tokio::test]
async fn test_store_rejects_empty_and_oversize_content() {
    let settings = Settings {
        max_content_length: 50,
        ..Settings::default()
    };
    let mnemo = test_instance_with(settings);

    let empty = mnemo.memory.store(StoreRequest::new("")).await;
    assert!(matches!(empty, Err(MnemoError::Validation(_))));

    let oversize = mnemo.memory.store(StoreRequest::new("x".repeat(51))).await;
    assert!(matches!(oversize, Err(MnemoError::Validation(_))));
}

#[tokio::test]
async fn test_shared_namespace_requires_explicit_opt_in() {
    let settings = Settings {
        default_namespace: Some("shared".to_string()),
        ..Settings::default()
    };
    let mnemo = test_instance_with(settings);

    // Implicitly landing in "shared" is rejected
    let implicit = mnemo.memory.store(StoreRequest::new("note")).await;
    assert!(matches!(implicit, Err(MnemoError::Validation(_))));

    // Naming it explicitly is allowed
    let mut req = StoreRequest::new("note");
    req.namespace = Some("shared".to_string());
    let explicit = mnemo.memory.store(req).await.unwrap();
    assert_eq!(explicit.namespace, "shared");
}

#[tokio::test]
async fn test_short_term_gets_default_ttl() {
    let mnemo = test_instance();

    let mut req = StoreRequest::new("ephemeral note");
    req.tier = MemoryTier::ShortTerm;
    let memory = mnemo.memory.store(req).await.unwrap();

    let expires = memory.expires_at.expect("short-term entries expire");
    let delta = expires - memory.created_at;
    assert_eq!(delta.num_seconds(), 3600);

    // Long-term entries do not expire by default
    let durable = store(&mnemo, "durable note").await;
    assert!(durable.expires_at.is_none());
}

#[tokio::test]
async fn test_update_increments_version_and_reembeds() {
    let mnemo = test_instance();
    let memory = store(&mnemo, "original content about databases").await;

    let updated = mnemo
        .memory
        .update(
            &memory.id,
            MemoryUpdate {
                content: Some("rewritten content about compilers".to_string()),
                tags: Some(vec!["compilers".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.version, 2);
    assert_eq!(updated.content, "rewritten content about compilers");
    assert_eq!(updated.tags, vec!["compilers".to_string()]);

    // The vector row follows the new content
    let results = mnemo
        .memory
        .search(SearchRequest {
            top_k: 1,
            ..SearchRequest::new("compilers content")
        })
        .await
        .unwrap();
    assert_eq!(results[0].memory.id, memory.id);
}

#[tokio::test]
async fn test_update_unknown_id_returns_none() {
    let mnemo = test_instance();
    let result = mnemo
        .memory
        .update(
            "00000000-0000-0000-0000-000000000000",
            MemoryUpdate {
                tags: Some(vec!["x".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_delete_cascades_everything() {
    let mnemo = test_instance();
    let a = store(&mnemo, "memory a for cascade checking").await;
    let b = store(&mnemo, "memory b for cascade checking").await;

    // Build up dependents: link, access log, version, notification
    mnemo
        .graph
        .create_link({
            let mut req = mnemo::graph::CreateLinkRequest::new(&a.id, &b.id);
            req.cascade_on_update = true;
            req
        })
        .await
        .unwrap();
    mnemo.memory.get(&a.id).await.unwrap();
    mnemo
        .memory
        .update(
            &a.id,
            MemoryUpdate {
                tags: Some(vec!["v2".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    mnemo
        .graph
        .propagate_update(&a.id, NotificationType::Update, None)
        .await
        .unwrap();

    let deleted = mnemo.memory.delete(&a.id).await.unwrap();
    assert_eq!(deleted, vec![a.id.clone()]);

    // Nothing in any dependent table still references the id
    mnemo
        .storage
        .with_connection(|conn| {
            for (table, column) in [
                ("embeddings", "memory_id"),
                ("memories_fts", "content_id"),
                ("memory_access_log", "memory_id"),
                ("memory_versions", "memory_id"),
                ("dependency_notifications", "source_id"),
            ] {
                let count: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM {table} WHERE {column} = ?1"),
                    [&a.id],
                    |r| r.get(0),
                )?;
                assert_eq!(count, 0, "{table} still references the deleted id");
            }

            let links: i64 = conn.query_row(
                "SELECT COUNT(*) FROM memory_links WHERE source_id = ?1 OR target_id = ?1",
                [&a.id],
                |r| r.get(0),
            )?;
            assert_eq!(links, 0, "links still reference the deleted id");
            Ok(())
        })
        .unwrap();
}

#[tokio::test]
async fn test_delete_many_by_tier_and_age() {
    let mnemo = test_instance();

    let mut working = StoreRequest::new("scratch one");
    working.tier = MemoryTier::Working;
    let w1 = mnemo.memory.store(working.clone()).await.unwrap();
    working.content = "scratch two".to_string();
    let w2 = mnemo.memory.store(working).await.unwrap();
    let keep = store(&mnemo, "long term entry stays").await;

    let mut deleted = mnemo
        .memory
        .delete_many(None, Some(MemoryTier::Working), None)
        .await
        .unwrap();
    deleted.sort();
    let mut expected = vec![w1.id, w2.id];
    expected.sort();
    assert_eq!(deleted, expected);

    assert!(mnemo.memory.get(&keep.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_list_filters_and_pagination() {
    let mnemo = test_instance();

    for i in 0..5 {
        store_tagged(&mnemo, &format!("note number {}", i), &["listed"]).await;
    }
    store(&mnemo, "untagged note").await;

    let (page, total) = mnemo
        .memory
        .list(
            ListFilters {
                tags: Some(vec!["listed".to_string()]),
                ..Default::default()
            },
            3,
            0,
        )
        .await
        .unwrap();

    assert_eq!(total, 5);
    assert_eq!(page.len(), 3);
    // Newest first
    assert!(page[0].created_at >= page[1].created_at);
}

#[tokio::test]
async fn test_rate_limited_access_logging() {
    // Scenario: ten gets inside the window produce one log row but ten
    // access_count increments
    let mnemo = test_instance();
    let memory = store(&mnemo, "frequently read entry").await;

    for _ in 0..10 {
        mnemo.memory.get(&memory.id).await.unwrap();
    }

    let log_rows: i64 = mnemo
        .storage
        .with_connection(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM memory_access_log
                 WHERE memory_id = ?1 AND access_type = 'get'",
                [&memory.id],
                |r| r.get(0),
            )?)
        })
        .unwrap();
    assert_eq!(log_rows, 1);

    let fetched = mnemo.memory.get(&memory.id).await.unwrap().unwrap();
    assert_eq!(fetched.access_count, 11);
    assert!(fetched.last_accessed_at.is_some());
}

#[tokio::test]
async fn test_cleanup_expired() {
    let mnemo = test_instance();

    let mut req = StoreRequest::new("already expired entry");
    req.ttl_seconds = Some(-10);
    let expired = mnemo.memory.store(req).await.unwrap();
    let kept = store(&mnemo, "entry with no ttl").await;

    let removed = mnemo.memory.cleanup_expired().await.unwrap();
    assert_eq!(removed, 1);

    assert!(mnemo.memory.get(&expired.id).await.unwrap().is_none());
    assert!(mnemo.memory.get(&kept.id).await.unwrap().is_some());

    // The expired entry's embedding row went with it
    let orphan_embeddings: i64 = mnemo
        .storage
        .with_connection(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM embeddings WHERE memory_id = ?1",
                [&expired.id],
                |r| r.get(0),
            )?)
        })
        .unwrap();
    assert_eq!(orphan_embeddings, 0);
}

#[tokio::test]
async fn test_ttl_sweeper_cancel_and_drain() {
    let mnemo = test_instance();
    let sweeper = mnemo.memory.spawn_ttl_sweeper();
    // Cancels promptly even though the sweep interval is long
    sweeper.shutdown().await;
}

#[tokio::test]
async fn test_batch_store_continue_records_failures() {
    let settings = Settings {
        max_content_length: 40,
        ..Settings::default()
    };
    let mnemo = test_instance_with(settings);

    let items = vec![
        BatchStoreItem {
            content: "short valid entry".to_string(),
            content_type: ContentType::Text,
            tier: MemoryTier::LongTerm,
            tags: vec![],
            metadata: Default::default(),
            agent_id: None,
            ttl_seconds: None,
        },
        BatchStoreItem {
            content: "x".repeat(100),
            content_type: ContentType::Text,
            tier: MemoryTier::LongTerm,
            tags: vec![],
            metadata: Default::default(),
            agent_id: None,
            ttl_seconds: None,
        },
        BatchStoreItem {
            content: "another valid entry".to_string(),
            content_type: ContentType::Text,
            tier: MemoryTier::LongTerm,
            tags: vec![],
            metadata: Default::default(),
            agent_id: None,
            ttl_seconds: None,
        },
    ];

    let outcome = mnemo
        .memory
        .batch_store(items, BatchErrorMode::Continue, None)
        .await
        .unwrap();

    assert_eq!(outcome.success_count, 2);
    assert_eq!(outcome.error_count, 1);
    assert_eq!(outcome.errors[0].item, "1");
}

#[tokio::test]
async fn test_batch_store_stop_commits_prefix() {
    let settings = Settings {
        max_content_length: 40,
        ..Settings::default()
    };
    let mnemo = test_instance_with(settings);

    let make = |content: &str| BatchStoreItem {
        content: content.to_string(),
        content_type: ContentType::Text,
        tier: MemoryTier::LongTerm,
        tags: vec![],
        metadata: Default::default(),
        agent_id: None,
        ttl_seconds: None,
    };

    let long_content = "y".repeat(100);
    let items = vec![make("first ok"), make(&long_content), make("never reached")];

    let outcome = mnemo
        .memory
        .batch_store(items, BatchErrorMode::Stop, None)
        .await
        .unwrap();

    assert_eq!(outcome.success_count, 1);
    assert_eq!(outcome.error_count, 1);

    let (_, total) = mnemo.memory.list(ListFilters::default(), 10, 0).await.unwrap();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_batch_store_rollback_leaves_nothing() {
    let settings = Settings {
        max_content_length: 40,
        ..Settings::default()
    };
    let mnemo = test_instance_with(settings);

    let make = |content: &str| BatchStoreItem {
        content: content.to_string(),
        content_type: ContentType::Text,
        tier: MemoryTier::LongTerm,
        tags: vec![],
        metadata: Default::default(),
        agent_id: None,
        ttl_seconds: None,
    };

    let long_content = "z".repeat(100);
    let items = vec![make("valid start"), make(&long_content)];

    let result = mnemo
        .memory
        .batch_store(items, BatchErrorMode::Rollback, None)
        .await;
    assert!(result.is_err());

    let (_, total) = mnemo.memory.list(ListFilters::default(), 10, 0).await.unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_batch_size_cap() {
    let settings = Settings {
        batch_max_size: 2,
        ..Settings::default()
    };
    let mnemo = test_instance_with(settings);

    let item = BatchStoreItem {
        content: "entry".to_string(),
        content_type: ContentType::Text,
        tier: MemoryTier::LongTerm,
        tags: vec![],
        metadata: Default::default(),
        agent_id: None,
        ttl_seconds: None,
    };

    let result = mnemo
        .memory
        .batch_store(
            vec![item.clone(), item.clone(), item],
            BatchErrorMode::Continue,
            None,
        )
        .await;
    assert!(matches!(result, Err(MnemoError::ResourceExhausted(_))));
}

#[tokio::test]
async fn test_batch_update() {
    let mnemo = test_instance();
    let a = store(&mnemo, "first entry to batch update").await;
    let b = store(&mnemo, "second entry to batch update").await;

    let outcome = mnemo
        .memory
        .batch_update(
            vec![
                BatchUpdateItem {
                    id: a.id.clone(),
                    update: MemoryUpdate {
                        tags: Some(vec!["batched".to_string()]),
                        ..Default::default()
                    },
                },
                BatchUpdateItem {
                    id: b.id.clone(),
                    update: MemoryUpdate {
                        content: Some("second entry rewritten".to_string()),
                        ..Default::default()
                    },
                },
                BatchUpdateItem {
                    id: "missing-id".to_string(),
                    update: MemoryUpdate {
                        tags: Some(vec!["nope".to_string()]),
                        ..Default::default()
                    },
                },
            ],
            BatchErrorMode::Continue,
        )
        .await
        .unwrap();

    assert_eq!(outcome.success_count, 2);
    assert_eq!(outcome.error_count, 1);
    assert_eq!(outcome.errors[0].item, "missing-id");

    let b_after = mnemo.memory.get(&b.id).await.unwrap().unwrap();
    assert_eq!(b_after.content, "second entry rewritten");
    assert_eq!(b_after.version, 2);
}
