//! Export / import integration tests

mod common;

use common::{store_tagged, test_instance};

use mnemo::archive::{ExportOptions, ImportOptions};
use mnemo::graph::CreateLinkRequest;
use mnemo::memory::StoreRequest;
use mnemo::types::*;
use mnemo::MnemoError;

fn archive_path(dir: &tempfile::TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().to_string()
}

fn allowed(mut mnemo: mnemo::Mnemo, dir: &tempfile::TempDir) -> mnemo::Mnemo {
    let archive = mnemo.archive.clone().with_allowed_path(dir.path().to_path_buf());
    mnemo.archive = archive;
    mnemo
}

#[tokio::test]
async fn test_export_wipe_import_is_identity() {
    let dir = tempfile::tempdir().unwrap();
    let mnemo = allowed(test_instance(), &dir);

    let a = store_tagged(&mnemo, "first archived entry", &["x"]).await;
    let b = store_tagged(&mnemo, "second archived entry", &["y"]).await;
    mnemo
        .graph
        .create_link(CreateLinkRequest::new(&a.id, &b.id))
        .await
        .unwrap();

    let path = archive_path(&dir, "roundtrip.jsonl");
    let export = mnemo
        .archive
        .export(
            &path,
            ExportOptions {
                include_embeddings: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(export.counts["memories"], 2);
    assert_eq!(export.counts["memory_links"], 1);
    assert!(export.file_size_bytes > 0);

    // Wipe and import with merge/skip: identity over entries
    mnemo.memory.delete_many(Some(vec![a.id.clone(), b.id.clone()]), None, None)
        .await
        .unwrap();
    let (_, total) = mnemo.memory.list(ListFilters::default(), 10, 0).await.unwrap();
    assert_eq!(total, 0);

    let import = mnemo
        .archive
        .import(
            &path,
            ImportOptions {
                mode: ImportMode::Merge,
                on_conflict: ConflictPolicy::Skip,
                regenerate_embeddings: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(import.counts["memories"], 2);
    assert_eq!(import.error_count, 0);

    // Ids preserved, content intact, embeddings restored
    let restored = mnemo.memory.get(&a.id).await.unwrap().unwrap();
    assert_eq!(restored.content, "first archived entry");
    assert_eq!(restored.tags, vec!["x".to_string()]);

    let embedding_rows: i64 = mnemo
        .storage
        .with_connection(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM embeddings", [], |r| r.get(0))?)
        })
        .unwrap();
    assert_eq!(embedding_rows, 2);

    // The link came back too
    let links = mnemo
        .graph
        .get_links(&a.id, LinkDirection::Both, None)
        .await
        .unwrap();
    assert_eq!(links.len(), 1);
}

#[tokio::test]
async fn test_import_conflict_policies() {
    let dir = tempfile::tempdir().unwrap();
    let mnemo = allowed(test_instance(), &dir);

    let original = store_tagged(&mnemo, "original content", &[]).await;

    let path = archive_path(&dir, "conflicts.jsonl");
    mnemo
        .archive
        .export(&path, ExportOptions::default())
        .await
        .unwrap();

    // Mutate after export so the archive disagrees with the database
    mnemo
        .memory
        .update(
            &original.id,
            MemoryUpdate {
                content: Some("locally changed content".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Skip keeps the local change
    let skip = mnemo
        .archive
        .import(&path, ImportOptions::default())
        .await
        .unwrap();
    assert_eq!(skip.skipped_count, 1);
    let kept = mnemo.memory.get(&original.id).await.unwrap().unwrap();
    assert_eq!(kept.content, "locally changed content");

    // Update overwrites from the archive
    let update = mnemo
        .archive
        .import(
            &path,
            ImportOptions {
                on_conflict: ConflictPolicy::Update,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(update.counts["memories"], 1);
    let reverted = mnemo.memory.get(&original.id).await.unwrap().unwrap();
    assert_eq!(reverted.content, "original content");

    // Error aborts on the existing id
    let error = mnemo
        .archive
        .import(
            &path,
            ImportOptions {
                on_conflict: ConflictPolicy::Error,
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(error, Err(MnemoError::Conflict(_))));
}

#[tokio::test]
async fn test_replace_mode_clears_tables() {
    let dir = tempfile::tempdir().unwrap();
    let mnemo = allowed(test_instance(), &dir);

    let exported = store_tagged(&mnemo, "survives through the archive", &[]).await;
    let path = archive_path(&dir, "replace.jsonl");
    mnemo
        .archive
        .export(
            &path,
            ExportOptions {
                include_embeddings: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // New data after the export is dropped by replace
    let doomed = store_tagged(&mnemo, "created after the export", &[]).await;

    mnemo
        .archive
        .import(
            &path,
            ImportOptions {
                mode: ImportMode::Replace,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(mnemo.memory.get(&exported.id).await.unwrap().is_some());
    assert!(mnemo.memory.get(&doomed.id).await.unwrap().is_none());

    // No orphan embedding rows after the clear
    let (memories, embeddings): (i64, i64) = mnemo
        .storage
        .with_connection(|conn| {
            let m: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
            let e: i64 = conn.query_row("SELECT COUNT(*) FROM embeddings", [], |r| r.get(0))?;
            Ok((m, e))
        })
        .unwrap();
    assert_eq!(memories, embeddings);
}

#[tokio::test]
async fn test_export_tier_filter() {
    let dir = tempfile::tempdir().unwrap();
    let mnemo = allowed(test_instance(), &dir);

    let mut working = StoreRequest::new("working tier entry");
    working.tier = MemoryTier::Working;
    mnemo.memory.store(working).await.unwrap();
    store_tagged(&mnemo, "long term entry", &[]).await;

    let path = archive_path(&dir, "tiered.jsonl");
    let export = mnemo
        .archive
        .export(
            &path,
            ExportOptions {
                tier: Some(MemoryTier::Working),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(export.counts["memories"], 1);
}

#[tokio::test]
async fn test_path_traversal_rejected() {
    let mnemo = test_instance();

    let traversal = mnemo
        .archive
        .export("../outside/archive.jsonl", ExportOptions::default())
        .await;
    assert!(matches!(traversal, Err(MnemoError::Validation(_))));

    let outside = mnemo
        .archive
        .export("/definitely/not/allowed/archive.jsonl", ExportOptions::default())
        .await;
    assert!(matches!(outside, Err(MnemoError::Validation(_))));
}

#[tokio::test]
async fn test_newer_schema_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mnemo = allowed(test_instance(), &dir);

    let path = archive_path(&dir, "future.jsonl");
    std::fs::write(
        &path,
        "{\"schema_version\": 99, \"exported_at\": \"2026-01-01T00:00:00Z\", \"counts\": {}}\n",
    )
    .unwrap();

    let result = mnemo.archive.import(&path, ImportOptions::default()).await;
    assert!(matches!(result, Err(MnemoError::Validation(_))));
}

#[tokio::test]
async fn test_regenerate_embeddings_on_import() {
    let dir = tempfile::tempdir().unwrap();
    let mnemo = allowed(test_instance(), &dir);

    let memory = store_tagged(&mnemo, "embedding regeneration target", &[]).await;
    let path = archive_path(&dir, "regen.jsonl");
    // Export without embeddings; import must still produce exactly one
    // embedding row per entry
    mnemo
        .archive
        .export(&path, ExportOptions::default())
        .await
        .unwrap();

    mnemo.memory.delete(&memory.id).await.unwrap();

    mnemo
        .archive
        .import(
            &path,
            ImportOptions {
                regenerate_embeddings: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let rows: i64 = mnemo
        .storage
        .with_connection(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM embeddings WHERE memory_id = ?1",
                [&memory.id],
                |r| r.get(0),
            )?)
        })
        .unwrap();
    assert_eq!(rows, 1);

    // And the restored entry is searchable again
    let results = mnemo
        .memory
        .search(SearchRequest {
            top_k: 1,
            ..SearchRequest::new("embedding regeneration target")
        })
        .await
        .unwrap();
    assert_eq!(results[0].memory.id, memory.id);
}
