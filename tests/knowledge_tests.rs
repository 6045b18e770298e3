//! Knowledge base integration tests: document import, chunk queries

mod common;

use common::test_instance;

use mnemo::knowledge::ImportDocumentRequest;
use mnemo::types::*;
use mnemo::MnemoError;

#[tokio::test]
async fn test_import_and_query_document() {
    let mnemo = test_instance();

    let content = "Backups run nightly at two. Restores are tested monthly. \
                   The retention window is ninety days. Archive copies go to cold storage. \
                   Encryption keys rotate quarterly. Access requires the backup role.";

    let (document, chunk_count) = mnemo
        .knowledge
        .import_document(ImportDocumentRequest {
            chunk_size: 120,
            chunk_overlap: 20,
            ..ImportDocumentRequest::new("Backup policy", content)
        })
        .await
        .unwrap();

    assert!(chunk_count > 1);

    let chunks = mnemo.knowledge.document_chunks(&document.id).await.unwrap();
    assert_eq!(chunks.len(), chunk_count);
    assert!(!chunks[0].has_previous);
    assert!(chunks[0].has_next);
    assert!(!chunks.last().unwrap().has_next);

    // Each chunk has exactly one embedding row
    let embedding_rows: i64 = mnemo
        .storage
        .with_connection(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM chunk_embeddings", [], |r| r.get(0))?)
        })
        .unwrap();
    assert_eq!(embedding_rows as usize, chunk_count);

    let results = mnemo
        .knowledge
        .query("retention window ninety days", 3, None, None)
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert_eq!(results[0].document.id, document.id);
    assert!(results[0].chunk.content.contains("retention"));
    assert!(results[0].similarity > 0.5);
}

#[tokio::test]
async fn test_markdown_semantic_import() {
    let mnemo = test_instance();

    let content = "# Handbook\n\nWelcome text.\n\n## Deployments\n\n\
                   Deployments ship from main.\n\n## Rollbacks\n\n\
                   Rollbacks revert the last release.\n";

    let (document, _) = mnemo
        .knowledge
        .import_document(ImportDocumentRequest {
            chunking_strategy: ChunkingStrategy::Semantic,
            ..ImportDocumentRequest::new("Handbook", content)
        })
        .await
        .unwrap();

    let chunks = mnemo.knowledge.document_chunks(&document.id).await.unwrap();

    let deploy_chunk = chunks
        .iter()
        .find(|c| c.content.contains("ship from main"))
        .expect("deployments chunk");
    assert_eq!(
        deploy_chunk.section_path,
        vec!["Handbook".to_string(), "Deployments".to_string()]
    );
}

#[tokio::test]
async fn test_query_filters() {
    let mnemo = test_instance();

    let (runbooks, _) = mnemo
        .knowledge
        .import_document(ImportDocumentRequest {
            category: Some("runbooks".to_string()),
            ..ImportDocumentRequest::new("Pager runbook", "Page the on-call for sev one incidents.")
        })
        .await
        .unwrap();
    mnemo
        .knowledge
        .import_document(ImportDocumentRequest {
            category: Some("notes".to_string()),
            ..ImportDocumentRequest::new("Meeting notes", "Pager discussion happened on tuesday.")
        })
        .await
        .unwrap();

    let filtered = mnemo
        .knowledge
        .query("pager on-call", 10, Some("runbooks"), None)
        .await
        .unwrap();
    assert!(!filtered.is_empty());
    assert!(filtered.iter().all(|r| r.document.id == runbooks.id));

    let by_document = mnemo
        .knowledge
        .query("pager", 10, None, Some(&runbooks.id))
        .await
        .unwrap();
    assert!(by_document.iter().all(|r| r.document.id == runbooks.id));
}

#[tokio::test]
async fn test_delete_document_cascades_chunks() {
    let mnemo = test_instance();

    let (document, chunk_count) = mnemo
        .knowledge
        .import_document(ImportDocumentRequest::new(
            "Disposable",
            "Sentence one lives here. Sentence two lives here. Sentence three lives here.",
        ))
        .await
        .unwrap();
    assert!(chunk_count >= 1);

    assert!(mnemo.knowledge.delete_document(&document.id).await.unwrap());
    assert!(mnemo.knowledge.get_document(&document.id).await.unwrap().is_none());

    let (chunks, embeddings): (i64, i64) = mnemo
        .storage
        .with_connection(|conn| {
            let c: i64 =
                conn.query_row("SELECT COUNT(*) FROM knowledge_chunks", [], |r| r.get(0))?;
            let e: i64 =
                conn.query_row("SELECT COUNT(*) FROM chunk_embeddings", [], |r| r.get(0))?;
            Ok((c, e))
        })
        .unwrap();
    assert_eq!(chunks, 0);
    assert_eq!(embeddings, 0);

    // Deleting again reports not found
    assert!(!mnemo.knowledge.delete_document(&document.id).await.unwrap());
}

#[tokio::test]
async fn test_import_validation() {
    let mnemo = test_instance();

    let empty_title = mnemo
        .knowledge
        .import_document(ImportDocumentRequest::new("  ", "content"))
        .await;
    assert!(matches!(empty_title, Err(MnemoError::Validation(_))));

    let bad_overlap = mnemo
        .knowledge
        .import_document(ImportDocumentRequest {
            chunk_size: 10,
            chunk_overlap: 10,
            ..ImportDocumentRequest::new("Doc", "content")
        })
        .await;
    assert!(matches!(bad_overlap, Err(MnemoError::Validation(_))));
}
