//! Knowledge base: document import with chunking, chunk-level semantic
//! queries, document lifecycle

pub mod chunker;

pub use chunker::{split_content, ChunkPiece};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::embedding::Embedder;
use crate::error::{MnemoError, Result};
use crate::storage::{queries, Storage};
use crate::types::*;

/// Parameters for `KnowledgeService::import_document`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportDocumentRequest {
    pub title: String,
    pub content: String,
    pub source: Option<String>,
    pub category: Option<String>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub chunking_strategy: ChunkingStrategy,
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    50
}

impl ImportDocumentRequest {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            source: None,
            category: None,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            metadata: HashMap::new(),
            chunking_strategy: ChunkingStrategy::Sentence,
        }
    }
}

fn document_from_row(row: &Row) -> rusqlite::Result<Document> {
    let metadata_str: String = row.get("doc_metadata")?;
    let created_at: String = row.get("doc_created_at")?;
    let updated_at: String = row.get("doc_updated_at")?;

    Ok(Document {
        id: row.get("doc_id")?,
        title: row.get("doc_title")?,
        source: row.get("doc_source")?,
        category: row.get("doc_category")?,
        version: row.get("doc_version")?,
        metadata: serde_json::from_str(&metadata_str).unwrap_or_default(),
        created_at: queries::parse_dt(&created_at),
        updated_at: queries::parse_dt(&updated_at),
    })
}

const DOCUMENT_COLUMNS: &str = "d.id AS doc_id, d.title AS doc_title, d.source AS doc_source, \
     d.category AS doc_category, d.version AS doc_version, d.metadata AS doc_metadata, \
     d.created_at AS doc_created_at, d.updated_at AS doc_updated_at";

/// Service for knowledge base operations
#[derive(Clone)]
pub struct KnowledgeService {
    storage: Storage,
    embedder: Arc<dyn Embedder>,
}

impl KnowledgeService {
    pub fn new(storage: Storage, embedder: Arc<dyn Embedder>) -> Self {
        Self { storage, embedder }
    }

    /// Import a document: split into chunks, embed them in one batch call,
    /// store everything in one transaction
    pub async fn import_document(
        &self,
        req: ImportDocumentRequest,
    ) -> Result<(Document, usize)> {
        if req.title.trim().is_empty() {
            return Err(MnemoError::Validation("title cannot be empty".to_string()));
        }

        let pieces = split_content(
            &req.content,
            req.chunking_strategy,
            req.chunk_size,
            req.chunk_overlap,
        )?;

        let now = Utc::now();
        let document = Document {
            id: new_id(),
            title: req.title.clone(),
            source: req.source.clone(),
            category: req.category.clone(),
            version: 1,
            metadata: req.metadata.clone(),
            created_at: now,
            updated_at: now,
        };

        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(i, piece)| Chunk {
                id: new_id(),
                document_id: document.id.clone(),
                content: piece.content,
                chunk_index: i,
                section_path: piece.section_path,
                has_previous: piece.has_previous,
                has_next: piece.has_next,
                metadata: HashMap::new(),
            })
            .collect();

        // Chunk embeddings are document-mode, generated in one batch
        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let embeddings = if texts.is_empty() {
            vec![]
        } else {
            self.embedder.embed_batch(&texts, false)?
        };

        self.storage.with_transaction(|conn| {
            conn.execute(
                "INSERT INTO knowledge_documents (
                    id, title, source, category, version, metadata, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    document.id,
                    document.title,
                    document.source,
                    document.category,
                    document.version,
                    serde_json::to_string(&document.metadata)?,
                    document.created_at.to_rfc3339(),
                    document.updated_at.to_rfc3339(),
                ],
            )?;

            for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
                conn.execute(
                    "INSERT INTO knowledge_chunks (
                        id, document_id, content, chunk_index, metadata,
                        section_path, has_previous, has_next
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        chunk.id,
                        chunk.document_id,
                        chunk.content,
                        chunk.chunk_index as i64,
                        serde_json::to_string(&chunk.metadata)?,
                        serde_json::to_string(&chunk.section_path)?,
                        chunk.has_previous as i64,
                        chunk.has_next as i64,
                    ],
                )?;

                conn.execute(
                    "INSERT INTO chunk_embeddings (chunk_id, embedding) VALUES (?1, ?2)",
                    params![chunk.id, serde_json::to_string(embedding)?],
                )?;
            }

            Ok(())
        })?;

        tracing::info!(
            document_id = %document.id,
            chunks = chunks.len(),
            "document imported"
        );

        Ok((document, chunks.len()))
    }

    /// Query chunks by semantic similarity, mirroring the entry path
    pub async fn query(
        &self,
        query: &str,
        top_k: usize,
        category: Option<&str>,
        document_id: Option<&str>,
    ) -> Result<Vec<ChunkResult>> {
        let embedding = self.embedder.embed(query, true)?;

        self.storage.with_connection(|conn| {
            let mut sql = format!(
                "SELECT c.id AS chunk_id, c.document_id, c.content, c.chunk_index,
                        c.metadata, c.section_path, c.has_previous, c.has_next,
                        {DOCUMENT_COLUMNS},
                        (1.0 - e.distance / 2.0) AS similarity
                 FROM (
                     SELECT chunk_id, distance
                     FROM chunk_embeddings
                     WHERE embedding MATCH ?
                     ORDER BY distance
                     LIMIT ?
                 ) e
                 JOIN knowledge_chunks c ON c.id = e.chunk_id
                 JOIN knowledge_documents d ON d.id = c.document_id"
            );

            let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![
                Box::new(serde_json::to_string(&embedding)?),
                Box::new(top_k as i64),
            ];

            if let Some(category) = category {
                sql.push_str(" AND d.category = ?");
                params.push(Box::new(category.to_string()));
            }
            if let Some(document_id) = document_id {
                sql.push_str(" AND c.document_id = ?");
                params.push(Box::new(document_id.to_string()));
            }
            sql.push_str(" ORDER BY e.distance");

            let param_refs: Vec<&dyn rusqlite::ToSql> =
                params.iter().map(|b| b.as_ref()).collect();
            let mut stmt = conn.prepare(&sql)?;

            let rows = stmt.query_map(param_refs.as_slice(), |row| {
                let metadata_str: String = row.get("metadata")?;
                let section_path_str: String = row.get("section_path")?;
                let similarity: f64 = row.get("similarity")?;

                let chunk = Chunk {
                    id: row.get("chunk_id")?,
                    document_id: row.get("document_id")?,
                    content: row.get("content")?,
                    chunk_index: row.get::<_, i64>("chunk_index")? as usize,
                    section_path: serde_json::from_str(&section_path_str).unwrap_or_default(),
                    has_previous: row.get::<_, i64>("has_previous")? != 0,
                    has_next: row.get::<_, i64>("has_next")? != 0,
                    metadata: serde_json::from_str(&metadata_str).unwrap_or_default(),
                };
                let document = document_from_row(row)?;

                Ok(ChunkResult {
                    chunk,
                    document,
                    similarity: similarity as f32,
                })
            })?;

            let mut results = Vec::new();
            for row in rows {
                results.push(row?);
            }
            Ok(results)
        })
    }

    /// Fetch a document by id
    pub async fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        self.storage.with_connection(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {DOCUMENT_COLUMNS} FROM knowledge_documents d WHERE d.id = ?1"
                    ),
                    params![document_id],
                    document_from_row,
                )
                .optional()?)
        })
    }

    /// Delete a document; chunks cascade, chunk embeddings go explicitly
    pub async fn delete_document(&self, document_id: &str) -> Result<bool> {
        self.storage.with_transaction(|conn| {
            conn.execute(
                "DELETE FROM chunk_embeddings WHERE chunk_id IN (
                    SELECT id FROM knowledge_chunks WHERE document_id = ?1
                )",
                params![document_id],
            )?;
            let deleted = conn.execute(
                "DELETE FROM knowledge_documents WHERE id = ?1",
                params![document_id],
            )?;
            Ok(deleted > 0)
        })
    }

    /// Chunks of a document in order
    pub async fn document_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        self.storage.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, document_id, content, chunk_index, metadata,
                        section_path, has_previous, has_next
                 FROM knowledge_chunks
                 WHERE document_id = ?1
                 ORDER BY chunk_index",
            )?;

            let rows = stmt.query_map(params![document_id], |row| {
                let metadata_str: String = row.get("metadata")?;
                let section_path_str: String = row.get("section_path")?;

                Ok(Chunk {
                    id: row.get("id")?,
                    document_id: row.get("document_id")?,
                    content: row.get("content")?,
                    chunk_index: row.get::<_, i64>("chunk_index")? as usize,
                    section_path: serde_json::from_str(&section_path_str).unwrap_or_default(),
                    has_previous: row.get::<_, i64>("has_previous")? != 0,
                    has_next: row.get::<_, i64>("has_next")? != 0,
                    metadata: serde_json::from_str(&metadata_str).unwrap_or_default(),
                })
            })?;

            let mut chunks = Vec::new();
            for row in rows {
                chunks.push(row?);
            }
            Ok(chunks)
        })
    }
}
