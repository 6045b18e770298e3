//! Export / import: line-delimited JSON archives
//!
//! The first line is archive metadata `{schema_version, exported_at,
//! counts}`; every following line is one record tagged with `type`. Memory
//! and chunk records optionally carry their embedding vectors. File paths
//! are validated against an allow-list before any I/O happens.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{json, Value};

use crate::embedding::Embedder;
use crate::error::{MnemoError, Result};
use crate::storage::{Storage, SCHEMA_VERSION};
use crate::types::*;

/// Options for an export
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub include_embeddings: bool,
    pub tier: Option<MemoryTier>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

/// Options for an import
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub mode: ImportMode,
    pub on_conflict: ConflictPolicy,
    pub regenerate_embeddings: bool,
}

/// Service for archive export and import
#[derive(Clone)]
pub struct ArchiveService {
    storage: Storage,
    embedder: Arc<dyn Embedder>,
    allowed_paths: Vec<PathBuf>,
}

impl ArchiveService {
    pub fn new(storage: Storage, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            storage,
            embedder,
            allowed_paths: vec![],
        }
    }

    /// Allow an additional base directory for archive files
    pub fn with_allowed_path(mut self, path: PathBuf) -> Self {
        self.allowed_paths.push(path);
        self
    }

    /// Resolve a caller path and require it to sit under an allowed base
    /// (process cwd plus the configured allow-list). Paths containing `..`
    /// are rejected before resolution.
    fn validate_safe_path(&self, file_path: &str) -> Result<PathBuf> {
        let path = Path::new(file_path);

        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(MnemoError::Validation(format!(
                "path traversal detected in {}",
                file_path
            )));
        }

        let cwd = std::env::current_dir()?;
        let resolved = if path.is_absolute() {
            path.to_path_buf()
        } else {
            cwd.join(path)
        };

        let mut allowed_bases = vec![cwd];
        allowed_bases.extend(self.allowed_paths.iter().cloned());

        if !allowed_bases.iter().any(|base| resolved.starts_with(base)) {
            return Err(MnemoError::Validation(format!(
                "path {} is outside allowed directories",
                file_path
            )));
        }

        Ok(resolved)
    }

    /// Export the database to a line-delimited JSON archive
    pub async fn export(&self, output_path: &str, options: ExportOptions) -> Result<ExportResult> {
        let output = self.validate_safe_path(output_path)?;
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let exported_at = Utc::now();

        let counts = self.storage.with_connection(|conn| {
            let mut writer = BufWriter::new(File::create(&output)?);
            let mut counts: HashMap<String, usize> = HashMap::new();

            // Memory filter clause shared by count and row scan
            let mut where_sql = String::from("1=1");
            let mut filter_params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(tier) = options.tier {
                where_sql.push_str(" AND memory_tier = ?");
                filter_params.push(Box::new(tier.as_str()));
            }
            if let Some(after) = options.created_after {
                where_sql.push_str(" AND created_at >= ?");
                filter_params.push(Box::new(after.to_rfc3339()));
            }
            if let Some(before) = options.created_before {
                where_sql.push_str(" AND created_at <= ?");
                filter_params.push(Box::new(before.to_rfc3339()));
            }
            let filter_refs: Vec<&dyn rusqlite::ToSql> =
                filter_params.iter().map(|b| b.as_ref()).collect();

            // Counts go into the metadata line, so gather them first
            counts.insert(
                "memories".to_string(),
                conn.query_row(
                    &format!("SELECT COUNT(*) FROM memories WHERE {where_sql}"),
                    filter_refs.as_slice(),
                    |r| r.get::<_, i64>(0),
                )? as usize,
            );
            for (key, table) in [
                ("knowledge_documents", "knowledge_documents"),
                ("knowledge_chunks", "knowledge_chunks"),
                ("agents", "agents"),
                ("messages", "messages"),
                ("memory_links", "memory_links"),
            ] {
                let count: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
                counts.insert(key.to_string(), count as usize);
            }
            let decay_present: i64 =
                conn.query_row("SELECT COUNT(*) FROM decay_config WHERE id = 1", [], |r| {
                    r.get(0)
                })?;
            counts.insert("decay_config".to_string(), decay_present as usize);

            let metadata = json!({
                "schema_version": SCHEMA_VERSION,
                "exported_at": exported_at.to_rfc3339(),
                "counts": counts,
            });
            writeln!(writer, "{}", metadata)?;

            Self::export_memories(
                conn,
                &mut writer,
                &where_sql,
                &filter_refs,
                options.include_embeddings,
            )?;
            Self::export_table_rows(
                conn,
                &mut writer,
                "knowledge_document",
                "SELECT id, title, source, category, version, metadata, created_at, updated_at
                 FROM knowledge_documents",
            )?;
            Self::export_chunks(conn, &mut writer, options.include_embeddings)?;
            Self::export_table_rows(
                conn,
                &mut writer,
                "agent",
                "SELECT id, name, description, metadata, created_at, last_active_at FROM agents",
            )?;
            Self::export_table_rows(
                conn,
                &mut writer,
                "message",
                "SELECT id, sender_id, receiver_id, agent_id, role, content, metadata, created_at
                 FROM messages",
            )?;
            Self::export_table_rows(
                conn,
                &mut writer,
                "memory_link",
                "SELECT id, source_id, target_id, link_type, metadata, strength,
                        cascade_on_update, cascade_on_delete, created_at
                 FROM memory_links",
            )?;

            let decay: Option<Value> = conn
                .query_row(
                    "SELECT enabled, threshold, grace_period_days, max_delete_per_run,
                            last_run_at, updated_at
                     FROM decay_config WHERE id = 1",
                    [],
                    |row| {
                        Ok(json!({
                            "type": "decay_config",
                            "enabled": row.get::<_, i64>(0)? != 0,
                            "threshold": row.get::<_, f64>(1)?,
                            "grace_period_days": row.get::<_, i64>(2)?,
                            "max_delete_per_run": row.get::<_, i64>(3)?,
                            "last_run_at": row.get::<_, Option<String>>(4)?,
                            "updated_at": row.get::<_, String>(5)?,
                        }))
                    },
                )
                .optional()?;
            if let Some(record) = decay {
                writeln!(writer, "{}", record)?;
            }

            writer.flush()?;
            Ok(counts)
        })?;

        let file_size_bytes = std::fs::metadata(&output)?.len();

        Ok(ExportResult {
            exported_at,
            schema_version: SCHEMA_VERSION,
            counts,
            file_path: output.to_string_lossy().to_string(),
            file_size_bytes,
        })
    }

    fn export_memories(
        conn: &Connection,
        writer: &mut BufWriter<File>,
        where_sql: &str,
        filter_refs: &[&dyn rusqlite::ToSql],
        include_embeddings: bool,
    ) -> Result<()> {
        use crate::storage::queries::{memory_from_row, MEMORY_COLUMNS};

        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMORY_COLUMNS} FROM memories m WHERE {where_sql}"
        ))?;
        let memories: Vec<Memory> = stmt
            .query_map(filter_refs, memory_from_row)?
            .filter_map(|r| r.ok())
            .collect();

        for memory in memories {
            let mut record = serde_json::to_value(&memory)?;
            record["type"] = json!("memory");

            if include_embeddings {
                if let Some(embedding) =
                    crate::storage::queries::get_embedding(conn, &memory.id)?
                {
                    record["embedding"] = serde_json::to_value(embedding)?;
                }
            }
            writeln!(writer, "{}", record)?;
        }
        Ok(())
    }

    fn export_chunks(
        conn: &Connection,
        writer: &mut BufWriter<File>,
        include_embeddings: bool,
    ) -> Result<()> {
        let mut stmt = conn.prepare(
            "SELECT id, document_id, content, chunk_index, metadata,
                    section_path, has_previous, has_next
             FROM knowledge_chunks",
        )?;

        let rows: Vec<Value> = stmt
            .query_map([], |row| {
                Ok(json!({
                    "type": "knowledge_chunk",
                    "id": row.get::<_, String>(0)?,
                    "document_id": row.get::<_, String>(1)?,
                    "content": row.get::<_, String>(2)?,
                    "chunk_index": row.get::<_, i64>(3)?,
                    "metadata": row.get::<_, String>(4)?,
                    "section_path": row.get::<_, String>(5)?,
                    "has_previous": row.get::<_, i64>(6)? != 0,
                    "has_next": row.get::<_, i64>(7)? != 0,
                }))
            })?
            .filter_map(|r| r.ok())
            .collect();

        for mut record in rows {
            if include_embeddings {
                let chunk_id = record["id"].as_str().unwrap_or_default().to_string();
                let embedding: Option<String> = conn
                    .query_row(
                        "SELECT vec_to_json(embedding) FROM chunk_embeddings WHERE chunk_id = ?1",
                        params![chunk_id],
                        |r| r.get(0),
                    )
                    .optional()?;
                if let Some(embedding_json) = embedding {
                    if let Ok(vector) = serde_json::from_str::<Value>(&embedding_json) {
                        record["embedding"] = vector;
                    }
                }
            }
            writeln!(writer, "{}", record)?;
        }
        Ok(())
    }

    fn export_table_rows(
        conn: &Connection,
        writer: &mut BufWriter<File>,
        record_type: &str,
        sql: &str,
    ) -> Result<()> {
        let mut stmt = conn.prepare(sql)?;
        let column_names: Vec<String> =
            stmt.column_names().iter().map(|s| s.to_string()).collect();

        let rows: Vec<Value> = stmt
            .query_map([], |row| {
                let mut object = serde_json::Map::new();
                object.insert("type".to_string(), json!(record_type));
                for (i, name) in column_names.iter().enumerate() {
                    let value: Value = match row.get_ref(i)? {
                        rusqlite::types::ValueRef::Null => Value::Null,
                        rusqlite::types::ValueRef::Integer(v) => json!(v),
                        rusqlite::types::ValueRef::Real(v) => json!(v),
                        rusqlite::types::ValueRef::Text(t) => {
                            json!(String::from_utf8_lossy(t).to_string())
                        }
                        rusqlite::types::ValueRef::Blob(_) => Value::Null,
                    };
                    object.insert(name.clone(), value);
                }
                Ok(Value::Object(object))
            })?
            .filter_map(|r| r.ok())
            .collect();

        for record in rows {
            writeln!(writer, "{}", record)?;
        }
        Ok(())
    }

    /// Import an archive
    pub async fn import(&self, input_path: &str, options: ImportOptions) -> Result<ImportResult> {
        let input = self.validate_safe_path(input_path)?;
        if !input.exists() {
            return Err(MnemoError::NotFound(format!(
                "import file {}",
                input.display()
            )));
        }

        let file = File::open(&input)?;
        let mut reader = BufReader::new(file);

        let mut metadata_line = String::new();
        reader.read_line(&mut metadata_line)?;
        let metadata: Value = serde_json::from_str(metadata_line.trim())?;
        let schema_version = metadata
            .get("schema_version")
            .and_then(|v| v.as_i64())
            .unwrap_or(1);

        if schema_version > SCHEMA_VERSION {
            return Err(MnemoError::Validation(format!(
                "unsupported archive schema version {} (maximum {})",
                schema_version, SCHEMA_VERSION
            )));
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut skipped_count = 0usize;
        let mut error_count = 0usize;
        let mut errors: Vec<BatchItemError> = Vec::new();

        let embedder = Arc::clone(&self.embedder);
        let on_conflict = options.on_conflict;
        let regenerate = options.regenerate_embeddings;
        let mode = options.mode;

        self.storage.with_transaction(|conn| {
            if mode == ImportMode::Replace {
                // vec0 tables have no FK support, clear them explicitly;
                // everything else cascades from the main tables
                conn.execute("DELETE FROM embeddings", [])?;
                conn.execute("DELETE FROM chunk_embeddings", [])?;
                conn.execute("DELETE FROM memories", [])?;
                conn.execute("DELETE FROM knowledge_documents", [])?;
                conn.execute("DELETE FROM agents", [])?;
                conn.execute("DELETE FROM messages", [])?;
                conn.execute("DELETE FROM memory_links", [])?;
            }

            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }

                let record: Value = match serde_json::from_str(&line) {
                    Ok(record) => record,
                    Err(e) => {
                        error_count += 1;
                        errors.push(BatchItemError {
                            item: "unparseable".to_string(),
                            error: e.to_string(),
                        });
                        if on_conflict == ConflictPolicy::Error {
                            return Err(MnemoError::Validation(format!(
                                "malformed archive line: {}",
                                e
                            )));
                        }
                        continue;
                    }
                };

                let record_type = record
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string();

                let outcome = match record_type.as_str() {
                    "memory" => import_memory(conn, &record, on_conflict, regenerate, &embedder),
                    "knowledge_document" => import_document(conn, &record, on_conflict),
                    "knowledge_chunk" => {
                        import_chunk(conn, &record, on_conflict, regenerate, &embedder)
                    }
                    "agent" => import_agent(conn, &record, on_conflict),
                    "message" => import_message(conn, &record, on_conflict),
                    "memory_link" => import_link(conn, &record, on_conflict),
                    "decay_config" => import_decay_config(conn, &record),
                    _ => Ok(false),
                };

                match outcome {
                    Ok(true) => {
                        let key = match record_type.as_str() {
                            "memory" => "memories",
                            "knowledge_document" => "knowledge_documents",
                            "knowledge_chunk" => "knowledge_chunks",
                            "agent" => "agents",
                            "message" => "messages",
                            "memory_link" => "memory_links",
                            "decay_config" => "decay_config",
                            _ => "unknown",
                        };
                        *counts.entry(key.to_string()).or_insert(0) += 1;
                    }
                    Ok(false) => skipped_count += 1,
                    Err(e) => {
                        if on_conflict == ConflictPolicy::Error {
                            return Err(e);
                        }
                        error_count += 1;
                        errors.push(BatchItemError {
                            item: record
                                .get("id")
                                .and_then(|v| v.as_str())
                                .unwrap_or("unknown")
                                .to_string(),
                            error: e.to_string(),
                        });
                    }
                }
            }

            Ok(())
        })?;

        Ok(ImportResult {
            imported_at: Utc::now(),
            schema_version,
            mode,
            counts,
            skipped_count,
            error_count,
            errors,
        })
    }
}

fn record_str<'a>(record: &'a Value, key: &str) -> Result<&'a str> {
    record
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| MnemoError::Validation(format!("record missing field: {}", key)))
}

fn exists(conn: &Connection, sql: &str, id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(sql, params![id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

fn import_memory(
    conn: &Connection,
    record: &Value,
    on_conflict: ConflictPolicy,
    regenerate: bool,
    embedder: &Arc<dyn Embedder>,
) -> Result<bool> {
    let memory: Memory = serde_json::from_value(record.clone())?;

    if exists(conn, "SELECT 1 FROM memories WHERE id = ?1", &memory.id)? {
        match on_conflict {
            ConflictPolicy::Skip => return Ok(false),
            ConflictPolicy::Error => {
                return Err(MnemoError::Conflict(format!(
                    "memory already exists: {}",
                    memory.id
                )))
            }
            ConflictPolicy::Update => {}
        }
    }

    conn.execute(
        "INSERT OR REPLACE INTO memories (
            id, content, content_type, memory_tier, tags, metadata,
            agent_id, created_at, updated_at, expires_at,
            importance_score, access_count, last_accessed_at,
            consolidated_from, namespace, schema_id, structured_content, version
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            memory.id,
            memory.content,
            memory.content_type.as_str(),
            memory.tier.as_str(),
            serde_json::to_string(&memory.tags)?,
            serde_json::to_string(&memory.metadata)?,
            memory.agent_id,
            memory.created_at.to_rfc3339(),
            memory.updated_at.to_rfc3339(),
            memory.expires_at.map(|d| d.to_rfc3339()),
            memory.importance_score,
            memory.access_count,
            memory.last_accessed_at.map(|d| d.to_rfc3339()),
            memory
                .consolidated_from
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            memory.namespace,
            memory.schema_id,
            memory
                .structured_content
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            memory.version,
        ],
    )?;

    // Every entry keeps exactly one embedding row
    let embedding: Vec<f32> = match (regenerate, record.get("embedding")) {
        (false, Some(raw)) => serde_json::from_value(raw.clone())?,
        _ => embedder.embed(&memory.content, false)?,
    };

    conn.execute(
        "DELETE FROM embeddings WHERE memory_id = ?1",
        params![memory.id],
    )?;
    conn.execute(
        "INSERT INTO embeddings (memory_id, embedding) VALUES (?1, ?2)",
        params![memory.id, serde_json::to_string(&embedding)?],
    )?;

    Ok(true)
}

fn import_document(conn: &Connection, record: &Value, on_conflict: ConflictPolicy) -> Result<bool> {
    let id = record_str(record, "id")?;

    if exists(conn, "SELECT 1 FROM knowledge_documents WHERE id = ?1", id)? {
        match on_conflict {
            ConflictPolicy::Skip => return Ok(false),
            ConflictPolicy::Error => {
                return Err(MnemoError::Conflict(format!(
                    "document already exists: {}",
                    id
                )))
            }
            ConflictPolicy::Update => {}
        }
    }

    conn.execute(
        "INSERT OR REPLACE INTO knowledge_documents (
            id, title, source, category, version, metadata, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            record_str(record, "title")?,
            record.get("source").and_then(|v| v.as_str()),
            record.get("category").and_then(|v| v.as_str()),
            record.get("version").and_then(|v| v.as_i64()).unwrap_or(1),
            record
                .get("metadata")
                .and_then(|v| v.as_str())
                .unwrap_or("{}"),
            record_str(record, "created_at")?,
            record_str(record, "updated_at")?,
        ],
    )?;

    Ok(true)
}

fn import_chunk(
    conn: &Connection,
    record: &Value,
    on_conflict: ConflictPolicy,
    regenerate: bool,
    embedder: &Arc<dyn Embedder>,
) -> Result<bool> {
    let id = record_str(record, "id")?;

    if exists(conn, "SELECT 1 FROM knowledge_chunks WHERE id = ?1", id)? {
        match on_conflict {
            ConflictPolicy::Skip => return Ok(false),
            ConflictPolicy::Error => {
                return Err(MnemoError::Conflict(format!("chunk already exists: {}", id)))
            }
            ConflictPolicy::Update => {}
        }
    }

    let content = record_str(record, "content")?;

    conn.execute(
        "INSERT OR REPLACE INTO knowledge_chunks (
            id, document_id, content, chunk_index, metadata,
            section_path, has_previous, has_next
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            record_str(record, "document_id")?,
            content,
            record
                .get("chunk_index")
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
            record
                .get("metadata")
                .and_then(|v| v.as_str())
                .unwrap_or("{}"),
            record
                .get("section_path")
                .and_then(|v| v.as_str())
                .unwrap_or("[]"),
            record
                .get("has_previous")
                .and_then(|v| v.as_bool())
                .unwrap_or(false) as i64,
            record
                .get("has_next")
                .and_then(|v| v.as_bool())
                .unwrap_or(false) as i64,
        ],
    )?;

    let embedding: Vec<f32> = match (regenerate, record.get("embedding")) {
        (false, Some(raw)) => serde_json::from_value(raw.clone())?,
        _ => embedder.embed(content, false)?,
    };

    conn.execute(
        "DELETE FROM chunk_embeddings WHERE chunk_id = ?1",
        params![id],
    )?;
    conn.execute(
        "INSERT INTO chunk_embeddings (chunk_id, embedding) VALUES (?1, ?2)",
        params![id, serde_json::to_string(&embedding)?],
    )?;

    Ok(true)
}

fn import_agent(conn: &Connection, record: &Value, on_conflict: ConflictPolicy) -> Result<bool> {
    let id = record_str(record, "id")?;

    if exists(conn, "SELECT 1 FROM agents WHERE id = ?1", id)? {
        match on_conflict {
            ConflictPolicy::Skip => return Ok(false),
            ConflictPolicy::Error => {
                return Err(MnemoError::Conflict(format!("agent already exists: {}", id)))
            }
            ConflictPolicy::Update => {}
        }
    }

    conn.execute(
        "INSERT OR REPLACE INTO agents (
            id, name, description, metadata, created_at, last_active_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            record_str(record, "name")?,
            record.get("description").and_then(|v| v.as_str()),
            record
                .get("metadata")
                .and_then(|v| v.as_str())
                .unwrap_or("{}"),
            record_str(record, "created_at")?,
            record
                .get("last_active_at")
                .and_then(|v| v.as_str())
                .unwrap_or(record_str(record, "created_at")?),
        ],
    )?;

    Ok(true)
}

fn import_message(conn: &Connection, record: &Value, on_conflict: ConflictPolicy) -> Result<bool> {
    let id = record_str(record, "id")?;

    if exists(conn, "SELECT 1 FROM messages WHERE id = ?1", id)? {
        match on_conflict {
            ConflictPolicy::Skip => return Ok(false),
            ConflictPolicy::Error => {
                return Err(MnemoError::Conflict(format!(
                    "message already exists: {}",
                    id
                )))
            }
            ConflictPolicy::Update => {}
        }
    }

    conn.execute(
        "INSERT OR REPLACE INTO messages (
            id, sender_id, receiver_id, agent_id, role, content, metadata, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            record_str(record, "sender_id")?,
            record.get("receiver_id").and_then(|v| v.as_str()),
            record.get("agent_id").and_then(|v| v.as_str()),
            record.get("role").and_then(|v| v.as_str()).unwrap_or("user"),
            record_str(record, "content")?,
            record
                .get("metadata")
                .and_then(|v| v.as_str())
                .unwrap_or("{}"),
            record_str(record, "created_at")?,
        ],
    )?;

    Ok(true)
}

fn import_link(conn: &Connection, record: &Value, on_conflict: ConflictPolicy) -> Result<bool> {
    let source_id = record_str(record, "source_id")?;
    let target_id = record_str(record, "target_id")?;
    let link_type = record_str(record, "link_type")?;

    let duplicate: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM memory_links
             WHERE source_id = ?1 AND target_id = ?2 AND link_type = ?3",
            params![source_id, target_id, link_type],
            |row| row.get(0),
        )
        .optional()?;

    if duplicate.is_some() {
        match on_conflict {
            ConflictPolicy::Skip => return Ok(false),
            ConflictPolicy::Error => {
                return Err(MnemoError::Conflict(format!(
                    "link already exists: {} -> {} ({})",
                    source_id, target_id, link_type
                )))
            }
            ConflictPolicy::Update => {
                conn.execute(
                    "DELETE FROM memory_links
                     WHERE source_id = ?1 AND target_id = ?2 AND link_type = ?3",
                    params![source_id, target_id, link_type],
                )?;
            }
        }
    }

    let metadata = match record.get("metadata") {
        Some(Value::String(s)) => s.clone(),
        Some(value @ Value::Object(_)) => value.to_string(),
        _ => "{}".to_string(),
    };

    conn.execute(
        "INSERT INTO memory_links (
            id, source_id, target_id, link_type, metadata, strength,
            cascade_on_update, cascade_on_delete, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record_str(record, "id")?,
            source_id,
            target_id,
            link_type,
            metadata,
            record
                .get("strength")
                .and_then(|v| v.as_f64())
                .unwrap_or(1.0),
            record
                .get("cascade_on_update")
                .and_then(|v| v.as_bool().or_else(|| v.as_i64().map(|i| i != 0)))
                .unwrap_or(false) as i64,
            record
                .get("cascade_on_delete")
                .and_then(|v| v.as_bool().or_else(|| v.as_i64().map(|i| i != 0)))
                .unwrap_or(false) as i64,
            record_str(record, "created_at")?,
        ],
    )?;

    Ok(true)
}

fn import_decay_config(conn: &Connection, record: &Value) -> Result<bool> {
    conn.execute(
        "INSERT OR REPLACE INTO decay_config (
            id, enabled, threshold, grace_period_days, max_delete_per_run,
            last_run_at, updated_at
        ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record
                .get("enabled")
                .and_then(|v| v.as_bool().or_else(|| v.as_i64().map(|i| i != 0)))
                .unwrap_or(false) as i64,
            record
                .get("threshold")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.1),
            record
                .get("grace_period_days")
                .and_then(|v| v.as_i64())
                .unwrap_or(7),
            record
                .get("max_delete_per_run")
                .and_then(|v| v.as_i64())
                .unwrap_or(100),
            record.get("last_run_at").and_then(|v| v.as_str()),
            record
                .get("updated_at")
                .and_then(|v| v.as_str())
                .unwrap_or(&Utc::now().to_rfc3339()),
        ],
    )?;

    Ok(true)
}
