//! Database queries for memory operations
//!
//! All helpers take `&Connection` so callers inside a transaction reuse the
//! transaction connection. Dynamic filters are built with bound placeholders
//! only; the update path writes a fixed column whitelist.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{MnemoError, Result};
use crate::types::*;

/// Column list shared by every memory SELECT
pub const MEMORY_COLUMNS: &str = "m.id, m.content, m.content_type, m.memory_tier, m.tags, \
     m.metadata, m.agent_id, m.created_at, m.updated_at, m.expires_at, \
     m.importance_score, m.access_count, m.last_accessed_at, \
     m.consolidated_from, m.namespace, m.schema_id, m.structured_content, m.version";

/// Parse an RFC3339 timestamp, falling back to now on malformed input
pub fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_dt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

/// Parse a memory from a database row
pub fn memory_from_row(row: &Row) -> rusqlite::Result<Memory> {
    let content_type_str: String = row.get("content_type")?;
    let tier_str: String = row.get("memory_tier")?;
    let tags_str: String = row.get("tags")?;
    let metadata_str: String = row.get("metadata")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let expires_at: Option<String> = row.get("expires_at")?;
    let last_accessed_at: Option<String> = row.get("last_accessed_at")?;
    let consolidated_from: Option<String> = row.get("consolidated_from")?;
    let structured_content: Option<String> = row.get("structured_content")?;

    Ok(Memory {
        id: row.get("id")?,
        content: row.get("content")?,
        content_type: content_type_str.parse().unwrap_or_default(),
        tier: tier_str.parse().unwrap_or_default(),
        tags: serde_json::from_str(&tags_str).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_str).unwrap_or_default(),
        agent_id: row.get("agent_id")?,
        created_at: parse_dt(&created_at),
        updated_at: parse_dt(&updated_at),
        expires_at: parse_opt_dt(expires_at),
        importance_score: row.get("importance_score")?,
        access_count: row.get("access_count")?,
        last_accessed_at: parse_opt_dt(last_accessed_at),
        consolidated_from: consolidated_from.and_then(|s| serde_json::from_str(&s).ok()),
        namespace: row.get("namespace")?,
        schema_id: row.get("schema_id")?,
        structured_content: structured_content.and_then(|s| serde_json::from_str(&s).ok()),
        version: row.get("version")?,
    })
}

/// Insert a memory together with its document embedding
pub fn insert_memory(conn: &Connection, memory: &Memory, embedding: &[f32]) -> Result<()> {
    let inserted = conn.execute(
        "INSERT INTO memories (
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
    );

    match inserted {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(e, msg))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(MnemoError::Conflict(format!(
                "memory {} already exists: {}",
                memory.id,
                msg.unwrap_or_default()
            )));
        }
        Err(e) => return Err(e.into()),
    }

    conn.execute(
        "INSERT INTO embeddings (memory_id, embedding) VALUES (?1, ?2)",
        params![memory.id, serde_json::to_string(embedding)?],
    )?;

    Ok(())
}

/// Find a memory by id
pub fn find_memory(conn: &Connection, id: &str) -> Result<Option<Memory>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {MEMORY_COLUMNS} FROM memories m WHERE m.id = ?1"
    ))?;

    Ok(stmt.query_row(params![id], memory_from_row).optional()?)
}

/// Capture a pre-image snapshot of the current state into memory_versions
pub fn snapshot_version(
    conn: &Connection,
    memory: &Memory,
    change_reason: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO memory_versions (
            id, memory_id, version, content, content_type, tags, metadata,
            created_at, change_reason
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            new_id(),
            memory.id,
            memory.version,
            memory.content,
            memory.content_type.as_str(),
            serde_json::to_string(&memory.tags)?,
            serde_json::to_string(&memory.metadata)?,
            Utc::now().to_rfc3339(),
            change_reason,
        ],
    )?;
    Ok(())
}

/// Apply a whitelisted update: snapshot the pre-image, mutate, bump version
///
/// Caller wraps this in a transaction; a content change also requires the
/// caller to replace the embedding row.
pub fn update_memory(
    conn: &Connection,
    id: &str,
    update: &MemoryUpdate,
    change_reason: Option<&str>,
) -> Result<Option<Memory>> {
    let Some(current) = find_memory(conn, id)? else {
        return Ok(None);
    };

    if update.is_empty() {
        return Ok(Some(current));
    }

    snapshot_version(conn, &current, change_reason)?;

    // Fixed column whitelist: content, tags, metadata, memory_tier, expires_at
    let mut set_clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ref content) = update.content {
        set_clauses.push("content = ?");
        params.push(Box::new(content.clone()));
    }
    if let Some(ref tags) = update.tags {
        set_clauses.push("tags = ?");
        params.push(Box::new(serde_json::to_string(tags)?));
    }
    if let Some(ref metadata) = update.metadata {
        set_clauses.push("metadata = ?");
        params.push(Box::new(serde_json::to_string(metadata)?));
    }
    if let Some(tier) = update.tier {
        set_clauses.push("memory_tier = ?");
        params.push(Box::new(tier.as_str()));
    }
    if let Some(ref expires_at) = update.expires_at {
        set_clauses.push("expires_at = ?");
        params.push(Box::new(expires_at.map(|d| d.to_rfc3339())));
    }

    set_clauses.push("updated_at = ?");
    params.push(Box::new(Utc::now().to_rfc3339()));
    set_clauses.push("version = version + 1");

    params.push(Box::new(id.to_string()));

    let sql = format!(
        "UPDATE memories SET {} WHERE id = ?",
        set_clauses.join(", ")
    );
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();
    conn.execute(&sql, param_refs.as_slice())?;

    find_memory(conn, id)
}

/// Replace the embedding row for a memory
pub fn replace_embedding(conn: &Connection, id: &str, embedding: &[f32]) -> Result<()> {
    conn.execute(
        "UPDATE embeddings SET embedding = ?1 WHERE memory_id = ?2",
        params![serde_json::to_string(embedding)?, id],
    )?;
    Ok(())
}

/// Fetch the stored embedding for a memory
pub fn get_embedding(conn: &Connection, id: &str) -> Result<Option<Vec<f32>>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT vec_to_json(embedding) FROM embeddings WHERE memory_id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;

    Ok(json.and_then(|j| serde_json::from_str(&j).ok()))
}

/// Delete one memory; the embedding row goes first (vec0 has no FK support),
/// foreign keys cascade the rest
pub fn delete_memory(conn: &Connection, id: &str) -> Result<bool> {
    conn.execute(
        "DELETE FROM embeddings WHERE memory_id = ?1",
        params![id],
    )?;
    let deleted = conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

fn repeat_vars(count: usize) -> String {
    let mut s = "?,".repeat(count);
    s.pop();
    s
}

/// Delete a set of memories in one pass
pub fn delete_memories(conn: &Connection, ids: &[String]) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }

    let placeholders = repeat_vars(ids.len());
    let param_refs: Vec<&dyn rusqlite::ToSql> =
        ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();

    conn.execute(
        &format!("DELETE FROM embeddings WHERE memory_id IN ({placeholders})"),
        param_refs.as_slice(),
    )?;
    let deleted = conn.execute(
        &format!("DELETE FROM memories WHERE id IN ({placeholders})"),
        param_refs.as_slice(),
    )?;

    Ok(deleted)
}

/// Collect ids of memories matching tier / age criteria
pub fn select_ids(
    conn: &Connection,
    tier: Option<MemoryTier>,
    older_than: Option<DateTime<Utc>>,
) -> Result<Vec<String>> {
    let mut where_clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(tier) = tier {
        where_clauses.push("memory_tier = ?");
        params.push(Box::new(tier.as_str()));
    }
    if let Some(older_than) = older_than {
        where_clauses.push("created_at < ?");
        params.push(Box::new(older_than.to_rfc3339()));
    }

    if where_clauses.is_empty() {
        return Ok(vec![]);
    }

    let sql = format!(
        "SELECT id FROM memories WHERE {}",
        where_clauses.join(" AND ")
    );
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(param_refs.as_slice(), |row| row.get::<_, String>(0))?
        .filter_map(|r| r.ok())
        .collect();

    Ok(ids)
}

/// Ids of memories whose TTL has elapsed
pub fn expired_ids(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id FROM memories WHERE expires_at IS NOT NULL AND expires_at < ?1",
    )?;
    let ids = stmt
        .query_map(params![now.to_rfc3339()], |row| row.get::<_, String>(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(ids)
}

/// Append namespace / tier / content-type / tag predicates for the `m` alias
fn push_search_filters(
    sql: &mut String,
    params: &mut Vec<Box<dyn rusqlite::ToSql>>,
    filters: &SearchFilters,
) {
    if let Some(ref namespace) = filters.namespace {
        match filters.search_scope {
            SearchScope::Current => {
                sql.push_str(" AND m.namespace = ?");
                params.push(Box::new(namespace.clone()));
            }
            SearchScope::Shared => {
                sql.push_str(" AND m.namespace IN (?, 'shared')");
                params.push(Box::new(namespace.clone()));
            }
            SearchScope::All => {}
        }
    }

    if let Some(tier) = filters.tier {
        sql.push_str(" AND m.memory_tier = ?");
        params.push(Box::new(tier.as_str()));
    }

    if let Some(content_type) = filters.content_type {
        sql.push_str(" AND m.content_type = ?");
        params.push(Box::new(content_type.as_str()));
    }

    if let Some(ref tags) = filters.tags {
        for tag in tags {
            sql.push_str(" AND EXISTS (SELECT 1 FROM json_each(m.tags) WHERE value = ?)");
            params.push(Box::new(tag.clone()));
        }
    }
}

/// kNN over the vector index
///
/// The LIMIT sits inside the vec0 subquery, which the engine requires for
/// knn plans. Cosine distance spans 0..2; similarity = 1 - distance/2.
pub fn vector_search(
    conn: &Connection,
    embedding: &[f32],
    top_k: usize,
    filters: &SearchFilters,
) -> Result<Vec<(Memory, f32)>> {
    let mut sql = format!(
        "SELECT {MEMORY_COLUMNS}, (1.0 - e.distance / 2.0) AS similarity
         FROM (
             SELECT memory_id, distance
             FROM embeddings
             WHERE embedding MATCH ?
             ORDER BY distance
             LIMIT ?
         ) e
         JOIN memories m ON m.id = e.memory_id"
    );

    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![
        Box::new(serde_json::to_string(embedding)?),
        Box::new(top_k as i64),
    ];
    push_search_filters(&mut sql, &mut params, filters);
    sql.push_str(" ORDER BY e.distance");

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt.query_map(param_refs.as_slice(), |row| {
        let memory = memory_from_row(row)?;
        let similarity: f64 = row.get("similarity")?;
        Ok((memory, similarity as f32))
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// BM25 keyword search; returns (memory_id, raw bm25 score) pairs.
/// BM25 can be negative, callers use the absolute value as magnitude.
pub fn keyword_search(
    conn: &Connection,
    fts_query: &str,
    top_k: usize,
    filters: &SearchFilters,
) -> Result<Vec<(String, f64)>> {
    let mut sql = String::from(
        "SELECT m.id, bm25(memories_fts) AS score
         FROM memories_fts
         JOIN memories m ON memories_fts.content_id = m.id
         WHERE memories_fts MATCH ?",
    );

    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(fts_query.to_string())];
    push_search_filters(&mut sql, &mut params, filters);

    sql.push_str(" ORDER BY score LIMIT ?");
    params.push(Box::new(top_k as i64));

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt.query_map(param_refs.as_slice(), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// List memories with filters and pagination, newest first
pub fn list_memories(
    conn: &Connection,
    filters: &ListFilters,
    limit: usize,
    offset: usize,
) -> Result<(Vec<Memory>, i64)> {
    let mut where_sql = String::from("1=1");
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(tier) = filters.tier {
        where_sql.push_str(" AND m.memory_tier = ?");
        params.push(Box::new(tier.as_str()));
    }
    if let Some(content_type) = filters.content_type {
        where_sql.push_str(" AND m.content_type = ?");
        params.push(Box::new(content_type.as_str()));
    }
    if let Some(ref namespace) = filters.namespace {
        where_sql.push_str(" AND m.namespace = ?");
        params.push(Box::new(namespace.clone()));
    }
    if let Some(created_after) = filters.created_after {
        where_sql.push_str(" AND m.created_at >= ?");
        params.push(Box::new(created_after.to_rfc3339()));
    }
    if let Some(created_before) = filters.created_before {
        where_sql.push_str(" AND m.created_at <= ?");
        params.push(Box::new(created_before.to_rfc3339()));
    }
    if let Some(ref tags) = filters.tags {
        for tag in tags {
            where_sql.push_str(" AND EXISTS (SELECT 1 FROM json_each(m.tags) WHERE value = ?)");
            params.push(Box::new(tag.clone()));
        }
    }

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM memories m WHERE {where_sql}"),
        param_refs.as_slice(),
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {MEMORY_COLUMNS} FROM memories m
         WHERE {where_sql}
         ORDER BY m.created_at DESC
         LIMIT ? OFFSET ?"
    );

    let mut page_params = params;
    page_params.push(Box::new(limit as i64));
    page_params.push(Box::new(offset as i64));
    let page_refs: Vec<&dyn rusqlite::ToSql> = page_params.iter().map(|b| b.as_ref()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(page_refs.as_slice(), memory_from_row)?;

    let mut memories = Vec::new();
    for row in rows {
        memories.push(row?);
    }

    Ok((memories, total))
}

/// Log an access with rate limiting
///
/// A log row is inserted only when no row exists for the same
/// (memory_id, access_type) within the window. access_count and
/// last_accessed_at are updated on every call regardless.
pub fn log_access(
    conn: &Connection,
    memory_id: &str,
    access_type: &str,
    rate_limit_seconds: i64,
) -> Result<()> {
    let now = Utc::now();
    let window_start = now - chrono::Duration::seconds(rate_limit_seconds);

    let recent: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM memory_access_log
             WHERE memory_id = ?1 AND access_type = ?2 AND accessed_at > ?3
             LIMIT 1",
            params![memory_id, access_type, window_start.to_rfc3339()],
            |row| row.get(0),
        )
        .optional()?;

    if recent.is_none() {
        conn.execute(
            "INSERT INTO memory_access_log (id, memory_id, access_type, accessed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![new_id(), memory_id, access_type, now.to_rfc3339()],
        )?;
    }

    conn.execute(
        "UPDATE memories
         SET access_count = access_count + 1, last_accessed_at = ?1
         WHERE id = ?2",
        params![now.to_rfc3339(), memory_id],
    )?;

    Ok(())
}

/// Ids linked to a memory in either direction
pub fn linked_ids(conn: &Connection, memory_id: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT source_id, target_id FROM memory_links
         WHERE source_id = ?1 OR target_id = ?1",
    )?;

    let mut ids = HashSet::new();
    let rows = stmt.query_map(params![memory_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    for row in rows {
        let (source, target) = row?;
        if source == memory_id {
            ids.insert(target);
        } else {
            ids.insert(source);
        }
    }

    Ok(ids)
}

/// All embeddings in a namespace, newest memories first
pub fn all_embeddings(
    conn: &Connection,
    namespace: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<(String, Vec<f32>)>> {
    let mut sql = String::from(
        "SELECT m.id, vec_to_json(e.embedding)
         FROM memories m
         JOIN embeddings e ON e.memory_id = m.id",
    );
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(namespace) = namespace {
        sql.push_str(" WHERE m.namespace = ?");
        params.push(Box::new(namespace.to_string()));
    }
    sql.push_str(" ORDER BY m.created_at DESC");
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ?");
        params.push(Box::new(limit as i64));
    }

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt.query_map(param_refs.as_slice(), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut results = Vec::new();
    for row in rows {
        let (id, json) = row?;
        if let Ok(embedding) = serde_json::from_str::<Vec<f32>>(&json) {
            results.push((id, embedding));
        }
    }
    Ok(results)
}

/// Rows of the access log for a memory (for rate-limit assertions and stats)
pub fn access_log_count(conn: &Connection, memory_id: &str, access_type: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memory_access_log WHERE memory_id = ?1 AND access_type = ?2",
        params![memory_id, access_type],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Version snapshots for a memory, newest first
pub fn get_versions(conn: &Connection, memory_id: &str, limit: usize) -> Result<Vec<MemoryVersion>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, memory_id, version, content, content_type, tags, metadata,
                created_at, change_reason
         FROM memory_versions
         WHERE memory_id = ?1
         ORDER BY version DESC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![memory_id, limit as i64], version_from_row)?;
    let mut versions = Vec::new();
    for row in rows {
        versions.push(row?);
    }
    Ok(versions)
}

/// Fetch a specific version snapshot
pub fn get_version(conn: &Connection, memory_id: &str, version: i64) -> Result<Option<MemoryVersion>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, memory_id, version, content, content_type, tags, metadata,
                created_at, change_reason
         FROM memory_versions
         WHERE memory_id = ?1 AND version = ?2",
    )?;

    Ok(stmt
        .query_row(params![memory_id, version], version_from_row)
        .optional()?)
}

/// Count snapshots for a memory
pub fn count_versions(conn: &Connection, memory_id: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memory_versions WHERE memory_id = ?1",
        params![memory_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Delete snapshots beyond the newest `max_keep`
pub fn prune_versions(conn: &Connection, memory_id: &str, max_keep: usize) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM memory_versions
         WHERE memory_id = ?1 AND version NOT IN (
             SELECT version FROM memory_versions
             WHERE memory_id = ?1
             ORDER BY version DESC
             LIMIT ?2
         )",
        params![memory_id, max_keep as i64],
    )?;
    Ok(deleted)
}

fn version_from_row(row: &Row) -> rusqlite::Result<MemoryVersion> {
    let content_type_str: String = row.get("content_type")?;
    let tags_str: String = row.get("tags")?;
    let metadata_str: String = row.get("metadata")?;
    let created_at: String = row.get("created_at")?;

    Ok(MemoryVersion {
        id: row.get("id")?,
        memory_id: row.get("memory_id")?,
        version: row.get("version")?,
        content: row.get("content")?,
        content_type: content_type_str.parse().unwrap_or_default(),
        tags: serde_json::from_str(&tags_str).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_str).unwrap_or_default(),
        created_at: parse_dt(&created_at),
        change_reason: row.get("change_reason")?,
    })
}

/// Shallow metadata merge shared by dedup and consolidation; later values
/// overwrite earlier ones on key collision
pub fn merge_metadata(
    base: &HashMap<String, serde_json::Value>,
    other: &HashMap<String, serde_json::Value>,
) -> HashMap<String, serde_json::Value> {
    let mut merged = base.clone();
    for (k, v) in other {
        merged.insert(k.clone(), v.clone());
    }
    merged
}
