//! Database migrations for Mnemo
//!
//! Migrations are ordered by integer version and recorded in
//! `schema_version`; applying migration N requires 1..N-1. Each migration
//! runs inside one transaction.

use chrono::Utc;
use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: i64 = 4;

/// Run all pending migrations
pub fn run_migrations(conn: &Connection, dimensions: usize) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        migrate_v1(conn, dimensions)?;
    }

    if current_version < 2 {
        migrate_v2(conn)?;
    }

    if current_version < 3 {
        migrate_v3(conn)?;
    }

    if current_version < SCHEMA_VERSION {
        migrate_v4(conn, dimensions)?;
    }

    Ok(())
}

fn record_version(conn: &Connection, version: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![version, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Initial schema (v1): agents, memories, vector tables, messages,
/// shared contexts, knowledge base
fn migrate_v1(conn: &Connection, dimensions: usize) -> Result<()> {
    conn.execute_batch("BEGIN")?;

    let result = (|| -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                last_active_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                content_type TEXT NOT NULL DEFAULT 'text',
                memory_tier TEXT NOT NULL DEFAULT 'long_term',
                tags TEXT NOT NULL DEFAULT '[]',
                metadata TEXT NOT NULL DEFAULT '{}',
                agent_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                expires_at TEXT,
                FOREIGN KEY (agent_id) REFERENCES agents(id)
            );

            CREATE INDEX IF NOT EXISTS idx_memories_tier ON memories(memory_tier);
            CREATE INDEX IF NOT EXISTS idx_memories_agent ON memories(agent_id);
            CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_memories_expires ON memories(expires_at)
                WHERE expires_at IS NOT NULL;

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                sender_id TEXT NOT NULL,
                receiver_id TEXT,
                agent_id TEXT,
                role TEXT NOT NULL DEFAULT 'user',
                content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender_id);

            CREATE TABLE IF NOT EXISTS shared_contexts (
                id TEXT PRIMARY KEY,
                key TEXT UNIQUE NOT NULL,
                value TEXT NOT NULL,
                owner_agent_id TEXT NOT NULL,
                access_level TEXT NOT NULL DEFAULT 'public',
                allowed_agents TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS knowledge_documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                source TEXT,
                category TEXT,
                version INTEGER NOT NULL DEFAULT 1,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS knowledge_chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                content TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                FOREIGN KEY (document_id) REFERENCES knowledge_documents(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_document
                ON knowledge_chunks(document_id, chunk_index);
            "#,
        )?;

        // Vector tables; dimension is fixed here for the database's lifetime
        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS embeddings USING vec0(
                memory_id TEXT PRIMARY KEY,
                embedding FLOAT[{dims}]
            );
            CREATE VIRTUAL TABLE IF NOT EXISTS chunk_embeddings USING vec0(
                chunk_id TEXT PRIMARY KEY,
                embedding FLOAT[{dims}]
            );",
            dims = dimensions
        ))?;

        record_version(conn, 1)
    })();

    finish_migration(conn, result, 1)
}

/// v2: importance scoring, access log, FTS5 with sync triggers
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch("BEGIN")?;

    let result = (|| -> Result<()> {
        conn.execute_batch(
            r#"
            ALTER TABLE memories ADD COLUMN importance_score REAL NOT NULL DEFAULT 0.5;
            ALTER TABLE memories ADD COLUMN access_count INTEGER NOT NULL DEFAULT 0;
            ALTER TABLE memories ADD COLUMN last_accessed_at TEXT;
            ALTER TABLE memories ADD COLUMN consolidated_from TEXT;

            CREATE TABLE memory_access_log (
                id TEXT PRIMARY KEY,
                memory_id TEXT NOT NULL,
                access_type TEXT NOT NULL,
                accessed_at TEXT NOT NULL,
                FOREIGN KEY (memory_id) REFERENCES memories(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_access_log_memory
                ON memory_access_log(memory_id, access_type, accessed_at DESC);

            CREATE VIRTUAL TABLE memories_fts USING fts5(
                content,
                content_id UNINDEXED,
                tokenize='unicode61'
            );

            INSERT INTO memories_fts (content, content_id)
            SELECT content, id FROM memories;

            CREATE TRIGGER memories_fts_insert AFTER INSERT ON memories
            BEGIN
                INSERT INTO memories_fts (content, content_id)
                VALUES (NEW.content, NEW.id);
            END;

            CREATE TRIGGER memories_fts_update AFTER UPDATE OF content ON memories
            BEGIN
                UPDATE memories_fts SET content = NEW.content
                WHERE content_id = NEW.id;
            END;

            CREATE TRIGGER memories_fts_delete AFTER DELETE ON memories
            BEGIN
                DELETE FROM memories_fts WHERE content_id = OLD.id;
            END;
            "#,
        )?;

        record_version(conn, 2)
    })();

    finish_migration(conn, result, 2)
}

/// v3: lifecycle layer - links, decay, versioning, schemas, notifications,
/// namespaces, smart chunking columns
fn migrate_v3(conn: &Connection) -> Result<()> {
    conn.execute_batch("BEGIN")?;

    let result = (|| -> Result<()> {
        conn.execute_batch(
            r#"
            ALTER TABLE memories ADD COLUMN namespace TEXT NOT NULL DEFAULT 'default';
            ALTER TABLE memories ADD COLUMN schema_id TEXT;
            ALTER TABLE memories ADD COLUMN structured_content TEXT;
            ALTER TABLE memories ADD COLUMN version INTEGER NOT NULL DEFAULT 1;

            CREATE INDEX idx_memories_namespace ON memories(namespace, created_at DESC);
            CREATE INDEX idx_memories_importance ON memories(importance_score, created_at);
            CREATE INDEX idx_memories_schema ON memories(schema_id)
                WHERE schema_id IS NOT NULL;

            CREATE TABLE memory_links (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                link_type TEXT NOT NULL DEFAULT 'related',
                metadata TEXT NOT NULL DEFAULT '{}',
                strength REAL NOT NULL DEFAULT 1.0,
                cascade_on_update INTEGER NOT NULL DEFAULT 0,
                cascade_on_delete INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (source_id) REFERENCES memories(id) ON DELETE CASCADE,
                FOREIGN KEY (target_id) REFERENCES memories(id) ON DELETE CASCADE,
                UNIQUE(source_id, target_id, link_type)
            );

            CREATE INDEX idx_links_source ON memory_links(source_id);
            CREATE INDEX idx_links_target ON memory_links(target_id);
            CREATE INDEX idx_links_type ON memory_links(link_type);

            CREATE TABLE dependency_notifications (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                notification_type TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                processed_at TEXT,
                FOREIGN KEY (source_id) REFERENCES memories(id) ON DELETE CASCADE,
                FOREIGN KEY (target_id) REFERENCES memories(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_notifications_target
                ON dependency_notifications(target_id, processed_at);

            CREATE TABLE memory_versions (
                id TEXT PRIMARY KEY,
                memory_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                content TEXT NOT NULL,
                content_type TEXT NOT NULL DEFAULT 'text',
                tags TEXT NOT NULL DEFAULT '[]',
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                change_reason TEXT,
                UNIQUE(memory_id, version),
                FOREIGN KEY (memory_id) REFERENCES memories(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_versions_memory ON memory_versions(memory_id, version DESC);

            CREATE TABLE memory_schemas (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                namespace TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                fields TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(namespace, name, version)
            );

            CREATE TABLE decay_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                enabled INTEGER NOT NULL DEFAULT 0,
                threshold REAL NOT NULL DEFAULT 0.1,
                grace_period_days INTEGER NOT NULL DEFAULT 7,
                max_delete_per_run INTEGER NOT NULL DEFAULT 100,
                last_run_at TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE decay_log (
                id TEXT PRIMARY KEY,
                run_at TEXT NOT NULL,
                deleted_count INTEGER NOT NULL,
                deleted_ids TEXT NOT NULL,
                threshold REAL NOT NULL,
                dry_run INTEGER NOT NULL
            );

            ALTER TABLE knowledge_chunks ADD COLUMN section_path TEXT NOT NULL DEFAULT '[]';
            ALTER TABLE knowledge_chunks ADD COLUMN has_previous INTEGER NOT NULL DEFAULT 0;
            ALTER TABLE knowledge_chunks ADD COLUMN has_next INTEGER NOT NULL DEFAULT 0;
            "#,
        )?;

        record_version(conn, 3)
    })();

    finish_migration(conn, result, 3)
}

/// v4: rebuild both vector tables with cosine distance
/// (backup -> drop -> recreate -> restore, one transaction)
fn migrate_v4(conn: &Connection, dimensions: usize) -> Result<()> {
    conn.execute_batch("BEGIN")?;

    let result = (|| -> Result<()> {
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE embeddings_backup AS
            SELECT memory_id, vec_to_json(embedding) AS embedding FROM embeddings;

            DROP TABLE embeddings;

            CREATE VIRTUAL TABLE embeddings USING vec0(
                memory_id TEXT PRIMARY KEY,
                embedding FLOAT[{dims}] distance_metric=cosine
            );

            INSERT INTO embeddings (memory_id, embedding)
            SELECT memory_id, embedding FROM embeddings_backup;

            DROP TABLE embeddings_backup;

            CREATE TABLE chunk_embeddings_backup AS
            SELECT chunk_id, vec_to_json(embedding) AS embedding FROM chunk_embeddings;

            DROP TABLE chunk_embeddings;

            CREATE VIRTUAL TABLE chunk_embeddings USING vec0(
                chunk_id TEXT PRIMARY KEY,
                embedding FLOAT[{dims}] distance_metric=cosine
            );

            INSERT INTO chunk_embeddings (chunk_id, embedding)
            SELECT chunk_id, embedding FROM chunk_embeddings_backup;

            DROP TABLE chunk_embeddings_backup;
            "#,
            dims = dimensions
        ))?;

        record_version(conn, 4)
    })();

    finish_migration(conn, result, 4)
}

fn finish_migration(conn: &Connection, result: Result<()>, version: i64) -> Result<()> {
    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
            tracing::info!(version, "migration applied");
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            tracing::error!(version, error = %e, "migration failed");
            Err(e)
        }
    }
}
