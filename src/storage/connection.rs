//! Database connection management
//!
//! Wraps a single SQLite connection behind a process-wide lock: readers
//! share the handle, the one in-flight writer holds it across its
//! transaction. sqlite-vec is registered as an auto-extension so the vec0
//! virtual tables are available to every connection.

use std::path::Path;
use std::sync::Arc;
use std::sync::Once;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};

use super::migrations::run_migrations;
use crate::error::Result;

static VEC_EXTENSION: Once = Once::new();

/// Register sqlite-vec before any connection opens
fn register_vec_extension() {
    VEC_EXTENSION.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

/// Storage engine wrapping SQLite
pub struct Storage {
    db_path: String,
    dimensions: usize,
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// Open or create a database at the given path and run migrations
    pub fn open(db_path: &str, dimensions: usize) -> Result<Self> {
        let conn = Self::create_connection(db_path)?;
        run_migrations(&conn, dimensions)?;

        Ok(Self {
            db_path: db_path.to_string(),
            dimensions,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        Self::open(":memory:", dimensions)
    }

    fn create_connection(db_path: &str) -> Result<Connection> {
        register_vec_extension();

        let conn = if db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(db_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            Connection::open_with_flags(db_path, flags)?
        };

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=30000;
            PRAGMA cache_size=-64000;
            PRAGMA temp_store=MEMORY;
            PRAGMA foreign_keys=ON;
            "#,
        )?;

        Ok(conn)
    }

    /// Execute a function with the shared connection (read path)
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a function inside a transaction
    ///
    /// Commits on Ok, rolls back on Err. The storage lock is held for the
    /// whole transaction, which gives exactly one in-flight writer per
    /// process. Query helpers take `&Connection`, so code already inside a
    /// transaction reuses the transaction connection instead of nesting.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                // Drop rolls the transaction back
                Err(e)
            }
        }
    }

    /// Embedding dimension fixed at migration time
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Database path
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Database size in bytes
    pub fn db_size(&self) -> Result<i64> {
        self.with_connection(|conn| {
            let size: i64 = conn.query_row(
                "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                [],
                |row| row.get(0),
            )?;
            Ok(size)
        })
    }

    /// Vacuum the database to reclaim space
    pub fn vacuum(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch("VACUUM;")?;
            Ok(())
        })
    }
}

impl Clone for Storage {
    fn clone(&self) -> Self {
        Self {
            db_path: self.db_path.clone(),
            dimensions: self.dimensions,
            conn: self.conn.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let storage = Storage::open_in_memory(8).unwrap();
        assert_eq!(storage.db_path(), ":memory:");
        assert_eq!(storage.dimensions(), 8);
    }

    #[test]
    fn test_transaction_rollback_on_error() {
        let storage = Storage::open_in_memory(8).unwrap();

        let result: Result<()> = storage.with_transaction(|conn| {
            conn.execute(
                "INSERT INTO agents (id, name, created_at, last_active_at)
                 VALUES ('a1', 'test', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
                [],
            )?;
            Err(crate::error::MnemoError::Storage("boom".into()))
        });
        assert!(result.is_err());

        let count: i64 = storage
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM agents", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_vec_extension_loaded() {
        let storage = Storage::open_in_memory(8).unwrap();
        let version: String = storage
            .with_connection(|conn| Ok(conn.query_row("SELECT vec_version()", [], |r| r.get(0))?))
            .unwrap();
        assert!(!version.is_empty());
    }
}
