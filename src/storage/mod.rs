//! Storage substrate for Mnemo
//!
//! SQLite with the sqlite-vec extension for cosine vector search and FTS5
//! for keyword search. One writer at a time, serialized by the storage lock.

mod connection;
mod migrations;
pub mod queries;

pub use connection::Storage;
pub use migrations::{run_migrations, SCHEMA_VERSION};
