//! sem-store - Embedded transactional document store
//!
//! This crate persists documents, binary objects and their derived sections
//! in SQLite. Writes are upserts inside a single open transaction, reads
//! stream in fixed-size pages, and `copy` migrates the whole store into a
//! fresh database file through Parquet interchange files.

mod connection;
mod database;
mod functions;
mod migrate;
mod rows;
mod schema;
mod sqlite;

pub use database::Database;
pub use functions::{similarity, tagged};
pub use migrate::Step;
pub use rows::{Row, RowStream};
pub use sqlite::SqliteDatabase;

/// Column value type used by query parameters and result rows.
pub use rusqlite::types::Value as SqlValue;

// Re-export schema for migrations
pub use schema::{
    create_sections, create_sections_index, validate_identifier, CREATE_DOCUMENTS,
    CREATE_OBJECTS,
};
