//! Storage interface shared by database engines.

use std::path::Path;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection};
use serde_json::Value;
use tracing::debug;

use sem_core::{DocumentId, Entry, Result, SemError, StoredDocument, StoredObject, Triple};

use crate::rows::RowStream;

/// Transactional document store.
///
/// A store owns one connection with exactly one open transaction. Writes
/// land in that transaction until [`commit`](Database::commit),
/// [`save`](Database::save) or a [`copy`](Database::copy) moves the
/// boundary.
pub trait Database {
    // Write operations
    fn insert_document(
        &mut self,
        uid: &DocumentId,
        data: &Value,
        tags: Option<&str>,
        entry: &Entry,
    ) -> Result<()>;
    fn insert_object(
        &mut self,
        uid: &DocumentId,
        object: &[u8],
        tags: Option<&str>,
        entry: &Entry,
    ) -> Result<()>;
    fn delete(&mut self, ids: &[DocumentId]) -> Result<usize>;
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize>;

    // Read operations
    fn query(&mut self, sql: &str, params: Vec<SqlValue>) -> Result<()>;
    fn rows(&mut self) -> RowStream<'_>;
    fn document(&self, uid: &DocumentId) -> Result<Option<StoredDocument>>;
    fn object(&self, uid: &DocumentId) -> Result<Option<StoredObject>>;
    fn table_count(&self, table: &str) -> Result<u64>;

    fn count(&self) -> Result<u64> {
        self.table_count("documents")
    }

    /// Register SQL scalar functions. Engines without user functions keep
    /// this no-op.
    fn add_functions(&mut self) -> Result<()> {
        Ok(())
    }

    // Lifecycle
    fn commit(&mut self) -> Result<()>;
    fn copy(&mut self, path: &Path) -> Result<()>;
    fn save(&mut self, path: &Path) -> Result<()>;
    fn close(self) -> Result<()>
    where
        Self: Sized;

    /// Write canonical triples as documents, one section each, numbering
    /// sections from `start`. Returns the next free index id.
    fn insert<I>(&mut self, triples: I, start: i64) -> Result<i64>
    where
        I: IntoIterator<Item = Triple>,
        Self: Sized,
    {
        let mut indexid = start;
        for triple in triples {
            let uid = triple.id.as_ref().ok_or_else(|| {
                SemError::invalid_argument(format!("document without id: {}", triple.data))
            })?;

            let tags = triple.tags.as_deref();
            let entry = Entry::now().with_section(indexid, triple.text(), tags);
            self.insert_document(uid, &triple.data, tags, &entry)?;
            indexid += 1;
        }

        Ok(indexid)
    }
}

/// Delete the row keyed by `uid` from `table`.
pub(crate) fn delete_row(conn: &Connection, table: &str, uid: &DocumentId) -> Result<usize> {
    let deleted = conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", table),
        params![uid.to_string()],
    )?;
    Ok(deleted)
}

/// Replace the sections derived from `uid` with those carried by `entry`.
pub(crate) fn write_sections(
    conn: &Connection,
    sections: &str,
    uid: &DocumentId,
    entry: &Entry,
) -> Result<()> {
    delete_row(conn, sections, uid)?;

    let mut stmt = conn.prepare_cached(&format!(
        "INSERT INTO {} (indexid, id, text, tags, entry) VALUES (?1, ?2, ?3, ?4, ?5)",
        sections
    ))?;
    for section in &entry.sections {
        stmt.execute(params![
            section.indexid,
            uid.to_string(),
            section.text,
            section.tags,
            entry.timestamp,
        ])?;
    }

    debug!("Wrote {} sections for {}", entry.sections.len(), uid);
    Ok(())
}
