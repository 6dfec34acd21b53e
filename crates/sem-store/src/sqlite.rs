//! SQLite-based document store.

use std::path::{Path, PathBuf};

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info};

use sem_core::{
    DatabaseConfig, DocumentId, Entry, Result, SemError, StoredDocument, StoredObject,
};

use crate::connection;
use crate::database::{delete_row, write_sections, Database};
use crate::functions;
use crate::migrate::{self, Step};
use crate::rows::{PendingQuery, RowStream};
use crate::schema;

/// SQLite store holding one connection with one open transaction.
pub struct SqliteDatabase {
    /// Active connection, replaced by a successful copy.
    conn: Connection,

    /// Backing file, `None` for in-memory stores.
    path: Option<PathBuf>,

    config: DatabaseConfig,

    /// Query waiting to be streamed by `rows()`.
    pending: Option<PendingQuery>,

    #[cfg(test)]
    fail_after: Option<Step>,
}

impl SqliteDatabase {
    /// Open or create the store described by `config`.
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        schema::validate_identifier(&config.sections_table)?;
        let conn = connection::connect(config.path.as_deref(), config)?;

        Ok(Self {
            conn,
            path: config.path.clone(),
            config: config.clone(),
            pending: None,
            #[cfg(test)]
            fail_after: None,
        })
    }

    /// Open or create a store file at `path` with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect(&DatabaseConfig::at(path.as_ref()))
    }

    /// Open an in-memory store.
    pub fn open_memory() -> Result<Self> {
        Self::connect(&DatabaseConfig::default())
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Name of the active sections table.
    pub fn sections_table(&self) -> &str {
        &self.config.sections_table
    }

    /// Whether `path` names the file currently backing this store.
    fn is_current(&self, path: &Path) -> bool {
        let Some(current) = &self.path else {
            return false;
        };

        match (current.canonicalize(), path.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => current == path,
        }
    }

    #[cfg(test)]
    fn fail_after(&self) -> Option<Step> {
        self.fail_after
    }

    #[cfg(not(test))]
    fn fail_after(&self) -> Option<Step> {
        None
    }
}

/// Parse a stored `data` column. Values are serialized JSON text.
fn json_value(value: SqlValue) -> Result<Value> {
    match value {
        SqlValue::Null => Ok(Value::Null),
        SqlValue::Text(text) => Ok(serde_json::from_str(&text)?),
        other => Err(SemError::database(format!(
            "document data is not JSON text: {:?}",
            other
        ))),
    }
}

impl Database for SqliteDatabase {
    fn insert_document(
        &mut self,
        uid: &DocumentId,
        data: &Value,
        tags: Option<&str>,
        entry: &Entry,
    ) -> Result<()> {
        delete_row(&self.conn, "documents", uid)?;
        self.conn.execute(
            "INSERT INTO documents (id, data, tags, entry) VALUES (?1, ?2, ?3, ?4)",
            params![
                uid.to_string(),
                serde_json::to_string(data)?,
                tags,
                entry.timestamp
            ],
        )?;

        write_sections(&self.conn, &self.config.sections_table, uid, entry)?;
        debug!("Upserted document {}", uid);
        Ok(())
    }

    fn insert_object(
        &mut self,
        uid: &DocumentId,
        object: &[u8],
        tags: Option<&str>,
        entry: &Entry,
    ) -> Result<()> {
        delete_row(&self.conn, "objects", uid)?;
        self.conn.execute(
            "INSERT INTO objects (id, object, tags, entry) VALUES (?1, ?2, ?3, ?4)",
            params![uid.to_string(), object, tags, entry.timestamp],
        )?;

        write_sections(&self.conn, &self.config.sections_table, uid, entry)?;
        debug!("Upserted object {} ({} bytes)", uid, object.len());
        Ok(())
    }

    fn delete(&mut self, ids: &[DocumentId]) -> Result<usize> {
        let mut deleted = 0;
        for uid in ids {
            deleted += delete_row(&self.conn, "documents", uid)?;
            deleted += delete_row(&self.conn, "objects", uid)?;
            delete_row(&self.conn, &self.config.sections_table, uid)?;
        }

        debug!("Deleted {} rows for {} ids", deleted, ids.len());
        Ok(deleted)
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        Ok(self.conn.execute(sql, params_from_iter(params.iter()))?)
    }

    fn query(&mut self, sql: &str, params: Vec<SqlValue>) -> Result<()> {
        // Surface syntax errors now rather than on first fetch
        self.conn.prepare_cached(sql)?;

        self.pending = Some(PendingQuery {
            sql: sql.to_string(),
            params,
        });
        Ok(())
    }

    fn rows(&mut self) -> RowStream<'_> {
        RowStream::new(&self.conn, self.pending.take(), self.config.fetch_size)
    }

    fn document(&self, uid: &DocumentId) -> Result<Option<StoredDocument>> {
        let row = self
            .conn
            .query_row(
                "SELECT data, tags, entry FROM documents WHERE id = ?1",
                params![uid.to_string()],
                |row| {
                    Ok((
                        row.get::<_, SqlValue>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(data, tags, entry)| {
            Ok(StoredDocument {
                id: uid.clone(),
                data: json_value(data)?,
                tags,
                entry,
            })
        })
        .transpose()
    }

    fn object(&self, uid: &DocumentId) -> Result<Option<StoredObject>> {
        let row = self
            .conn
            .query_row(
                "SELECT object, tags, entry FROM objects WHERE id = ?1",
                params![uid.to_string()],
                |row| {
                    Ok(StoredObject {
                        id: uid.clone(),
                        object: row.get::<_, Option<Vec<u8>>>(0)?.unwrap_or_default(),
                        tags: row.get(1)?,
                        entry: row.get(2)?,
                    })
                },
            )
            .optional()?;

        Ok(row)
    }

    fn table_count(&self, table: &str) -> Result<u64> {
        schema::validate_identifier(table)?;

        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
        Ok(count as u64)
    }

    fn add_functions(&mut self) -> Result<()> {
        functions::register(&self.conn)?;
        debug!("Registered SQL functions");
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        connection::commit(&self.conn)?;
        connection::begin(&self.conn)
    }

    fn copy(&mut self, path: &Path) -> Result<()> {
        if self.is_current(path) {
            return Err(SemError::invalid_argument(format!(
                "cannot copy database onto itself: {}",
                path.display()
            )));
        }

        let conn = migrate::copy(&self.conn, path, &self.config, self.fail_after())?;

        // The previous connection is dropped with its transaction open
        let previous = std::mem::replace(&mut self.conn, conn);
        drop(previous);

        self.path = Some(path.to_path_buf());
        self.config.path = self.path.clone();
        self.pending = None;

        info!("Database now backed by {:?}", path);
        Ok(())
    }

    fn save(&mut self, path: &Path) -> Result<()> {
        if self.is_current(path) {
            self.commit()
        } else {
            self.copy(path)
        }
    }

    fn close(self) -> Result<()> {
        connection::commit(&self.conn)?;
        self.conn.close().map_err(|(_, e)| SemError::from(e))?;

        debug!("Database closed");
        Ok(())
    }
}
