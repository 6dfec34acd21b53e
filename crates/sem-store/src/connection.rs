//! Connection setup and transaction boundaries.
//!
//! A store's connection always has exactly one open transaction between
//! calls. [`begin`] and [`commit`] are the only places that move the
//! boundary.

use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info};

use sem_core::{DatabaseConfig, Result, SemError};

use crate::schema;

/// Open a connection at `path` (or in memory), configure it, create the
/// schema and begin a transaction.
pub(crate) fn connect(path: Option<&Path>, config: &DatabaseConfig) -> Result<Connection> {
    let conn = open(path, config)?;
    schema::create_all(&conn, &config.sections_table)?;
    begin(&conn)?;

    info!(
        "Database opened at {}",
        path.map_or_else(|| ":memory:".to_string(), |p| p.display().to_string())
    );
    Ok(conn)
}

/// Open and configure a connection without creating schema.
pub(crate) fn open(path: Option<&Path>, config: &DatabaseConfig) -> Result<Connection> {
    let conn = match path {
        Some(path) => {
            // Ensure parent directory exists
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }

            Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        }
        None => Connection::open_in_memory()?,
    };

    configure(&conn, config)?;
    Ok(conn)
}

/// Configure SQLite pragmas. Must run outside a transaction.
fn configure(conn: &Connection, config: &DatabaseConfig) -> Result<()> {
    let journal_mode = if config.wal_mode { "WAL" } else { "DELETE" };

    conn.execute_batch(&format!(
        r#"
        PRAGMA journal_mode = {};
        PRAGMA synchronous = NORMAL;
        PRAGMA cache_size = {};
        PRAGMA busy_timeout = {};
        PRAGMA temp_store = MEMORY;
        "#,
        journal_mode, config.cache_size, config.busy_timeout_ms
    ))?;

    Ok(())
}

/// Begin the connection's transaction.
pub(crate) fn begin(conn: &Connection) -> Result<()> {
    if !conn.is_autocommit() {
        return Err(SemError::database("a transaction is already open"));
    }

    conn.execute_batch("BEGIN")?;
    debug!("Transaction started");
    Ok(())
}

/// Commit the open transaction, leaving the connection in autocommit mode.
pub(crate) fn commit(conn: &Connection) -> Result<()> {
    if conn.is_autocommit() {
        return Err(SemError::database("no open transaction to commit"));
    }

    conn.execute_batch("COMMIT")?;
    debug!("Transaction committed");
    Ok(())
}

/// Flush the write-ahead log into the main database file.
pub(crate) fn checkpoint(conn: &Connection) -> Result<()> {
    conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
    Ok(())
}

/// Remove a database file and its WAL sidecars, ignoring missing files.
pub(crate) fn remove_files(path: &Path) -> Result<()> {
    let mut sidecars = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        sidecars.push(name.into());
    }

    for file in sidecars {
        match std::fs::remove_file(&file) {
            Ok(()) => debug!("Removed {:?}", file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_opens_transaction() {
        let conn = connect(None, &DatabaseConfig::default()).unwrap();
        assert!(!conn.is_autocommit());
    }

    #[test]
    fn test_single_transaction() {
        let conn = connect(None, &DatabaseConfig::default()).unwrap();
        assert!(begin(&conn).is_err());

        commit(&conn).unwrap();
        assert!(conn.is_autocommit());
        assert!(commit(&conn).is_err());

        begin(&conn).unwrap();
        assert!(!conn.is_autocommit());
    }

    #[test]
    fn test_remove_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.sqlite");

        {
            let conn = connect(Some(&path), &DatabaseConfig::default()).unwrap();
            commit(&conn).unwrap();
        }
        assert!(path.exists());

        remove_files(&path).unwrap();
        assert!(!path.exists());

        // Missing files are fine
        remove_files(&path).unwrap();
    }
}
