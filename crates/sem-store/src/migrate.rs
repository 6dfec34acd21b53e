//! Live schema migration: rebuild the store into a fresh database file.
//!
//! Tables are exported from the source connection to Parquet files in a
//! scratch directory, then imported into a new schema at the destination.
//! The source connection is only read. On failure the destination files are
//! removed and the scratch directory is released.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::builder::{BinaryBuilder, Int64Builder, StringBuilder};
use arrow_array::{Array, ArrayRef, BinaryArray, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use sem_core::{DatabaseConfig, Result, SemError};

use crate::connection;
use crate::schema::{self, ColumnType, TableSpec};

/// Steps of a migration, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    RemoveExisting,
    Connect,
    Export,
    Schema,
    Import,
    Index,
    Begin,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RemoveExisting => "remove existing",
            Self::Connect => "connect",
            Self::Export => "export",
            Self::Schema => "schema",
            Self::Import => "import",
            Self::Index => "index",
            Self::Begin => "begin",
        };
        write!(f, "{}", s)
    }
}

/// Destination connection that is discarded unless adopted.
struct Destination {
    conn: Option<Connection>,
    path: PathBuf,
}

impl Destination {
    fn conn(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| SemError::database("destination connection closed"))
    }

    fn adopt(mut self) -> Option<Connection> {
        self.conn.take()
    }
}

impl Drop for Destination {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            drop(conn);
            warn!("Discarding partial migration at {:?}", self.path);
            if let Err(e) = connection::remove_files(&self.path) {
                warn!("Failed to remove {:?}: {}", self.path, e);
            }
        }
    }
}

/// Copy the store behind `source` into a new database at `path` and return
/// its connection with a transaction open.
///
/// `fail_after` aborts once the named step completes; used to exercise the
/// failure path.
pub(crate) fn copy(
    source: &Connection,
    path: &Path,
    config: &DatabaseConfig,
    fail_after: Option<Step>,
) -> Result<Connection> {
    let checkpoint = |step: Step| -> Result<()> {
        debug!("Migration step complete: {}", step);
        if fail_after == Some(step) {
            return Err(SemError::migration(step.to_string(), "injected failure"));
        }
        Ok(())
    };
    let wrap =
        |step: Step| move |e: SemError| SemError::migration(step.to_string(), e.to_string());

    info!("Migrating database to {:?}", path);

    // Delete existing file, if necessary
    connection::remove_files(path).map_err(wrap(Step::RemoveExisting))?;
    checkpoint(Step::RemoveExisting)?;

    let destination = Destination {
        conn: Some(connection::open(Some(path), config).map_err(wrap(Step::Connect))?),
        path: path.to_path_buf(),
    };
    checkpoint(Step::Connect)?;

    let tables = TableSpec::migrated(&config.sections_table);
    let scratch = TempDir::new().map_err(|e| wrap(Step::Export)(e.into()))?;

    let mut counts = Vec::with_capacity(tables.len());
    for table in &tables {
        let count = export_table(source, table, scratch.path(), config.fetch_size)
            .map_err(wrap(Step::Export))?;
        counts.push(count);
    }
    checkpoint(Step::Export)?;

    let dest = destination.conn()?;
    schema::create_tables(dest, &config.sections_table).map_err(wrap(Step::Schema))?;
    checkpoint(Step::Schema)?;

    import_all(dest, &tables, &counts, scratch.path()).map_err(wrap(Step::Import))?;
    checkpoint(Step::Import)?;

    dest.execute_batch(&schema::create_sections_index(&config.sections_table))
        .map_err(|e| wrap(Step::Index)(e.into()))?;
    connection::checkpoint(dest).map_err(wrap(Step::Index))?;
    checkpoint(Step::Index)?;

    connection::begin(dest).map_err(wrap(Step::Begin))?;
    checkpoint(Step::Begin)?;

    // Scratch files are no longer needed
    drop(scratch);

    let conn = destination
        .adopt()
        .ok_or_else(|| SemError::migration(Step::Begin.to_string(), "destination closed"))?;

    info!(
        "Migration complete: {} documents, {} objects, {} sections",
        counts[0], counts[1], counts[2]
    );
    Ok(conn)
}

fn interchange(e: impl std::fmt::Display) -> SemError {
    SemError::interchange(e.to_string())
}

fn arrow_schema(table: &TableSpec) -> SchemaRef {
    let fields: Vec<Field> = table
        .columns
        .iter()
        .map(|(name, kind)| {
            let data_type = match kind {
                ColumnType::Text => DataType::Utf8,
                ColumnType::Integer => DataType::Int64,
                ColumnType::Blob => DataType::Binary,
            };
            Field::new(*name, data_type, true)
        })
        .collect();

    Arc::new(Schema::new(fields))
}

fn interchange_path(directory: &Path, table: &TableSpec) -> PathBuf {
    directory.join(format!("{}.parquet", table.name))
}

/// Per-column Arrow builders for one record batch.
enum ColumnBuilder {
    Text(StringBuilder),
    Integer(Int64Builder),
    Blob(BinaryBuilder),
}

impl ColumnBuilder {
    fn new(kind: ColumnType) -> Self {
        match kind {
            ColumnType::Text => Self::Text(StringBuilder::new()),
            ColumnType::Integer => Self::Integer(Int64Builder::new()),
            ColumnType::Blob => Self::Blob(BinaryBuilder::new()),
        }
    }

    /// Append a SQLite value. Values stored under a different storage
    /// class than the column declares are rejected, never converted.
    fn append(&mut self, column: &str, value: ValueRef<'_>) -> Result<()> {
        match (self, value) {
            (Self::Text(b), ValueRef::Null) => b.append_null(),
            (Self::Integer(b), ValueRef::Null) => b.append_null(),
            (Self::Blob(b), ValueRef::Null) => b.append_null(),
            (Self::Text(b), ValueRef::Text(t)) => {
                let text = std::str::from_utf8(t).map_err(|e| {
                    SemError::interchange(format!("{}: text is not valid UTF-8: {}", column, e))
                })?;
                b.append_value(text)
            }
            (Self::Integer(b), ValueRef::Integer(i)) => b.append_value(i),
            (Self::Blob(b), ValueRef::Blob(v)) => b.append_value(v),
            (builder, value) => {
                return Err(SemError::interchange(format!(
                    "{}: {:?} value in {} column",
                    column,
                    value.data_type(),
                    builder.name()
                )))
            }
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Text(_) => "TEXT",
            Self::Integer(_) => "INTEGER",
            Self::Blob(_) => "BLOB",
        }
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            Self::Text(b) => Arc::new(b.finish()),
            Self::Integer(b) => Arc::new(b.finish()),
            Self::Blob(b) => Arc::new(b.finish()),
        }
    }
}

fn flush(
    writer: &mut ArrowWriter<File>,
    schema: &SchemaRef,
    builders: &mut [ColumnBuilder],
) -> Result<()> {
    let columns: Vec<ArrayRef> = builders.iter_mut().map(ColumnBuilder::finish).collect();
    let batch = RecordBatch::try_new(schema.clone(), columns).map_err(interchange)?;
    writer.write(&batch).map_err(interchange)?;
    Ok(())
}

/// Write a table to its interchange file and return the row count.
fn export_table(
    source: &Connection,
    table: &TableSpec,
    directory: &Path,
    batch_size: usize,
) -> Result<u64> {
    let schema = arrow_schema(table);
    let file = File::create(interchange_path(directory, table))?;
    let properties = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer =
        ArrowWriter::try_new(file, schema.clone(), Some(properties)).map_err(interchange)?;

    let mut builders: Vec<ColumnBuilder> = table
        .columns
        .iter()
        .map(|(_, kind)| ColumnBuilder::new(*kind))
        .collect();

    let mut stmt = source.prepare(&format!(
        "SELECT {} FROM {} ORDER BY rowid",
        table.column_list(),
        table.name
    ))?;
    let mut rows = stmt.query([])?;

    let batch_size = batch_size.max(1);
    let (mut total, mut pending) = (0u64, 0usize);
    while let Some(row) = rows.next()? {
        for (i, builder) in builders.iter_mut().enumerate() {
            builder.append(table.columns[i].0, row.get_ref(i)?)?;
        }

        total += 1;
        pending += 1;
        if pending == batch_size {
            flush(&mut writer, &schema, &mut builders)?;
            pending = 0;
        }
    }

    if pending > 0 {
        flush(&mut writer, &schema, &mut builders)?;
    }
    writer.close().map_err(interchange)?;

    debug!("Exported {} rows from {}", total, table.name);
    Ok(total)
}

/// Read column `i` of `batch` at `row` as a SQLite value.
fn column_value(batch: &RecordBatch, i: usize, row: usize) -> Result<SqlValue> {
    let column = batch.column(i);
    if column.is_null(row) {
        return Ok(SqlValue::Null);
    }

    let any = column.as_any();
    if let Some(values) = any.downcast_ref::<StringArray>() {
        Ok(SqlValue::Text(values.value(row).to_string()))
    } else if let Some(values) = any.downcast_ref::<Int64Array>() {
        Ok(SqlValue::Integer(values.value(row)))
    } else if let Some(values) = any.downcast_ref::<BinaryArray>() {
        Ok(SqlValue::Blob(values.value(row).to_vec()))
    } else {
        Err(SemError::interchange(format!(
            "unsupported column type {:?}",
            column.data_type()
        )))
    }
}

/// Load every interchange file into the destination in one transaction and
/// verify row counts.
fn import_all(
    dest: &Connection,
    tables: &[TableSpec],
    counts: &[u64],
    directory: &Path,
) -> Result<()> {
    dest.execute_batch("BEGIN")?;

    for (table, expected) in tables.iter().zip(counts) {
        let imported = import_table(dest, table, directory)?;
        if imported != *expected {
            return Err(SemError::database(format!(
                "{}: imported {} rows, exported {}",
                table.name, imported, expected
            )));
        }
    }

    dest.execute_batch("COMMIT")?;
    Ok(())
}

fn import_table(dest: &Connection, table: &TableSpec, directory: &Path) -> Result<u64> {
    let file = File::open(interchange_path(directory, table))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(interchange)?
        .build()
        .map_err(interchange)?;

    let placeholders = vec!["?"; table.columns.len()].join(", ");
    let mut stmt = dest.prepare(&format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name,
        table.column_list(),
        placeholders
    ))?;

    let mut total = 0u64;
    for batch in reader {
        let batch = batch.map_err(interchange)?;
        for row in 0..batch.num_rows() {
            let values = (0..batch.num_columns())
                .map(|i| column_value(&batch, i, row))
                .collect::<Result<Vec<_>>>()?;
            stmt.execute(params_from_iter(values.iter()))?;
            total += 1;
        }
    }

    debug!("Imported {} rows into {}", total, table.name);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append(kind: ColumnType, value: ValueRef<'_>) -> Result<()> {
        ColumnBuilder::new(kind).append("c", value)
    }

    #[test]
    fn test_append_matching_classes() {
        assert!(append(ColumnType::Text, ValueRef::Text(b"x")).is_ok());
        assert!(append(ColumnType::Integer, ValueRef::Integer(1)).is_ok());
        assert!(append(ColumnType::Blob, ValueRef::Blob(&[0, 255])).is_ok());
        for kind in [ColumnType::Text, ColumnType::Integer, ColumnType::Blob] {
            assert!(append(kind, ValueRef::Null).is_ok());
        }
    }

    #[test]
    fn test_append_rejects_other_classes() {
        let rejected = [
            (ColumnType::Integer, ValueRef::Real(1.5)),
            (ColumnType::Integer, ValueRef::Text(b"pending")),
            (ColumnType::Text, ValueRef::Text(&[0xff, 0xfe])),
            (ColumnType::Text, ValueRef::Integer(7)),
            (ColumnType::Blob, ValueRef::Integer(42)),
            (ColumnType::Blob, ValueRef::Real(0.5)),
            (ColumnType::Blob, ValueRef::Text(b"x")),
        ];

        for (kind, value) in rejected {
            let err = append(kind, value).unwrap_err();
            assert_eq!(err.error_code(), "INTERCHANGE_ERROR", "{:?}", kind);
        }
    }

    #[test]
    fn test_rows_round_trip_through_interchange() {
        let dir = tempfile::tempdir().unwrap();
        let source = Connection::open_in_memory().unwrap();
        schema::create_all(&source, "sections").unwrap();
        source
            .execute_batch(
                "INSERT INTO objects VALUES ('a', X'00FF', NULL, 9223372036854775807);
                 INSERT INTO objects VALUES ('b', NULL, 'tag', NULL);",
            )
            .unwrap();

        let [_, objects, _] = TableSpec::migrated("sections");
        assert_eq!(export_table(&source, &objects, dir.path(), 1).unwrap(), 2);

        let dest = Connection::open_in_memory().unwrap();
        schema::create_tables(&dest, "sections").unwrap();
        assert_eq!(import_table(&dest, &objects, dir.path()).unwrap(), 2);

        let rows: Vec<(String, Option<Vec<u8>>, Option<String>, Option<i64>)> = dest
            .prepare("SELECT id, object, tags, entry FROM objects ORDER BY id")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(
            rows,
            vec![
                ("a".to_string(), Some(vec![0, 255]), None, Some(i64::MAX)),
                ("b".to_string(), None, Some("tag".to_string()), None),
            ]
        );
    }
}
