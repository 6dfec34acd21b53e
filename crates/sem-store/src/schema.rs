//! Database schema definitions.

use sem_core::{Result, SemError};

/// Documents table.
pub const CREATE_DOCUMENTS: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    data TEXT,
    tags TEXT,
    entry INTEGER
)
"#;

/// Objects table.
pub const CREATE_OBJECTS: &str = r#"
CREATE TABLE IF NOT EXISTS objects (
    id TEXT PRIMARY KEY,
    object BLOB,
    tags TEXT,
    entry INTEGER
)
"#;

/// Sections table for a schema generation.
pub fn create_sections(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    indexid INTEGER PRIMARY KEY,
    id TEXT,
    text TEXT,
    tags TEXT,
    entry INTEGER
)
"#
    )
}

/// Lookup index over section ids.
pub fn create_sections_index(table: &str) -> String {
    format!("CREATE INDEX IF NOT EXISTS {table}_id ON {table}(id)")
}

/// Column storage class, used by the migration interchange files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Blob,
}

/// Columns of a migrated table, in schema order.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: String,
    pub columns: &'static [(&'static str, ColumnType)],
}

const DOCUMENT_COLUMNS: &[(&str, ColumnType)] = &[
    ("id", ColumnType::Text),
    ("data", ColumnType::Text),
    ("tags", ColumnType::Text),
    ("entry", ColumnType::Integer),
];

const OBJECT_COLUMNS: &[(&str, ColumnType)] = &[
    ("id", ColumnType::Text),
    ("object", ColumnType::Blob),
    ("tags", ColumnType::Text),
    ("entry", ColumnType::Integer),
];

const SECTION_COLUMNS: &[(&str, ColumnType)] = &[
    ("indexid", ColumnType::Integer),
    ("id", ColumnType::Text),
    ("text", ColumnType::Text),
    ("tags", ColumnType::Text),
    ("entry", ColumnType::Integer),
];

impl TableSpec {
    /// The fixed set of tables carried across a migration.
    pub fn migrated(sections: &str) -> [TableSpec; 3] {
        [
            TableSpec {
                name: "documents".to_string(),
                columns: DOCUMENT_COLUMNS,
            },
            TableSpec {
                name: "objects".to_string(),
                columns: OBJECT_COLUMNS,
            },
            TableSpec {
                name: sections.to_string(),
                columns: SECTION_COLUMNS,
            },
        ]
    }

    /// Comma separated column list.
    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Create the tables for a generation, without indexes.
pub fn create_tables(conn: &rusqlite::Connection, sections: &str) -> Result<()> {
    conn.execute_batch(CREATE_DOCUMENTS)?;
    conn.execute_batch(CREATE_OBJECTS)?;
    conn.execute_batch(&create_sections(sections))?;
    Ok(())
}

/// Create every table and index for a generation.
pub fn create_all(conn: &rusqlite::Connection, sections: &str) -> Result<()> {
    create_tables(conn, sections)?;
    conn.execute_batch(&create_sections_index(sections))?;
    Ok(())
}

/// Reject table names that are not plain SQL identifiers.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(SemError::invalid_argument(format!(
            "invalid table name: {:?}",
            name
        )))
    }
}
