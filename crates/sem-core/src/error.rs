//! Error types for the sem workspace.

use thiserror::Error;

/// Result type alias using SemError.
pub type Result<T> = std::result::Result<T, SemError>;

/// Errors that can occur across the store, stream and array backends.
#[derive(Error, Debug)]
pub enum SemError {
    /// A backend variant was selected whose package is not compiled in.
    #[error("Dependency missing: {package} is not available - enable the matching feature")]
    DependencyMissing { package: String },

    /// A step of the copy/migration operation failed.
    #[error("Migration failed during {step}: {message}")]
    MigrationFailure { step: String, message: String },

    /// Error raised by the embedded SQL engine, passed through as is.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Array shapes are incompatible with the requested operation.
    #[error("Shape error: {message}")]
    Shape { message: String },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Store state error.
    #[error("Database error: {message}")]
    Database { message: String },

    /// Columnar interchange (Parquet/Arrow) error.
    #[error("Interchange error: {message}")]
    Interchange { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl SemError {
    /// Create a dependency missing error.
    pub fn dependency_missing(package: impl Into<String>) -> Self {
        Self::DependencyMissing {
            package: package.into(),
        }
    }

    /// Create a migration failure for the named step.
    pub fn migration(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MigrationFailure {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Create a shape error.
    pub fn shape(message: impl Into<String>) -> Self {
        Self::Shape {
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create an interchange error.
    pub fn interchange(message: impl Into<String>) -> Self {
        Self::Interchange {
            message: message.into(),
        }
    }

    /// Get a stable error code for diagnostics.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DependencyMissing { .. } => "DEPENDENCY_MISSING",
            Self::MigrationFailure { .. } => "MIGRATION_FAILURE",
            Self::Sqlite(_) => "SQLITE_ERROR",
            Self::Shape { .. } => "SHAPE_ERROR",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Interchange { .. } => "INTERCHANGE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SemError::migration("import", "disk full");
        let message = err.to_string();
        assert!(message.contains("import"));
        assert!(message.contains("disk full"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            SemError::dependency_missing("rayon").error_code(),
            "DEPENDENCY_MISSING"
        );
        assert_eq!(SemError::shape("bad").error_code(), "SHAPE_ERROR");
        assert_eq!(
            SemError::from(rusqlite::Error::QueryReturnedNoRows).error_code(),
            "SQLITE_ERROR"
        );
    }

    #[test]
    fn test_sqlite_error_is_transparent() {
        let err = SemError::from(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(
            err.to_string(),
            rusqlite::Error::QueryReturnedNoRows.to_string()
        );
    }
}
