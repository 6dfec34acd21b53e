//! Configuration types for sem.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SemError};

/// Main configuration, also the persisted session state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Array backend selection.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Index state shared across stream instances.
    #[serde(default)]
    pub index: IndexState,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the database file. `None` keeps the store in memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Name of the sections table for the current schema generation.
    #[serde(default = "default_sections_table")]
    pub sections_table: String,

    /// Rows fetched per page when streaming query results.
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,

    /// Enable WAL mode (recommended).
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// SQLite cache size in KB (negative = KB, positive = pages).
    #[serde(default = "default_cache_size")]
    pub cache_size: i32,

    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            sections_table: default_sections_table(),
            fetch_size: default_fetch_size(),
            wal_mode: true,
            cache_size: default_cache_size(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

impl DatabaseConfig {
    /// Database configuration for a file at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

/// Which array backend variant to construct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Host memory only.
    #[default]
    Baseline,
    /// Opportunistic device placement with parallel kernels.
    Accelerated,
}

/// Array backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend variant.
    #[serde(default)]
    pub kind: BackendKind,
}

/// Persisted id sequencing state.
///
/// `autoid` is read and written only by upsert streams. It never decreases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexState {
    /// First id handed out when no counter has been persisted yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,

    /// Next id to assign, persisted after an upsert stream completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoid: Option<u64>,
}

impl IndexState {
    /// Counter seed for an upsert stream: `autoid`, else `offset`, else 0.
    pub fn seed(&self) -> u64 {
        self.autoid.or(self.offset).unwrap_or(0)
    }

    /// Store the next counter value. Lower values are ignored.
    pub fn advance(&mut self, next: u64) {
        self.autoid = Some(self.autoid.map_or(next, |current| current.max(next)));
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_sections_table() -> String {
    "sections".to_string()
}

fn default_fetch_size() -> usize {
    256
}

fn default_cache_size() -> i32 {
    -64000
}

fn default_busy_timeout() -> u32 {
    30000
}

impl SemConfig {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| SemError::Config {
            message: format!("Failed to parse config: {}", e),
        })?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("sem").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        let local_config = PathBuf::from("sem.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Write configuration, including the autoid counter, to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| SemError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SemConfig::default();
        assert!(config.database.path.is_none());
        assert_eq!(config.database.sections_table, "sections");
        assert_eq!(config.database.fetch_size, 256);
        assert_eq!(config.backend.kind, BackendKind::Baseline);
        assert_eq!(config.index.seed(), 0);
    }

    #[test]
    fn test_partial_toml() {
        let config: SemConfig = toml::from_str(
            r#"
            [database]
            fetch_size = 64

            [backend]
            kind = "accelerated"

            [index]
            offset = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.database.fetch_size, 64);
        assert!(config.database.wal_mode);
        assert_eq!(config.backend.kind, BackendKind::Accelerated);
        assert_eq!(config.index.seed(), 100);
    }

    #[test]
    fn test_seed_prefers_autoid() {
        let state = IndexState {
            offset: Some(10),
            autoid: Some(42),
        };
        assert_eq!(state.seed(), 42);
    }

    #[test]
    fn test_advance_never_decreases() {
        let mut state = IndexState::default();
        state.advance(5);
        state.advance(3);
        assert_eq!(state.autoid, Some(5));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sem.toml");

        let mut config = SemConfig::default();
        config.database.path = Some(PathBuf::from("/tmp/sem.db"));
        config.index.advance(7);
        config.save(&path).unwrap();

        let loaded = SemConfig::load(&path).unwrap();
        assert_eq!(loaded.database.path, config.database.path);
        assert_eq!(loaded.index.autoid, Some(7));
    }
}
