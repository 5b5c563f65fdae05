//! # Storage Configuration
//!
//! Where the database lives and where migrations come from.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SOURCEBOOK_DB_PATH=/var/lib/sourcebook/sourcebook.db               │
//! │     SOURCEBOOK_MIGRATIONS_DIR=/opt/sourcebook/migrations               │
//! │     SOURCEBOOK_BASE_SCHEMA=/opt/sourcebook/schema.sql                  │
//! │     SOURCEBOOK_BUSY_TIMEOUT_MS=10000                                   │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/sourcebook/storage.toml (Linux)                          │
//! │     ~/Library/Application Support/com.sourcebook.sourcebook/... (macOS)│
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     ./sourcebook.db, ./migrations, no base schema                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # storage.toml
//! [database]
//! path = "/var/lib/sourcebook/sourcebook.db"
//! busy_timeout_ms = 5000
//!
//! [migrations]
//! dir = "/opt/sourcebook/migrations"
//! base_schema = "/opt/sourcebook/schema.sql"
//! strict_naming = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::pool::DbConfig;

// =============================================================================
// Database Settings
// =============================================================================

/// Connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite database file. Created on first connect.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// SQLite lock-wait timeout (milliseconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    /// How long a caller waits for the shared connection (seconds).
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub foreign_keys: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("sourcebook.db")
}

fn default_busy_timeout() -> u64 {
    5000
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout(),
            acquire_timeout_secs: default_acquire_timeout(),
            foreign_keys: true,
        }
    }
}

// =============================================================================
// Migration Settings
// =============================================================================

/// Migration source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSettings {
    /// Directory holding `NNN_description.sql` files.
    #[serde(default = "default_migrations_dir")]
    pub dir: PathBuf,

    /// Schema applied once, before any migration, when the store is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_schema: Option<PathBuf>,

    /// Fail instead of warn when filenames break the naming convention.
    #[serde(default)]
    pub strict_naming: bool,
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

impl Default for MigrationSettings {
    fn default() -> Self {
        MigrationSettings {
            dir: default_migrations_dir(),
            base_schema: None,
            strict_naming: false,
        }
    }
}

// =============================================================================
// Storage Configuration
// =============================================================================

/// Complete storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub migrations: MigrationSettings,
}

impl StorageConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (explicit path, else the platform config dir)
    /// 3. Environment variables
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file is not.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_config_path() {
                Some(path) if path.exists() => Self::from_file(path)?,
                Some(path) => {
                    debug!(?path, "Config file not found, using defaults");
                    Self::default()
                }
                None => Self::default(),
            },
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn from_file(path: PathBuf) -> Result<Self, ConfigError> {
        info!(?path, "Loading storage config from file");
        let contents =
            std::fs::read_to_string(&path).map_err(|source| ConfigError::Io { path, source })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }

        if self.migrations.dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("migrations.dir must not be empty".into()));
        }

        if self.database.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "database.busy_timeout_ms must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Connection builder for these settings.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
            .acquire_timeout(Duration::from_secs(self.database.acquire_timeout_secs))
            .foreign_keys(self.database.foreign_keys)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("SOURCEBOOK_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(dir) = var("SOURCEBOOK_MIGRATIONS_DIR") {
            debug!(dir = %dir, "Overriding migrations dir from environment");
            self.migrations.dir = PathBuf::from(dir);
        }

        if let Some(schema) = var("SOURCEBOOK_BASE_SCHEMA") {
            self.migrations.base_schema = Some(PathBuf::from(schema));
        }

        if let Some(timeout) = var("SOURCEBOOK_BUSY_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(ms) => self.database.busy_timeout_ms = ms,
                Err(_) => warn!(value = %timeout, "Ignoring invalid SOURCEBOOK_BUSY_TIMEOUT_MS"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "sourcebook", "sourcebook")
            .map(|dirs| dirs.config_dir().join("storage.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = StorageConfig::default();
        assert_eq!(config.database.path, PathBuf::from("sourcebook.db"));
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert_eq!(config.migrations.dir, PathBuf::from("migrations"));
        assert!(config.migrations.base_schema.is_none());
        assert!(!config.migrations.strict_naming);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: StorageConfig = toml::from_str(
            r#"
            [migrations]
            dir = "db/migrations"
            strict_naming = true
            "#,
        )
        .unwrap();

        assert_eq!(config.migrations.dir, PathBuf::from("db/migrations"));
        assert!(config.migrations.strict_naming);
        assert_eq!(config.database.path, PathBuf::from("sourcebook.db"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SOURCEBOOK_DB_PATH", "/data/s.db"),
            ("SOURCEBOOK_BASE_SCHEMA", "/data/schema.sql"),
            ("SOURCEBOOK_BUSY_TIMEOUT_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = StorageConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/data/s.db"));
        assert_eq!(config.migrations.base_schema, Some(PathBuf::from("/data/schema.sql")));
        // Invalid value ignored
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert_eq!(config.migrations.dir, PathBuf::from("migrations"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = StorageConfig::default();
        config.database.busy_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = StorageConfig::default();
        config.migrations.dir = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("storage.toml");
        std::fs::write(&path, "[database]\nbusy_timeout_ms = 250\n").unwrap();

        let config = StorageConfig::load(Some(path)).unwrap();
        assert_eq!(config.db_config().busy_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = StorageConfig::load(Some(dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&StorageConfig::default()).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[migrations]"));
    }
}
