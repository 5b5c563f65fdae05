//! # Database Handle
//!
//! Creation, configuration and shutdown of the single SQLite connection.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Handle                         │
//! │                                                                         │
//! │  Process Startup (composition root)                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbConfig::new(path) ← Configure connection settings                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::connect(config).await ← Open + configure ONE connection     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │      SqlitePool (max_connections = 1)   │                           │
//! │  │               ┌─────┐                   │                           │
//! │  │               │Conn │                   │                           │
//! │  │               └─────┘                   │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       │ Every DAL call checks the connection out for its duration      │
//! │       ▼                                                                 │
//! │  dal.query(...)            ──► waits, runs, returns connection         │
//! │  dal.execute_transaction() ──► holds it BEGIN..COMMIT/ROLLBACK         │
//! │  (callers on the same handle are serialized)                           │
//! │                                                                         │
//! │  Shutdown: database.close().await                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Connection Settings
//! - WAL journaling (file databases)
//! - `busy_timeout`: how long SQLite waits on a locked database before
//!   reporting SQLITE_BUSY. This is the only lock-wait policy; the DAL
//!   itself never retries.
//! - Foreign keys enforced

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::dal::Dal;
use crate::error::{DbError, DbResult};

const IN_MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Connection configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/sourcebook.db")
///     .busy_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// How long SQLite waits for a lock before failing with SQLITE_BUSY.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// How long a caller waits for the connection while another caller
    /// (e.g. an open transaction) holds it.
    /// Default: 30 seconds
    pub acquire_timeout: Duration,

    /// Whether to enforce foreign key constraints.
    /// Default: true
    pub foreign_keys: bool,
}

impl DbConfig {
    /// Creates a new configuration for the given database file.
    ///
    /// ## Arguments
    /// * `path` - Path to the SQLite database file. Will be created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(30),
            foreign_keys: true,
        }
    }

    /// Sets the SQLite busy (lock-wait) timeout.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets the connection acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Sets whether foreign keys are enforced.
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// The database lives exactly as long as the handle's connection.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY_PATH),
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(5),
            foreign_keys: true,
        }
    }

    /// Returns true for the in-memory configuration.
    pub fn is_in_memory(&self) -> bool {
        self.database_path == Path::new(IN_MEMORY_PATH)
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let options = if self.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::initialization("invalid in-memory options", Some(e)))?
        } else {
            SqliteConnectOptions::new()
                .filename(&self.database_path)
                .create_if_missing(true)
                // WAL mode: readers don't block the writer
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
        };

        Ok(options
            .busy_timeout(self.busy_timeout)
            .foreign_keys(self.foreign_keys))
    }
}

// =============================================================================
// Database
// =============================================================================

/// Owner of the process's single database connection.
///
/// Created once by the composition root and passed by reference to
/// everything that needs storage. Business code never touches the
/// connection directly: it goes through [`Dal`].
///
/// ## Lifecycle
/// ```text
/// Database::connect ──► dal() / MigrationManager::new ──► close()
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
}

impl Database {
    /// Opens and configures the database connection.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Applies WAL journaling, busy timeout and foreign keys
    /// 3. Opens exactly one connection and keeps it for the handle's lifetime
    ///
    /// ## Returns
    /// * `Ok(Database)` - Ready-to-use handle
    /// * `Err(DbError::Initialization)` - The connection could not be opened
    pub async fn connect(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let connect_options = config.connect_options()?;
        debug!("Connection options configured");

        // One physical connection, never reaped: an in-memory database
        // would vanish with it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::initialization("failed to open database", Some(e)))?;

        info!(
            busy_timeout_ms = config.busy_timeout.as_millis() as u64,
            "Database connection ready"
        );

        Ok(Database {
            pool,
            path: config.database_path,
        })
    }

    /// Returns a new DAL bound to this connection.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let rows: Vec<(i64,)> = db.dal().query("SELECT id FROM items", &[]).await?;
    /// ```
    pub fn dal(&self) -> Dal {
        Dal::new(self)
    }

    /// Path of the database file (`:memory:` for in-memory handles).
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the connection.
    ///
    /// ## When To Call
    /// On shutdown, after in-flight transactions have finished. Waits for
    /// the connection to be returned before closing it.
    ///
    /// ## Note
    /// After calling close, every DAL operation fails.
    pub async fn close(&self) {
        info!("Closing database connection");
        self.pool.close().await;
    }

    /// Returns true once [`Database::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        self.dal()
            .query_single::<(i64,)>("SELECT 1", &[])
            .await
            .is_ok()
    }

    /// Returns true when the store has no user tables yet.
    pub async fn is_empty(&self) -> DbResult<bool> {
        let (tables,): (i64,) = self
            .dal()
            .query_single(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                &[],
            )
            .await?
            .unwrap_or((0,));
        Ok(tables == 0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::connect(DbConfig::in_memory()).await.unwrap();

        assert!(db.health_check().await);
        assert!(db.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_in_memory_state_survives_between_calls() {
        let db = Database::connect(DbConfig::in_memory()).await.unwrap();
        let dal = db.dal();

        dal.run("CREATE TABLE t (id INTEGER)", &[]).await.unwrap();
        assert!(!db.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let db = Database::connect(DbConfig::in_memory()).await.unwrap();
        let (enabled,): (i64,) = db
            .dal()
            .query_single("PRAGMA foreign_keys", &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn test_close() {
        let db = Database::connect(DbConfig::in_memory()).await.unwrap();
        db.close().await;

        assert!(db.is_closed());
        assert!(!db.health_check().await);
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/test.db")
            .busy_timeout(Duration::from_secs(10))
            .foreign_keys(false);

        assert_eq!(config.busy_timeout, Duration::from_secs(10));
        assert!(!config.foreign_keys);
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }
}
