//! # Database Error Types
//!
//! Error types for the DAL, the migration manager and configuration.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Closed taxonomy + SQL/params context          │
//! │       │                  INITIALIZATION_ERROR | QUERY_ERROR            │
//! │       │                  RUN_ERROR | TRANSACTION_ERROR                 │
//! │       ▼                                                                 │
//! │  MigrateError ← Adds file I/O and schema integrity failures            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Bootstrap aborts startup / business code matches on variants          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Callers match on variants and [`ErrorCode`], never on message text. The
//! driver error is kept as the `source()` for diagnostics only.

use serde::Serialize;
use sourcebook_core::{CoreError, SqlValue};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// Error Codes
// =============================================================================

/// Coarse classification of a [`DbError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Connecting to or configuring the store failed.
    InitializationError,
    /// A read (`query` / `query_single`) failed.
    QueryError,
    /// A write (`run`) failed.
    RunError,
    /// Beginning, committing or rolling back a transaction failed, or a
    /// nested transaction was refused.
    TransactionError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InitializationError => "INITIALIZATION_ERROR",
            ErrorCode::QueryError => "QUERY_ERROR",
            ErrorCode::RunError => "RUN_ERROR",
            ErrorCode::TransactionError => "TRANSACTION_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The statement and parameters that produced an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorDetails {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl ErrorDetails {
    pub fn new(sql: &str, params: &[SqlValue]) -> Self {
        ErrorDetails {
            sql: sql.to_string(),
            params: params.to_vec(),
        }
    }
}

// =============================================================================
// DAL Errors
// =============================================================================

/// Data access layer errors.
///
/// ## Variants ↔ Codes
/// ```text
/// Initialization  → INITIALIZATION_ERROR
/// Query           → QUERY_ERROR
/// Run             → RUN_ERROR
/// Transaction     → TRANSACTION_ERROR
/// ```
#[derive(Debug, Error)]
pub enum DbError {
    /// Opening or configuring the connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created (permissions, missing directory)
    /// - Connection handle already closed
    #[error("Initialization failed: {message}")]
    Initialization {
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// A read failed.
    #[error("Query failed: {message}")]
    Query {
        message: String,
        details: ErrorDetails,
        #[source]
        source: sqlx::Error,
    },

    /// A write failed.
    ///
    /// ## When This Occurs
    /// - SQL syntax error in a migration statement
    /// - Constraint violation (UNIQUE, FOREIGN KEY, CHECK, NOT NULL)
    /// - Database locked past the busy timeout
    #[error("Run failed: {message}")]
    Run {
        message: String,
        details: ErrorDetails,
        #[source]
        source: sqlx::Error,
    },

    /// Transaction management failed.
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl DbError {
    /// Creates an Initialization error.
    pub fn initialization(message: impl Into<String>, source: Option<sqlx::Error>) -> Self {
        DbError::Initialization {
            message: message.into(),
            source,
        }
    }

    /// Creates a Query error for a failed read.
    pub fn query(sql: &str, params: &[SqlValue], source: sqlx::Error) -> Self {
        DbError::Query {
            message: driver_message(&source),
            details: ErrorDetails::new(sql, params),
            source,
        }
    }

    /// Creates a Run error for a failed write.
    pub fn run(sql: &str, params: &[SqlValue], source: sqlx::Error) -> Self {
        DbError::Run {
            message: driver_message(&source),
            details: ErrorDetails::new(sql, params),
            source,
        }
    }

    /// Returns the taxonomy code of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            DbError::Initialization { .. } => ErrorCode::InitializationError,
            DbError::Query { .. } => ErrorCode::QueryError,
            DbError::Run { .. } => ErrorCode::RunError,
            DbError::Transaction(_) => ErrorCode::TransactionError,
        }
    }

    /// Returns the statement and parameters, for Query and Run errors.
    pub fn details(&self) -> Option<&ErrorDetails> {
        match self {
            DbError::Query { details, .. } | DbError::Run { details, .. } => Some(details),
            _ => None,
        }
    }

    /// Returns true for UNIQUE, FOREIGN KEY, NOT NULL and CHECK violations.
    pub fn is_constraint_violation(&self) -> bool {
        self.database_error().is_some_and(|db_err| {
            !matches!(db_err.kind(), sqlx::error::ErrorKind::Other)
        })
    }

    /// Returns true when SQLite reported SQLITE_BUSY or SQLITE_LOCKED.
    ///
    /// The DAL never retries; callers decide what to do with this.
    pub fn is_busy(&self) -> bool {
        self.database_error()
            .and_then(|db_err| db_err.code())
            .and_then(|code| code.parse::<i32>().ok())
            // Extended result codes carry the primary code in the low byte
            .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
    }

    fn database_error(&self) -> Option<&(dyn sqlx::error::DatabaseError + 'static)> {
        match self {
            DbError::Query { source, .. } | DbError::Run { source, .. } => {
                source.as_database_error()
            }
            _ => None,
        }
    }
}

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Message reported by SQLite itself when available, else the sqlx error.
fn driver_message(err: &sqlx::Error) -> String {
    match err.as_database_error() {
        Some(db_err) => db_err.message().to_string(),
        None => err.to_string(),
    }
}

// =============================================================================
// Transaction Errors
// =============================================================================

/// Transaction lifecycle errors. Every variant carries the id of the
/// transaction attempt it belongs to.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// `execute_transaction` was entered while the same DAL instance
    /// already had a transaction open. No I/O was attempted.
    #[error("Nested transaction refused ({transaction_id}): a transaction is already open on this DAL")]
    Nested { transaction_id: Uuid },

    /// `BEGIN IMMEDIATE` (or acquiring the connection for it) failed.
    #[error("Transaction {transaction_id} could not begin: {source}")]
    BeginFailed {
        transaction_id: Uuid,
        #[source]
        source: sqlx::Error,
    },

    /// `COMMIT` failed; the transaction was rolled back.
    #[error("Transaction {transaction_id} could not commit: {source}")]
    CommitFailed {
        transaction_id: Uuid,
        #[source]
        source: sqlx::Error,
    },

    /// The transaction failed AND the rollback failed too. Both causes are
    /// kept.
    #[error("Transaction {transaction_id} failed ({original}) and rollback also failed: {rollback}")]
    RollbackFailed {
        transaction_id: Uuid,
        #[source]
        original: Box<DbError>,
        rollback: sqlx::Error,
    },

    /// The transaction handle was used after it was finished.
    #[error("Transaction {transaction_id} is no longer active")]
    NotActive { transaction_id: Uuid },
}

impl TransactionError {
    pub fn transaction_id(&self) -> Uuid {
        match self {
            TransactionError::Nested { transaction_id }
            | TransactionError::BeginFailed { transaction_id, .. }
            | TransactionError::CommitFailed { transaction_id, .. }
            | TransactionError::RollbackFailed { transaction_id, .. }
            | TransactionError::NotActive { transaction_id } => *transaction_id,
        }
    }

    /// The error that caused the rollback, when the rollback itself failed.
    pub fn original_error(&self) -> Option<&DbError> {
        match self {
            TransactionError::RollbackFailed { original, .. } => Some(original),
            _ => None,
        }
    }

    /// The rollback failure, when there was one.
    pub fn rollback_error(&self) -> Option<&sqlx::Error> {
        match self {
            TransactionError::RollbackFailed { rollback, .. } => Some(rollback),
            _ => None,
        }
    }
}

/// Result type for DAL operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Migration Errors
// =============================================================================

/// Migration manager errors.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// A DAL operation failed (bad SQL, constraint violation, ...).
    #[error(transparent)]
    Database(#[from] DbError),

    /// A migration file or directory could not be read.
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Migration filename is not valid UTF-8.
    #[error("Migration filename is not valid UTF-8: {}", .path.display())]
    NonUtf8Filename { path: PathBuf },

    /// The migration already has a successful ledger row.
    #[error("Migration {0} is already applied")]
    AlreadyApplied(String),

    /// Filename convention violated while strict naming is enabled.
    #[error(transparent)]
    InvalidName(#[from] CoreError),

    /// An applied migration file changed on disk.
    #[error("Schema integrity violation: {filename} changed after it was applied (ledger checksum {expected}, file checksum {actual})")]
    IntegrityViolation {
        filename: String,
        expected: String,
        actual: String,
    },

    /// An applied migration file no longer exists.
    #[error("Schema integrity violation: applied migration {0} is missing from the migrations directory")]
    MissingMigrationFile(String),
}

impl MigrateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MigrateError::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for failures that mean the applied-schema history can
    /// no longer be trusted. Startup must not continue past these.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            MigrateError::IntegrityViolation { .. } | MigrateError::MissingMigrationFile(_)
        )
    }

    /// Returns the underlying DAL error, if any.
    pub fn as_db_error(&self) -> Option<&DbError> {
        match self {
            MigrateError::Database(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type for migration operations.
pub type MigrateResult<T> = Result<T, MigrateError>;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Storage configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to load config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`crate::config::StorageConfig`].
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config values failed validation.
    #[error("Invalid storage configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = DbError::run("INSERT INTO t VALUES (?1)", &[1.into()], sqlx::Error::RowNotFound);
        assert_eq!(err.code(), ErrorCode::RunError);
        assert_eq!(err.code().as_str(), "RUN_ERROR");

        let details = err.details().unwrap();
        assert_eq!(details.sql, "INSERT INTO t VALUES (?1)");
        assert_eq!(details.params, vec![SqlValue::Integer(1)]);

        let err = DbError::query("SELECT 1", &[], sqlx::Error::RowNotFound);
        assert_eq!(err.code(), ErrorCode::QueryError);

        let err = DbError::initialization("closed", None);
        assert_eq!(err.code(), ErrorCode::InitializationError);
        assert!(err.details().is_none());

        let err = DbError::from(TransactionError::Nested {
            transaction_id: Uuid::new_v4(),
        });
        assert_eq!(err.code(), ErrorCode::TransactionError);
    }

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::TransactionError).unwrap();
        assert_eq!(json, r#""TRANSACTION_ERROR""#);
    }

    #[test]
    fn test_rollback_failure_keeps_both_errors() {
        let transaction_id = Uuid::new_v4();
        let original = DbError::run("INSERT INTO missing VALUES (1)", &[], sqlx::Error::RowNotFound);
        let err = TransactionError::RollbackFailed {
            transaction_id,
            original: Box::new(original),
            rollback: sqlx::Error::PoolClosed,
        };

        assert_eq!(err.transaction_id(), transaction_id);
        assert_eq!(err.original_error().map(DbError::code), Some(ErrorCode::RunError));
        assert!(matches!(err.rollback_error(), Some(sqlx::Error::PoolClosed)));

        let message = err.to_string();
        assert!(message.contains("rollback also failed"));
        assert!(message.contains(&sqlx::Error::PoolClosed.to_string()));
    }

    #[test]
    fn test_non_database_errors_are_not_constraint_or_busy() {
        let err = DbError::run("SELECT 1", &[], sqlx::Error::PoolTimedOut);
        assert!(!err.is_constraint_violation());
        assert!(!err.is_busy());
    }

    #[test]
    fn test_integrity_violation_classification() {
        let err = MigrateError::IntegrityViolation {
            filename: "001_init.sql".into(),
            expected: "a".into(),
            actual: "b".into(),
        };
        assert!(err.is_integrity_violation());
        assert!(err.to_string().contains("001_init.sql"));

        assert!(MigrateError::MissingMigrationFile("002_seed.sql".into()).is_integrity_violation());
        assert!(!MigrateError::AlreadyApplied("001_init.sql".into()).is_integrity_violation());
    }
}
