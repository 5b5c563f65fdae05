//! # Error Types
//!
//! Error types for sourcebook-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  sourcebook-core errors (this file)                                    │
//! │  └── CoreError        - Pure-logic failures (naming conventions)       │
//! │                                                                         │
//! │  sourcebook-db errors (separate crate)                                 │
//! │  ├── DbError          - DAL taxonomy (query/run/transaction/init)      │
//! │  └── MigrateError     - Migration manager failures                     │
//! │                                                                         │
//! │  Flow: CoreError → MigrateError → caller (bootstrap aborts startup)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Core logic errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Migration filename does not have the `.sql` extension.
    #[error("Not a migration file: {0}")]
    NotAMigration(String),

    /// Migration filename does not follow the `NNN_description.sql` convention.
    ///
    /// ## When This Occurs
    /// - Missing numeric prefix (`init.sql`)
    /// - Missing underscore separator (`001init.sql`)
    /// - Empty description (`001_.sql`)
    #[error("Migration filename '{filename}' does not follow NNN_description.sql: {reason}")]
    InvalidMigrationName { filename: String, reason: String },

    /// Two migrations share the same numeric prefix.
    #[error("Migrations '{first}' and '{second}' share number {number}")]
    DuplicateMigrationNumber {
        number: u64,
        first: String,
        second: String,
    },

    /// Lexical order (the apply order) disagrees with numeric order.
    ///
    /// ## When This Occurs
    /// - Mixed prefix widths: `9_x.sql` sorts after `10_y.sql`
    #[error("Migration '{later}' sorts after '{earlier}' but has a smaller number")]
    OutOfOrder { earlier: String, later: String },
}

impl CoreError {
    /// Creates an InvalidMigrationName error.
    pub fn invalid_name(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidMigrationName {
            filename: filename.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
