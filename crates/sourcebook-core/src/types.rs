//! # Storage Types
//!
//! Types shared between the pure splitter/checksum code and the database
//! layer.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Storage Types                                   │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ MigrationRecord │   │ StatementBlock  │   │    SqlValue     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  filename (PK)  │   │  kind           │   │  Null           │       │
//! │  │  checksum       │   │  sql            │   │  Integer / Real │       │
//! │  │  applied_at     │   └─────────────────┘   │  Text / Blob    │       │
//! │  │  success        │                         └─────────────────┘       │
//! │  │  error_message  │   ┌─────────────────┐   ┌─────────────────┐       │
//! │  └─────────────────┘   │  StatementKind  │   │    RunResult    │       │
//! │                        │  Simple         │   │  last_insert_id │       │
//! │                        │  View / Trigger │   │  rows_affected  │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// =============================================================================
// Migration Record
// =============================================================================

/// One row of the migration ledger.
///
/// ## Lifecycle
/// ```text
/// INSERT (success = false) ──► statements run ──► UPDATE success = true
///        └──────────────── same transaction ────────────────┘
/// ```
/// A successful record's `checksum` must always match the checksum of the
/// file currently on disk. `verify_schema` enforces this at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MigrationRecord {
    /// Migration filename. Unique, and the lexical sort key for apply order.
    pub filename: String,
    /// SHA-256 of the normalized file content.
    pub checksum: String,
    /// Set by the database when the row is written.
    pub applied_at: NaiveDateTime,
    /// True only once every statement in the file has executed.
    pub success: bool,
    /// Populated when the migration failed.
    pub error_message: Option<String>,
}

// =============================================================================
// Statement Blocks
// =============================================================================

/// The shape of a statement block produced by the splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// Ordinary statement terminated by `;` at paren depth zero.
    Simple,
    /// `CREATE VIEW`, terminated by the first line ending in `;`.
    View,
    /// `CREATE TRIGGER`, terminated only by a line that is exactly `END;`.
    Trigger,
}

impl StatementKind {
    /// Returns true for trigger and view blocks.
    pub fn is_compound(&self) -> bool {
        !matches!(self, StatementKind::Simple)
    }
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatementKind::Simple => write!(f, "simple"),
            StatementKind::View => write!(f, "view"),
            StatementKind::Trigger => write!(f, "trigger"),
        }
    }
}

/// A single executable SQL unit extracted from a migration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementBlock {
    pub kind: StatementKind,
    /// Statement text, trimmed, including its terminating `;`.
    pub sql: String,
}

impl StatementBlock {
    /// Creates a new statement block.
    pub fn new(kind: StatementKind, sql: impl Into<String>) -> Self {
        StatementBlock {
            kind,
            sql: sql.into(),
        }
    }
}

// =============================================================================
// Bind Values
// =============================================================================

/// A dynamically-typed SQL bind parameter.
///
/// Mirrors SQLite's storage classes. Kept serializable so failing
/// statements can be reported together with their parameters.
///
/// ## Example
/// ```rust
/// use sourcebook_core::SqlValue;
///
/// let params: Vec<SqlValue> = vec!["widget".into(), 3.into(), None::<i64>.into()];
/// assert_eq!(params[2], SqlValue::Null);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Returns true for `SqlValue::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

// SQLite has no boolean storage class
impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        SqlValue::Text(value.clone())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Blob(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

// =============================================================================
// Write Result
// =============================================================================

/// Outcome of a write executed through the DAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunResult {
    /// Rowid of the most recent successful INSERT on the connection.
    pub last_insert_id: i64,
    pub rows_affected: u64,
}

// =============================================================================
// Migration Status
// =============================================================================

/// Snapshot of the migration ledger against the migrations directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatus {
    /// Successfully applied, in filename order.
    pub applied: Vec<String>,
    /// Recorded in the ledger with `success = false`.
    pub failed: Vec<String>,
    /// On disk and not yet successfully applied, in apply order.
    pub pending: Vec<String>,
}

impl MigrationStatus {
    /// Returns true when nothing is pending and nothing has failed.
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty() && self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_value_conversions() {
        assert_eq!(SqlValue::from(7_i64), SqlValue::Integer(7));
        assert_eq!(SqlValue::from(true), SqlValue::Integer(1));
        assert_eq!(SqlValue::from("x"), SqlValue::Text("x".into()));
        assert_eq!(SqlValue::from(Some(2.5)), SqlValue::Real(2.5));
        assert!(SqlValue::from(None::<String>).is_null());
    }

    #[test]
    fn test_sql_value_serializes_untagged() {
        let params = vec![SqlValue::Integer(1), SqlValue::Text("a".into()), SqlValue::Null];
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, r#"[1,"a",null]"#);
    }

    #[test]
    fn test_statement_kind() {
        assert!(!StatementKind::Simple.is_compound());
        assert!(StatementKind::View.is_compound());
        assert!(StatementKind::Trigger.is_compound());
        assert_eq!(StatementKind::Trigger.to_string(), "trigger");
    }

    #[test]
    fn test_migration_status_up_to_date() {
        let mut status = MigrationStatus::default();
        assert!(status.is_up_to_date());

        status.pending.push("002_seed.sql".into());
        assert!(!status.is_up_to_date());
    }
}
