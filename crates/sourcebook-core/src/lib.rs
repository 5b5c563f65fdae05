//! # sourcebook-core: Pure Logic for the Sourcebook Storage Core
//!
//! This crate holds the parts of the migration engine that are plain
//! functions over text: splitting a migration file into executable
//! statements, computing its tamper-detection checksum, and checking
//! filename conventions. It also defines the record types shared with
//! `sourcebook-db`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Sourcebook Storage Flow                             │
//! │                                                                         │
//! │  Bootstrap ──► Database (one connection) ──► Dal                       │
//! │                                              │                          │
//! │                                              ▼                          │
//! │                                     MigrationManager                    │
//! │                                              │                          │
//! │  ┌───────────────────────────────────────────▼─────────────────────┐   │
//! │  │             ★ sourcebook-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌────────────┐  ┌────────────┐  ┌──────────┐  ┌───────────┐  │   │
//! │  │   │  splitter  │  │  checksum  │  │  naming  │  │   types   │  │   │
//! │  │   │ statements │  │  SHA-256   │  │ NNN_x.sql│  │  records  │  │   │
//! │  │   └────────────┘  └────────────┘  └──────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • PURE FUNCTIONS                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`splitter`] - Split raw migration SQL into statement blocks
//! - [`checksum`] - Normalize migration text and hash it
//! - [`naming`] - Migration filename convention checks
//! - [`types`] - Ledger records, statement blocks, bind values
//! - [`error`] - Core error types
//!
//! ## Example Usage
//!
//! ```rust
//! use sourcebook_core::{migration_checksum, split_sql_statements};
//!
//! let sql = "CREATE TABLE t (id INTEGER);\n\n-- seed\nINSERT INTO t VALUES (1);\n";
//! let blocks = split_sql_statements(sql);
//! assert_eq!(blocks.len(), 2);
//!
//! // Blank lines and full-line comments do not affect the checksum
//! let reformatted = "CREATE TABLE t (id INTEGER);\nINSERT INTO t VALUES (1);";
//! assert_eq!(migration_checksum(sql), migration_checksum(reformatted));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod checksum;
pub mod error;
pub mod naming;
pub mod splitter;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use checksum::{migration_checksum, normalize_migration_sql};
pub use error::{CoreError, CoreResult};
pub use splitter::split_sql_statements;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// File extension recognised as a migration.
pub const MIGRATION_EXTENSION: &str = "sql";

/// SQL line-comment marker. Lines starting with it (after trimming) are
/// ignored by checksum normalization.
pub const LINE_COMMENT: &str = "--";
