//! # sourcebook-db: Storage Layer for Sourcebook
//!
//! This crate owns the SQLite connection. Every read, write and schema
//! change in the application goes through it.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sourcebook Data Flow                              │
//! │                                                                         │
//! │  Process startup ──► bootstrap::open(&StorageConfig)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  sourcebook-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │      Dal      │    │  Migration   │  │   │
//! │  │   │   (pool.rs)   │    │   (dal.rs)    │    │   Manager    │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ 1 connection  │◄───│ query / run   │◄───│ ledger       │  │   │
//! │  │   │ WAL, busy     │    │ transactions  │    │ apply/verify │  │   │
//! │  │   │ timeout, FKs  │    │ error codes   │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   sourcebook.db  +  schema_migrations ledger                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection handle creation and configuration
//! - [`dal`] - Data access layer and transactions
//! - [`migrations`] - Migration ledger, apply and verify
//! - [`bootstrap`] - Startup sequence
//! - [`config`] - Storage configuration (TOML + environment)
//! - [`error`] - Error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sourcebook_db::{bootstrap, StorageConfig};
//!
//! let config = StorageConfig::load(None)?;
//! let (db, report) = bootstrap::open(&config).await?;
//!
//! let dal = db.dal();
//! let rows: Vec<(i64, String)> = dal.query("SELECT id, name FROM items", &[]).await?;
//!
//! db.close().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod bootstrap;
pub mod config;
pub mod dal;
pub mod error;
pub mod migrations;
pub mod pool;

// =============================================================================
// Re-exports
// =============================================================================

pub use bootstrap::BootstrapReport;
pub use config::StorageConfig;
pub use dal::{Dal, Transaction};
pub use error::{
    ConfigError, DbError, DbResult, ErrorCode, MigrateError, MigrateResult, TransactionError,
};
pub use migrations::MigrationManager;
pub use pool::{Database, DbConfig};
