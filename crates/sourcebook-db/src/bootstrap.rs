//! # Startup Bootstrap
//!
//! The sequence every process runs before touching business data.
//!
//! ```text
//! StorageConfig
//!      │
//!      ▼
//! Database::connect ── WAL, busy timeout, foreign keys
//!      │
//!      ├── store empty + base_schema configured? ──► apply base schema
//!      ▼                                              (one transaction)
//! MigrationManager::initialize
//!      ▼
//! apply_pending_migrations
//!      ▼
//! verify_schema ── any error here aborts startup
//! ```

use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::config::{MigrationSettings, StorageConfig};
use crate::error::{DbError, MigrateError, MigrateResult};
use crate::migrations::{executable_statements, MigrationManager};
use crate::pool::Database;

/// What startup changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    /// The base schema was applied to an empty store.
    pub base_schema_applied: bool,
    /// Migrations applied by this startup, in order.
    pub applied: Vec<String>,
}

/// Connects and brings the schema up to date.
///
/// Returns the ready handle; the caller owns it and closes it on shutdown.
pub async fn open(config: &StorageConfig) -> MigrateResult<(Database, BootstrapReport)> {
    let db = Database::connect(config.db_config()).await?;

    match prepare(&db, &config.migrations).await {
        Ok(report) => Ok((db, report)),
        Err(err) => {
            db.close().await;
            Err(err)
        }
    }
}

/// Runs the startup sequence and closes the connection.
pub async fn run(config: &StorageConfig) -> MigrateResult<BootstrapReport> {
    let (db, report) = open(config).await?;
    db.close().await;
    Ok(report)
}

/// Startup sequence against an already-open handle.
pub async fn prepare(db: &Database, settings: &MigrationSettings) -> MigrateResult<BootstrapReport> {
    let mut report = BootstrapReport::default();

    if let Some(schema) = &settings.base_schema {
        if db.is_empty().await? {
            apply_base_schema(db, schema).await?;
            report.base_schema_applied = true;
        }
    }

    let manager =
        MigrationManager::new(db.dal(), &settings.dir).with_strict_naming(settings.strict_naming);

    manager.initialize().await?;
    report.applied = manager.apply_pending_migrations().await?;
    manager.verify_schema().await?;

    info!(
        base_schema_applied = report.base_schema_applied,
        applied = report.applied.len(),
        "Storage ready"
    );
    Ok(report)
}

async fn apply_base_schema(db: &Database, path: &Path) -> MigrateResult<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| MigrateError::io(path, e))?;
    let statements = executable_statements(&content);

    info!(
        path = %path.display(),
        statements = statements.len(),
        "Applying base schema to empty store"
    );

    db.dal()
        .execute_transaction(move |tx| {
            Box::pin(async move {
                for block in &statements {
                    tx.run(&block.sql, &[]).await?;
                }
                Ok::<_, DbError>(())
            })
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> MigrationSettings {
        let migrations = dir.path().join("migrations");
        std::fs::create_dir(&migrations).unwrap();
        MigrationSettings {
            dir: migrations,
            base_schema: None,
            strict_naming: false,
        }
    }

    #[tokio::test]
    async fn test_base_schema_only_on_empty_store() {
        let dir = TempDir::new().unwrap();
        let schema = dir.path().join("schema.sql");
        std::fs::write(&schema, "CREATE TABLE items (id INTEGER PRIMARY KEY);\n").unwrap();

        let mut settings = settings(&dir);
        settings.base_schema = Some(schema);

        let db = Database::connect(DbConfig::in_memory()).await.unwrap();

        let first = prepare(&db, &settings).await.unwrap();
        assert!(first.base_schema_applied);
        assert!(first.applied.is_empty());

        let second = prepare(&db, &settings).await.unwrap();
        assert!(!second.base_schema_applied);
    }

    #[tokio::test]
    async fn test_prepare_applies_migrations() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        std::fs::write(settings.dir.join("001_init.sql"), "CREATE TABLE t (id INTEGER);").unwrap();

        let db = Database::connect(DbConfig::in_memory()).await.unwrap();
        let report = prepare(&db, &settings).await.unwrap();

        assert_eq!(report.applied, vec!["001_init.sql"]);
        assert!(!report.base_schema_applied);
    }

    #[tokio::test]
    async fn test_run_against_file_database() {
        let dir = TempDir::new().unwrap();
        let mut config = StorageConfig::default();
        config.database.path = dir.path().join("sourcebook.db");
        config.migrations = settings(&dir);
        std::fs::write(config.migrations.dir.join("001_init.sql"), "CREATE TABLE t (id INTEGER);")
            .unwrap();

        let report = run(&config).await.unwrap();
        assert_eq!(report.applied, vec!["001_init.sql"]);

        // Second startup: nothing to do, verification passes
        let report = run(&config).await.unwrap();
        assert!(report.applied.is_empty());
    }
}
