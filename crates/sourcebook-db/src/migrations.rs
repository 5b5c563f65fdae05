//! # Migration Manager
//!
//! Applies versioned SQL files from a directory exactly once, in order,
//! and detects edits to files that were already applied.
//!
//! ## How Migrations Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Migration Process                                  │
//! │                                                                         │
//! │  initialize()                                                          │
//! │       │  foreign_keys OFF ─► CREATE TABLE IF NOT EXISTS                │
//! │       │  schema_migrations ─► foreign_keys restored                    │
//! │       ▼                                                                 │
//! │  get_pending_migrations()                                              │
//! │       │                                                                 │
//! │       ├── 001_init.sql   ✓ (success = 1 in ledger)                    │
//! │       ├── 002_seed.sql   ✓ (success = 1 in ledger)                    │
//! │       └── 003_orders.sql ⬜ (pending)                                   │
//! │       ▼                                                                 │
//! │  apply_migration("003_orders.sql")  ── ONE transaction ──┐             │
//! │       │  0. success row already? ─► AlreadyApplied        │             │
//! │       │  1. ledger row, success = 0                       │             │
//! │       │  2. each statement block, in file order           │             │
//! │       │  3. ledger row, success = 1                       │             │
//! │       │                                                  ─┘             │
//! │       ├── failure? rollback, then record error_message                 │
//! │       │   in a separate transaction (file stays pending)               │
//! │       ▼                                                                 │
//! │  verify_schema()                                                       │
//! │       └── checksum(file on disk) == ledger checksum, for every         │
//! │           successful row. Mismatch is fatal.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Adding New Migrations
//!
//! 1. Create a new file in the migrations directory
//! 2. Name format: `NNN_description.sql` (e.g., `004_add_supplier_table.sql`)
//! 3. **NEVER** modify an applied migration - always add a new one.
//!    Blank lines and full-line `--` comments may change; anything else
//!    fails verification at the next startup.

use sourcebook_core::naming::{check_migration_sequence, is_migration_file};
use sourcebook_core::{
    migration_checksum, normalize_migration_sql, split_sql_statements, MigrationRecord,
    MigrationStatus, SqlValue, StatementBlock,
};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::dal::Dal;
use crate::error::{DbError, MigrateError, MigrateResult};

/// Ledger table DDL, executed by [`MigrationManager::initialize`].
const LEDGER_SQL: &str = include_str!("../sql/ledger.sql");

const SELECT_LEDGER: &str = r#"
    SELECT filename, checksum, applied_at, success, error_message
    FROM schema_migrations
    ORDER BY filename ASC
"#;

const SELECT_SUCCESSFUL: &str = r#"
    SELECT filename, checksum, applied_at, success, error_message
    FROM schema_migrations
    WHERE success = 1
    ORDER BY filename ASC
"#;

const SELECT_SUCCESS_ROW: &str =
    "SELECT filename FROM schema_migrations WHERE filename = ?1 AND success = 1";

// Affects no row when the migration already succeeded
const INSERT_ATTEMPT: &str = r#"
    INSERT INTO schema_migrations (filename, checksum, applied_at, success, error_message)
    VALUES (?1, ?2, CURRENT_TIMESTAMP, 0, NULL)
    ON CONFLICT(filename) DO UPDATE SET
        checksum = excluded.checksum,
        applied_at = excluded.applied_at,
        success = 0,
        error_message = NULL
    WHERE schema_migrations.success = 0
"#;

const MARK_SUCCESS: &str = "UPDATE schema_migrations SET success = 1 WHERE filename = ?1";

// Never overwrites a successful row
const RECORD_FAILURE: &str = r#"
    INSERT INTO schema_migrations (filename, checksum, applied_at, success, error_message)
    VALUES (?1, ?2, CURRENT_TIMESTAMP, 0, ?3)
    ON CONFLICT(filename) DO UPDATE SET
        checksum = excluded.checksum,
        applied_at = excluded.applied_at,
        success = 0,
        error_message = excluded.error_message
    WHERE schema_migrations.success = 0
"#;

// =============================================================================
// Migration Manager
// =============================================================================

/// Applies and verifies the migrations in one directory.
///
/// ## Example
/// ```rust,ignore
/// let manager = MigrationManager::new(db.dal(), "migrations");
/// manager.initialize().await?;
/// let applied = manager.apply_pending_migrations().await?;
/// manager.verify_schema().await?;
/// ```
#[derive(Debug, Clone)]
pub struct MigrationManager {
    dal: Dal,
    migrations_dir: PathBuf,
    strict_naming: bool,
}

impl MigrationManager {
    pub fn new(dal: Dal, migrations_dir: impl Into<PathBuf>) -> Self {
        MigrationManager {
            dal,
            migrations_dir: migrations_dir.into(),
            strict_naming: false,
        }
    }

    /// Rejects filenames that break the `NNN_description.sql` convention
    /// instead of warning about them.
    pub fn with_strict_naming(mut self, strict: bool) -> Self {
        self.strict_naming = strict;
        self
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Creates the ledger table if it does not exist.
    ///
    /// Foreign key enforcement is switched off around the DDL and restored
    /// to its previous setting afterwards, whether or not the DDL succeeded.
    /// The pragma is a no-op inside a transaction, so it brackets `BEGIN`.
    pub async fn initialize(&self) -> MigrateResult<()> {
        let (previous,): (i64,) = self
            .dal
            .query_single("PRAGMA foreign_keys", &[])
            .await?
            .unwrap_or((0,));

        self.dal.run("PRAGMA foreign_keys = OFF", &[]).await?;

        let statements = executable_statements(LEDGER_SQL);
        let created = self
            .dal
            .execute_transaction(move |tx| {
                Box::pin(async move {
                    for block in &statements {
                        tx.run(&block.sql, &[]).await?;
                    }
                    Ok::<_, DbError>(())
                })
            })
            .await;

        let restore = if previous != 0 {
            "PRAGMA foreign_keys = ON"
        } else {
            "PRAGMA foreign_keys = OFF"
        };
        let restored = self.dal.run(restore, &[]).await;

        created?;
        restored?;

        debug!("Migration ledger ready");
        Ok(())
    }

    /// Every ledger row, successful or not, ordered by filename.
    pub async fn get_applied_migrations(&self) -> MigrateResult<Vec<MigrationRecord>> {
        Ok(self.dal.query(SELECT_LEDGER, &[]).await?)
    }

    /// `.sql` files without a successful ledger row, in apply order.
    ///
    /// Files whose last attempt failed are still pending.
    pub async fn get_pending_migrations(&self) -> MigrateResult<Vec<String>> {
        let files = self.migration_files().await?;
        self.check_naming(&files)?;

        let applied = self.successful_filenames().await?;
        let mut pending: Vec<String> = files
            .into_iter()
            .filter(|filename| !applied.contains(filename))
            .collect();
        pending.sort();

        Ok(pending)
    }

    /// Applies one migration file atomically.
    ///
    /// The ledger is checked after `BEGIN IMMEDIATE` holds the write lock,
    /// so two handles on the same file never both apply a migration.
    ///
    /// ## Errors
    /// - [`MigrateError::AlreadyApplied`] - the file has a successful row
    /// - [`MigrateError::Io`] - the file could not be read
    /// - [`MigrateError::Database`] - a statement failed; nothing from this
    ///   file was kept, and the failure was recorded in the ledger
    pub async fn apply_migration(&self, filename: &str) -> MigrateResult<()> {
        let path = self.migrations_dir.join(filename);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| MigrateError::io(&path, e))?;

        let checksum = migration_checksum(&content);
        let statements = executable_statements(&content);

        info!(
            filename = %filename,
            statements = statements.len(),
            "Applying migration"
        );

        let name = filename.to_string();
        let attempt_checksum = checksum.clone();
        let outcome = self
            .dal
            .execute_transaction(move |tx| {
                Box::pin(async move {
                    let succeeded: Option<(String,)> = tx
                        .query_single(SELECT_SUCCESS_ROW, &[name.as_str().into()])
                        .await?;
                    if succeeded.is_some() {
                        return Ok(false);
                    }

                    let attempt = tx
                        .run(
                            INSERT_ATTEMPT,
                            &[name.as_str().into(), attempt_checksum.into()],
                        )
                        .await?;
                    if attempt.rows_affected == 0 {
                        return Ok(false);
                    }

                    for (index, block) in statements.iter().enumerate() {
                        debug!(
                            filename = %name,
                            statement = index + 1,
                            kind = %block.kind,
                            "Executing statement"
                        );
                        tx.run(&block.sql, &[]).await?;
                    }

                    tx.run(MARK_SUCCESS, &[name.as_str().into()]).await?;
                    Ok::<_, DbError>(true)
                })
            })
            .await;

        match outcome {
            Ok(true) => {
                info!(filename = %filename, "Migration applied");
                Ok(())
            }
            Ok(false) => {
                warn!(filename = %filename, "Migration already applied; skipped");
                Err(MigrateError::AlreadyApplied(filename.to_string()))
            }
            Err(err) => {
                error!(filename = %filename, error = %err, "Migration failed; rolled back");
                self.record_failure(filename, &checksum, &err).await;
                Err(err.into())
            }
        }
    }

    /// Applies every pending migration in order.
    ///
    /// Stops at the first failure, so the successful set is always a
    /// prefix of the sorted file list.
    ///
    /// ## Returns
    /// The filenames applied by this call (empty when nothing was pending).
    pub async fn apply_pending_migrations(&self) -> MigrateResult<Vec<String>> {
        let pending = self.get_pending_migrations().await?;

        if pending.is_empty() {
            info!("No pending migrations");
            return Ok(Vec::new());
        }

        info!(count = pending.len(), "Applying pending migrations");

        let mut applied = Vec::with_capacity(pending.len());
        for filename in pending {
            match self.apply_migration(&filename).await {
                Ok(()) => applied.push(filename),
                // Another handle on the same file got there first
                Err(MigrateError::AlreadyApplied(_)) => {}
                Err(err) => return Err(err),
            }
        }

        info!(count = applied.len(), "All pending migrations applied");
        Ok(applied)
    }

    /// Re-checks every successfully applied migration against its file.
    ///
    /// ## Errors
    /// - [`MigrateError::IntegrityViolation`] - file content changed
    /// - [`MigrateError::MissingMigrationFile`] - file was removed
    pub async fn verify_schema(&self) -> MigrateResult<()> {
        let applied: Vec<MigrationRecord> = self.dal.query(SELECT_SUCCESSFUL, &[]).await?;

        for record in &applied {
            let path = self.migrations_dir.join(&record.filename);
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    error!(filename = %record.filename, "Applied migration file is missing");
                    return Err(MigrateError::MissingMigrationFile(record.filename.clone()));
                }
                Err(e) => return Err(MigrateError::io(path, e)),
            };

            let actual = migration_checksum(&content);
            if actual != record.checksum {
                error!(
                    filename = %record.filename,
                    expected = %record.checksum,
                    actual = %actual,
                    "Schema integrity violation"
                );
                return Err(MigrateError::IntegrityViolation {
                    filename: record.filename.clone(),
                    expected: record.checksum.clone(),
                    actual,
                });
            }
        }

        info!(verified = applied.len(), "Schema verified");
        Ok(())
    }

    /// Snapshot of applied, failed and pending migrations.
    pub async fn status(&self) -> MigrateResult<MigrationStatus> {
        let records = self.get_applied_migrations().await?;
        let pending = self.get_pending_migrations().await?;

        let (applied, failed): (Vec<MigrationRecord>, Vec<MigrationRecord>) =
            records.into_iter().partition(|record| record.success);

        Ok(MigrationStatus {
            applied: applied.into_iter().map(|r| r.filename).collect(),
            failed: failed.into_iter().map(|r| r.filename).collect(),
            pending,
        })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn successful_filenames(&self) -> MigrateResult<HashSet<String>> {
        let rows: Vec<(String,)> = self
            .dal
            .query("SELECT filename FROM schema_migrations WHERE success = 1", &[])
            .await?;
        Ok(rows.into_iter().map(|(filename,)| filename).collect())
    }

    async fn migration_files(&self) -> MigrateResult<Vec<String>> {
        let dir = &self.migrations_dir;
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| MigrateError::io(dir, e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MigrateError::io(dir, e))?
        {
            let path = entry.path();
            let is_file = tokio::fs::metadata(&path)
                .await
                .map(|meta| meta.is_file())
                .map_err(|e| MigrateError::io(&path, e))?;
            if !is_file {
                continue;
            }

            let filename = entry
                .file_name()
                .into_string()
                .map_err(|_| MigrateError::NonUtf8Filename { path: path.clone() })?;

            if is_migration_file(&filename) {
                files.push(filename);
            }
        }

        debug!(dir = %dir.display(), count = files.len(), "Found migration files");
        Ok(files)
    }

    fn check_naming(&self, files: &[String]) -> MigrateResult<()> {
        match check_migration_sequence(files) {
            Ok(()) => Ok(()),
            Err(err) if self.strict_naming => Err(err.into()),
            Err(err) => {
                warn!(error = %err, "Migration filenames may not apply in the intended order");
                Ok(())
            }
        }
    }

    /// Keeps a diagnostic ledger row for a failed attempt. Best effort:
    /// a failure here is logged and never replaces the migration error.
    async fn record_failure(&self, filename: &str, checksum: &str, err: &DbError) {
        let params: Vec<SqlValue> = vec![filename.into(), checksum.into(), err.to_string().into()];

        let recorded = self
            .dal
            .execute_transaction(move |tx| {
                Box::pin(async move {
                    tx.run(RECORD_FAILURE, &params).await?;
                    Ok::<_, DbError>(())
                })
            })
            .await;

        if let Err(record_err) = recorded {
            warn!(
                filename = %filename,
                error = %record_err,
                "Could not record migration failure in ledger"
            );
        }
    }
}

/// Statement blocks worth sending to SQLite: comment-only blocks (e.g. a
/// trailing note at the end of a file) are dropped.
pub(crate) fn executable_statements(content: &str) -> Vec<StatementBlock> {
    if normalize_migration_sql(content).is_empty() {
        return Vec::new();
    }
    split_sql_statements(content)
        .into_iter()
        .filter(|block| !normalize_migration_sql(&block.sql).is_empty())
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use tempfile::TempDir;

    async fn setup() -> (Database, TempDir, MigrationManager) {
        let db = Database::connect(DbConfig::in_memory()).await.unwrap();
        let dir = TempDir::new().unwrap();
        let manager = MigrationManager::new(db.dal(), dir.path());
        manager.initialize().await.unwrap();
        (db, dir, manager)
    }

    fn write(dir: &TempDir, name: &str, sql: &str) {
        std::fs::write(dir.path().join(name), sql).unwrap();
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent_and_restores_foreign_keys() {
        let (db, _dir, manager) = setup().await;
        manager.initialize().await.unwrap();

        let (fk,): (i64,) = db
            .dal()
            .query_single("PRAGMA foreign_keys", &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fk, 1);
        assert!(manager.get_applied_migrations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_ignores_non_sql_and_sorts() {
        let (_db, dir, manager) = setup().await;
        write(&dir, "002_seed.sql", "INSERT INTO t VALUES (1);");
        write(&dir, "001_init.sql", "CREATE TABLE t (id INTEGER);");
        write(&dir, "README.md", "# notes");
        std::fs::create_dir(dir.path().join("003_dir.sql")).unwrap();

        let pending = manager.get_pending_migrations().await.unwrap();
        assert_eq!(pending, vec!["001_init.sql", "002_seed.sql"]);
    }

    #[tokio::test]
    async fn test_empty_migration_is_recorded() {
        let (_db, dir, manager) = setup().await;
        write(&dir, "001_noop.sql", "-- nothing yet\n\n");

        manager.apply_migration("001_noop.sql").await.unwrap();

        let records = manager.get_applied_migrations().await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].success);
        assert!(records[0].error_message.is_none());
        assert_eq!(records[0].checksum, migration_checksum(""));
    }

    #[test]
    fn test_executable_statements_drop_comment_blocks() {
        let blocks = executable_statements("CREATE TABLE t (id INTEGER);\n\n-- trailing note\n");
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].sql.starts_with("CREATE TABLE t"));

        assert!(executable_statements("-- only\n\n").is_empty());
    }

    #[tokio::test]
    async fn test_trailing_comment_migration_applies() {
        let (_db, dir, manager) = setup().await;
        write(&dir, "001_init.sql", "CREATE TABLE t (id INTEGER);\n-- done\n");

        manager.apply_migration("001_init.sql").await.unwrap();
        assert!(manager.get_pending_migrations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_twice_is_refused() {
        let (_db, dir, manager) = setup().await;
        write(&dir, "001_init.sql", "CREATE TABLE t (id INTEGER);");

        manager.apply_migration("001_init.sql").await.unwrap();
        let err = manager.apply_migration("001_init.sql").await.unwrap_err();
        assert!(matches!(err, MigrateError::AlreadyApplied(name) if name == "001_init.sql"));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let (_db, _dir, manager) = setup().await;
        let err = manager.apply_migration("404_missing.sql").await.unwrap_err();
        assert!(matches!(err, MigrateError::Io { .. }));
    }

    #[tokio::test]
    async fn test_strict_naming_rejects_bad_names() {
        let (db, dir, _manager) = setup().await;
        write(&dir, "init.sql", "CREATE TABLE t (id INTEGER);");

        let lenient = MigrationManager::new(db.dal(), dir.path());
        assert_eq!(lenient.get_pending_migrations().await.unwrap(), vec!["init.sql"]);

        let strict = MigrationManager::new(db.dal(), dir.path()).with_strict_naming(true);
        let err = strict.apply_pending_migrations().await.unwrap_err();
        assert!(matches!(err, MigrateError::InvalidName(_)));
        assert!(strict.get_applied_migrations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status() {
        let (_db, dir, manager) = setup().await;
        write(&dir, "001_init.sql", "CREATE TABLE t (id INTEGER);");
        write(&dir, "002_bad.sql", "INSERT INTO nowhere VALUES (1);");
        write(&dir, "003_later.sql", "INSERT INTO t VALUES (1);");

        assert!(manager.apply_pending_migrations().await.is_err());

        let status = manager.status().await.unwrap();
        assert_eq!(status.applied, vec!["001_init.sql"]);
        assert_eq!(status.failed, vec!["002_bad.sql"]);
        assert_eq!(status.pending, vec!["002_bad.sql", "003_later.sql"]);
        assert!(!status.is_up_to_date());
    }
}
