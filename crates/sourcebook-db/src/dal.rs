//! # Data Access Layer
//!
//! The only way business code and the migration manager talk to the store.
//!
//! ## Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Dal (one per component)                         │
//! │                                                                         │
//! │  query(sql, params)         ──► Vec<T>      (empty, never absent)      │
//! │  query_single(sql, params)  ──► Option<T>   (first row or None)        │
//! │  run(sql, params)           ──► RunResult   (rowid + rows affected)    │
//! │                                                                         │
//! │  execute_transaction(body)                                             │
//! │       │                                                                 │
//! │       ├── in_transaction already set? ──► TransactionError::Nested     │
//! │       │                                    (no I/O attempted)          │
//! │       ▼                                                                 │
//! │  acquire connection ──► BEGIN IMMEDIATE                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  body(&mut Transaction) ── tx.query / tx.query_single / tx.run         │
//! │       │                                                                 │
//! │       ├── Ok  ──► COMMIT ──┬── Ok  ──► return value                    │
//! │       │                    └── Err ──► ROLLBACK ──► CommitFailed        │
//! │       │                                                                 │
//! │       └── Err ──► ROLLBACK ──┬── Ok  ──► body error, unchanged          │
//! │                              └── Err ──► RollbackFailed (both errors)  │
//! │                                                                         │
//! │  in_transaction cleared on every path (drop guard)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Serialization
//! The [`Database`] handle owns a single connection. Every operation checks
//! it out for its own duration, so an open transaction blocks every other
//! caller until COMMIT or ROLLBACK. Inside a transaction body, use the
//! [`Transaction`] handle: calling back into the `Dal` would wait for the
//! connection the body itself is holding.
//!
//! The DAL never retries. Lock waits are bounded by the SQLite busy
//! timeout configured on the connection.

use futures_util::future::BoxFuture;
use sourcebook_core::{RunResult, SqlValue};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Arguments, FromRow, Sqlite, SqliteConnection, SqlitePool};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult, TransactionError};
use crate::pool::Database;

// =============================================================================
// Dal
// =============================================================================

/// Data access handle.
///
/// Cheap to clone. Clones share the `in_transaction` flag, so a clone
/// moved into a transaction body still sees the outer transaction.
///
/// ## Example
/// ```rust,ignore
/// let dal = db.dal();
///
/// let id = dal
///     .execute_transaction(|tx| {
///         Box::pin(async move {
///             let res = tx.run("INSERT INTO items (name) VALUES (?1)", &["widget".into()]).await?;
///             tx.run("INSERT INTO audit (item_id) VALUES (?1)", &[res.last_insert_id.into()]).await?;
///             Ok::<_, DbError>(res.last_insert_id)
///         })
///     })
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct Dal {
    pool: SqlitePool,
    in_transaction: Arc<AtomicBool>,
}

impl Dal {
    pub(crate) fn new(database: &Database) -> Self {
        Dal {
            pool: database.pool().clone(),
            in_transaction: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns true while a transaction opened through this DAL (or one of
    /// its clones) is running.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::Acquire)
    }

    /// Runs a read and decodes every row.
    pub async fn query<T>(&self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let mut conn = self.acquire().await?;
        fetch_all(&mut conn, sql, params).await
    }

    /// Runs a read and decodes the first row, if any.
    pub async fn query_single<T>(&self, sql: &str, params: &[SqlValue]) -> DbResult<Option<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let mut conn = self.acquire().await?;
        fetch_optional(&mut conn, sql, params).await
    }

    /// Runs a write.
    pub async fn run(&self, sql: &str, params: &[SqlValue]) -> DbResult<RunResult> {
        let mut conn = self.acquire().await?;
        execute(&mut conn, sql, params).await
    }

    /// Runs `body` inside `BEGIN IMMEDIATE` ... `COMMIT`.
    ///
    /// ## Errors
    /// - [`TransactionError::Nested`] - a transaction is already open on this DAL
    /// - [`TransactionError::BeginFailed`] - the connection or `BEGIN` failed
    /// - the body's own error, unchanged, after a successful rollback
    /// - [`TransactionError::CommitFailed`] - `COMMIT` failed, rolled back
    /// - [`TransactionError::RollbackFailed`] - rollback failed; carries the
    ///   original error and the rollback error
    pub async fn execute_transaction<F, T>(&self, body: F) -> DbResult<T>
    where
        F: for<'t> FnOnce(&'t mut Transaction) -> BoxFuture<'t, DbResult<T>>,
        T: Send,
    {
        let transaction_id = Uuid::new_v4();

        let _flag = TransactionFlag::enter(&self.in_transaction)
            .ok_or(TransactionError::Nested { transaction_id })?;

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|source| TransactionError::BeginFailed {
                transaction_id,
                source,
            })?;

        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(|source| TransactionError::BeginFailed {
                transaction_id,
                source,
            })?;

        debug!(transaction_id = %transaction_id, "Transaction started");

        let mut tx = Transaction {
            id: transaction_id,
            conn: Some(conn),
        };

        match body(&mut tx).await {
            Ok(value) => match tx.commit().await {
                Ok(()) => {
                    debug!(transaction_id = %transaction_id, "Transaction committed");
                    Ok(value)
                }
                Err(source) => {
                    warn!(transaction_id = %transaction_id, error = %source, "Commit failed");
                    let err = TransactionError::CommitFailed {
                        transaction_id,
                        source,
                    };
                    Err(tx.rollback_after(err.into()).await)
                }
            },
            Err(err) => Err(tx.rollback_after(err).await),
        }
    }

    async fn acquire(&self) -> DbResult<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| DbError::initialization("database connection unavailable", Some(e)))
    }
}

/// Sets the `in_transaction` flag for its lifetime.
struct TransactionFlag<'a>(&'a AtomicBool);

impl<'a> TransactionFlag<'a> {
    fn enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TransactionFlag(flag))
    }
}

impl Drop for TransactionFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// Handle passed to a transaction body.
///
/// Holds the connection between `BEGIN` and `COMMIT`/`ROLLBACK`. If the
/// transaction future is dropped before finishing, the handle rolls back
/// on its own before the connection is reused.
#[derive(Debug)]
pub struct Transaction {
    id: Uuid,
    conn: Option<PoolConnection<Sqlite>>,
}

impl Transaction {
    /// Id of this transaction attempt (also present on its errors and logs).
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn query<T>(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        fetch_all(self.conn()?, sql, params).await
    }

    pub async fn query_single<T>(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<Option<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        fetch_optional(self.conn()?, sql, params).await
    }

    pub async fn run(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<RunResult> {
        execute(self.conn()?, sql, params).await
    }

    fn conn(&mut self) -> DbResult<&mut SqliteConnection> {
        let transaction_id = self.id;
        self.conn
            .as_deref_mut()
            .ok_or_else(|| TransactionError::NotActive { transaction_id }.into())
    }

    async fn commit(&mut self) -> Result<(), sqlx::Error> {
        if let Some(conn) = self.conn.as_deref_mut() {
            sqlx::query("COMMIT").execute(conn).await?;
        }
        // Back to the pool
        self.conn = None;
        Ok(())
    }

    /// Rolls back and returns the error the caller should see.
    async fn rollback_after(mut self, original: DbError) -> DbError {
        let Some(mut conn) = self.conn.take() else {
            return original;
        };

        match sqlx::query("ROLLBACK").execute(&mut *conn).await {
            Ok(_) => {
                debug!(transaction_id = %self.id, error = %original, "Transaction rolled back");
                original
            }
            Err(rollback) => {
                error!(
                    transaction_id = %self.id,
                    error = %original,
                    rollback_error = %rollback,
                    "Rollback failed; closing connection"
                );
                // Closing the connection makes SQLite discard the open transaction
                drop(conn.detach());
                TransactionError::RollbackFailed {
                    transaction_id: self.id,
                    original: Box::new(original),
                    rollback,
                }
                .into()
            }
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        let transaction_id = self.id;
        warn!(transaction_id = %transaction_id, "Transaction dropped while open; rolling back");

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                        error!(transaction_id = %transaction_id, error = %e, "Rollback of dropped transaction failed");
                        drop(conn.detach());
                    }
                });
            }
            Err(_) => drop(conn.detach()),
        }
    }
}

// =============================================================================
// Statement Helpers
// =============================================================================

async fn fetch_all<T>(conn: &mut SqliteConnection, sql: &str, params: &[SqlValue]) -> DbResult<Vec<T>>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let args = bind_params(params).map_err(|e| DbError::query(sql, params, e))?;
    sqlx::query_as_with::<Sqlite, T, _>(sql, args)
        .fetch_all(conn)
        .await
        .map_err(|e| DbError::query(sql, params, e))
}

async fn fetch_optional<T>(
    conn: &mut SqliteConnection,
    sql: &str,
    params: &[SqlValue],
) -> DbResult<Option<T>>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let args = bind_params(params).map_err(|e| DbError::query(sql, params, e))?;
    sqlx::query_as_with::<Sqlite, T, _>(sql, args)
        .fetch_optional(conn)
        .await
        .map_err(|e| DbError::query(sql, params, e))
}

async fn execute(conn: &mut SqliteConnection, sql: &str, params: &[SqlValue]) -> DbResult<RunResult> {
    let args = bind_params(params).map_err(|e| DbError::run(sql, params, e))?;
    let result = sqlx::query_with(sql, args)
        .execute(conn)
        .await
        .map_err(|e| DbError::run(sql, params, e))?;

    Ok(RunResult {
        last_insert_id: result.last_insert_rowid(),
        rows_affected: result.rows_affected(),
    })
}

/// Binds positional parameters (`?1`, `?2`, ... or `?`).
fn bind_params<'q>(params: &[SqlValue]) -> Result<SqliteArguments<'q>, sqlx::Error> {
    let mut args = SqliteArguments::default();
    for value in params {
        let bound = match value {
            SqlValue::Null => args.add(Option::<i64>::None),
            SqlValue::Integer(v) => args.add(*v),
            SqlValue::Real(v) => args.add(*v),
            SqlValue::Text(v) => args.add(v.clone()),
            SqlValue::Blob(v) => args.add(v.clone()),
        };
        bound.map_err(sqlx::Error::Encode)?;
    }
    Ok(args)
}

// =============================================================================
// Unit Tests
// =============================================================================
