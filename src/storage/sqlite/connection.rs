//! Shared connection handling for the `SQLite` store.
//!
//! Mutex handling with poison recovery, pragma configuration and the
//! `BEGIN IMMEDIATE` transaction wrapper every write goes through.

use crate::{Error, Result};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

/// Helper to acquire mutex lock with poison recovery.
///
/// If a previous critical section panicked, the inner connection is
/// recovered and a warning is logged instead of failing every later call.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Configures a `SQLite` connection.
///
/// - **WAL mode**: concurrent readers with a single writer
/// - **NORMAL synchronous**: balances durability with performance
/// - **`busy_timeout`**: waits up to 5 seconds for locks
/// - **`foreign_keys`**: enforces document/tag links
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if foreign keys cannot be enabled.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns a row, so the result is ignored; in-memory
    // databases silently keep their own journal mode.
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(sql_error("enable_foreign_keys"))
}

/// Runs `body` inside `BEGIN IMMEDIATE` ... `COMMIT`.
///
/// Any error from `body` rolls the transaction back. A failed `COMMIT`
/// also rolls back, so the caller never observes a half-applied write.
///
/// # Errors
///
/// Returns the error from `body`, or [`Error::OperationFailed`] when the
/// transaction cannot be opened or committed.
pub fn in_transaction<T>(
    conn: &Connection,
    body: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    conn.execute("BEGIN IMMEDIATE", [])
        .map_err(sql_error("begin_transaction"))?;

    match body(conn) {
        Ok(value) => {
            if let Err(e) = conn.execute("COMMIT", []) {
                let _ = conn.execute("ROLLBACK", []);
                return Err(sql_error("commit_transaction")(e));
            }
            Ok(value)
        },
        Err(err) => {
            let _ = conn.execute("ROLLBACK", []);
            Err(err)
        },
    }
}

/// Maps a `rusqlite` error into [`Error::OperationFailed`] for `operation`.
pub fn sql_error(operation: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

/// Returns true if `err` is a UNIQUE constraint violation.
#[must_use]
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
