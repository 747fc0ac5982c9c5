//! Durable SQLite-backed stores.
//!
//! Every store follows the same concurrency model: a `Mutex<Connection>` with
//! WAL mode and a busy timeout. Each operation is a single short transaction;
//! no lock is held across calls.

pub mod abilities;
pub mod graph;
pub mod patterns;
pub mod tasks;

pub use abilities::AbilityStore;
pub use graph::ContextGraphStore;
pub use patterns::PatternStore;
pub use tasks::TaskGraphStore;

use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

/// Helper to acquire a store mutex with poison recovery.
pub(crate) fn acquire_lock(mutex: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("store mutex was poisoned, recovering");
            metrics::counter!("store_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Applies the shared connection pragmas (WAL, busy timeout, foreign keys).
pub(crate) fn apply_pragmas(conn: &Connection) {
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
    let _ = conn.pragma_update(None, "foreign_keys", "ON");
}

/// Maps a rusqlite error into an `OperationFailed` for the named operation.
pub(crate) fn op_failed(operation: &str, e: &rusqlite::Error) -> crate::Error {
    crate::Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}
