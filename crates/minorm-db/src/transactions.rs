//! Transaction support for the ORM.
//!
//! [`atomic()`] runs a closure inside a transaction: the transaction is
//! committed when the closure returns `Ok` and rolled back when it returns
//! `Err` or panics. Inside the block, [`Transaction::commit`] and
//! [`Transaction::rollback`] end the current transaction early and open a
//! fresh one, so work can be checkpointed without leaving the block.
//!
//! Atomic blocks do not nest; entering one while a transaction is already
//! open on the executor fails with [`OrmError::TransactionError`].
//!
//! # Examples
//!
//! ```ignore
//! use minorm_db::transactions::atomic;
//!
//! atomic(db, |txn| {
//!     Person::objects().create(txn.executor(), Person::new("foo", 1))?;
//!     txn.rollback()?;
//!     Person::objects().create(txn.executor(), Person::new("bar", 2))?;
//!     Ok(())
//! })?;
//! ```

use minorm_core::{OrmError, OrmResult};

use crate::executor::DbExecutor;

/// Handle to the transaction opened by [`atomic()`].
pub struct Transaction<'a> {
    db: &'a dyn DbExecutor,
}

impl<'a> Transaction<'a> {
    /// Returns the executor the transaction runs on.
    pub fn executor(&self) -> &'a dyn DbExecutor {
        self.db
    }

    /// Commits the work done so far and opens a new transaction.
    pub fn commit(&self) -> OrmResult<()> {
        self.db.commit()?;
        self.db.begin()
    }

    /// Discards the work done so far and opens a new transaction.
    pub fn rollback(&self) -> OrmResult<()> {
        self.db.rollback()?;
        self.db.begin()
    }
}

/// Rolls back a transaction left open by an unwinding closure.
struct OpenGuard<'a> {
    db: &'a dyn DbExecutor,
    armed: bool,
}

impl Drop for OpenGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.db.in_transaction() {
            if let Err(e) = self.db.rollback() {
                tracing::error!("Rollback after panic in atomic block failed: {e}");
            }
        }
    }
}

/// Executes a closure within a transaction.
///
/// Commits when the closure returns `Ok` and rolls back when it returns
/// `Err` or when the commit fails. If the rollback itself fails, the
/// original error is returned and the rollback error is logged.
pub fn atomic<'a, F, T>(db: &'a dyn DbExecutor, f: F) -> OrmResult<T>
where
    F: FnOnce(&Transaction<'a>) -> OrmResult<T>,
{
    if db.in_transaction() {
        return Err(OrmError::TransactionError(
            "atomic blocks cannot be nested".to_string(),
        ));
    }

    db.begin()?;
    let mut guard = OpenGuard { db, armed: true };
    let txn = Transaction { db };
    let outcome = f(&txn);
    guard.armed = false;

    match outcome {
        Ok(value) => match db.commit() {
            Ok(()) => Ok(value),
            Err(e) => Err(abandon(db, e)),
        },
        Err(e) => Err(abandon(db, e)),
    }
}

fn abandon(db: &dyn DbExecutor, cause: OrmError) -> OrmError {
    tracing::debug!("Rolling back atomic block: {cause}");
    if db.in_transaction() {
        if let Err(rollback_err) = db.rollback() {
            tracing::error!("Rollback failed: {rollback_err}");
        }
    }
    cause
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::RecordingExecutor;
    use crate::query::compiler::DatabaseBackendType;

    fn db() -> RecordingExecutor {
        RecordingExecutor::new(DatabaseBackendType::SQLite)
    }

    #[test]
    fn test_atomic_commits_on_ok() {
        let db = db();
        let value = atomic(&db, |txn| {
            txn.executor().execute_sql("INSERT INTO t DEFAULT VALUES;", &[])?;
            Ok(42)
        })
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(db.sql(), vec!["BEGIN", "INSERT INTO t DEFAULT VALUES;", "COMMIT"]);
        assert!(!db.in_transaction());
    }

    #[test]
    fn test_atomic_rolls_back_on_err() {
        let db = db();
        let result: OrmResult<()> = atomic(&db, |_| {
            Err(OrmError::IntegrityError("duplicate".to_string()))
        });
        assert!(matches!(result, Err(OrmError::IntegrityError(_))));
        assert_eq!(db.sql(), vec!["BEGIN", "ROLLBACK"]);
        assert!(!db.in_transaction());
    }

    #[test]
    fn test_checkpoints_inside_block() {
        let db = db();
        atomic(&db, |txn| {
            txn.commit()?;
            txn.rollback()
        })
        .unwrap();
        assert_eq!(
            db.sql(),
            vec!["BEGIN", "COMMIT", "BEGIN", "ROLLBACK", "BEGIN", "COMMIT"]
        );
    }

    #[test]
    fn test_nested_atomic_rejected() {
        let db = db();
        let result = atomic(&db, |txn| atomic(txn.executor(), |_| Ok(())));
        assert!(matches!(result, Err(OrmError::TransactionError(_))));
        assert_eq!(db.sql(), vec!["BEGIN", "ROLLBACK"]);
    }

    #[test]
    fn test_failed_commit_rolls_back() {
        let mut db = db();
        db.fail_commit = true;
        let result = atomic(&db, |_| Ok(1));
        assert!(matches!(result, Err(OrmError::OperationalError(_))));
        assert_eq!(db.sql(), vec!["BEGIN", "COMMIT", "ROLLBACK"]);
        assert!(!db.in_transaction());
    }

    #[test]
    fn test_panic_rolls_back() {
        let db = db();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: OrmResult<()> = atomic(&db, |_| panic!("boom"));
        }));
        assert!(result.is_err());
        assert!(!db.in_transaction());
        assert_eq!(db.sql().last().map(String::as_str), Some("ROLLBACK"));
    }
}
