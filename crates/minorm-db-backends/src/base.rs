//! Shared backend plumbing: engine selection and transaction bookkeeping.
//!
//! [`connect`] turns a [`DatabaseSettings`] entry into a boxed
//! [`DbExecutor`] for the configured engine. Engines that were not compiled
//! in (see the `sqlite` and `postgres` features) fail with
//! [`OrmError::ImproperlyConfigured`].

use std::sync::atomic::{AtomicBool, Ordering};

use minorm_core::settings::Settings;
use minorm_core::{DatabaseSettings, OrmError, OrmResult};
use minorm_db::DbExecutor;

/// Tracks whether a backend connection has an open transaction.
///
/// Backends check the state before sending `BEGIN`, `COMMIT`, or `ROLLBACK`
/// so that misuse is reported as [`OrmError::TransactionError`] instead of a
/// driver error.
#[derive(Debug, Default)]
pub struct TransactionState {
    open: AtomicBool,
}

impl TransactionState {
    /// Returns `true` while a transaction is open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Fails if a transaction is already open.
    pub fn ensure_closed(&self) -> OrmResult<()> {
        if self.is_open() {
            return Err(OrmError::TransactionError(
                "a transaction is already open on this connection".to_string(),
            ));
        }
        Ok(())
    }

    /// Fails unless a transaction is open.
    pub fn ensure_open(&self, action: &str) -> OrmResult<()> {
        if !self.is_open() {
            return Err(OrmError::TransactionError(format!(
                "cannot {action}: no transaction is open"
            )));
        }
        Ok(())
    }

    /// Records the outcome of a `BEGIN` (`true`) or `COMMIT`/`ROLLBACK` (`false`).
    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }
}

/// Opens a connection for a database settings entry.
///
/// Recognized engines are `sqlite`/`sqlite3` and `postgresql`/`postgres`.
pub fn connect(settings: &DatabaseSettings) -> OrmResult<Box<dyn DbExecutor>> {
    tracing::debug!(engine = %settings.engine, "Opening database connection");
    match settings.engine.as_str() {
        "sqlite" | "sqlite3" => open_sqlite(settings),
        "postgresql" | "postgres" => open_postgres(settings),
        other => Err(OrmError::ImproperlyConfigured(format!(
            "unknown database engine '{other}'"
        ))),
    }
}

/// Opens the `default` database of a [`Settings`].
pub fn connect_default(settings: &Settings) -> OrmResult<Box<dyn DbExecutor>> {
    let database = settings.default_database().ok_or_else(|| {
        OrmError::ImproperlyConfigured("no 'default' database is configured".to_string())
    })?;
    connect(database)
}

#[cfg(feature = "sqlite")]
fn open_sqlite(settings: &DatabaseSettings) -> OrmResult<Box<dyn DbExecutor>> {
    Ok(Box::new(crate::sqlite::SqliteBackend::from_settings(settings)?))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_settings: &DatabaseSettings) -> OrmResult<Box<dyn DbExecutor>> {
    Err(OrmError::ImproperlyConfigured(
        "minorm was built without the `sqlite` feature".to_string(),
    ))
}

#[cfg(feature = "postgres")]
fn open_postgres(settings: &DatabaseSettings) -> OrmResult<Box<dyn DbExecutor>> {
    Ok(Box::new(crate::postgresql::PostgresBackend::from_settings(settings)?))
}

#[cfg(not(feature = "postgres"))]
fn open_postgres(_settings: &DatabaseSettings) -> OrmResult<Box<dyn DbExecutor>> {
    Err(OrmError::ImproperlyConfigured(
        "minorm was built without the `postgres` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_engine() {
        let settings = DatabaseSettings {
            engine: "oracle".to_string(),
            ..DatabaseSettings::default()
        };
        let err = connect(&settings).err().unwrap();
        assert!(matches!(err, OrmError::ImproperlyConfigured(_)));
        assert!(err.to_string().contains("oracle"));
    }

    #[test]
    fn test_missing_default_database() {
        let mut settings = Settings::default();
        settings.databases.clear();
        assert!(matches!(
            connect_default(&settings),
            Err(OrmError::ImproperlyConfigured(_))
        ));
    }

    #[test]
    fn test_transaction_state() {
        let state = TransactionState::default();
        assert!(state.ensure_closed().is_ok());
        assert!(matches!(
            state.ensure_open("commit"),
            Err(OrmError::TransactionError(_))
        ));
        state.set_open(true);
        assert!(state.is_open());
        assert!(state.ensure_open("commit").is_ok());
        assert!(matches!(
            state.ensure_closed(),
            Err(OrmError::TransactionError(_))
        ));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_connect_sqlite_memory() {
        let db = connect(&DatabaseSettings::sqlite_memory()).unwrap();
        assert_eq!(db.backend_type().vendor(), "sqlite");
        assert!(!db.in_transaction());
    }
}
