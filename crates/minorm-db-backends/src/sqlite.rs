//! SQLite database backend using `rusqlite`.
//!
//! This module provides the [`SqliteBackend`], a blocking
//! [`DbExecutor`](minorm_db::DbExecutor) over a single `rusqlite` connection
//! guarded by a `Mutex`.
//!
//! Features:
//! - Foreign key enforcement switched on at open
//! - WAL mode for file databases, overridable through settings options
//! - In-memory database support via `:memory:` path (great for testing)
//! - Row streaming straight from the cursor in `query_each`

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use minorm_core::logging::{query_span, statement_kind};
use minorm_core::{DatabaseSettings, OrmError, OrmResult};
use minorm_db::query::compiler::DatabaseBackendType;
use minorm_db::value::Value;
use minorm_db::{DbExecutor, Row};
use rusqlite::types::ValueRef;
use rusqlite::ErrorCode;

use crate::base::TransactionState;

const MEMORY: &str = ":memory:";

/// A SQLite database backend.
///
/// Statements run on the calling thread while holding the connection lock.
/// The callback given to `query_each` runs under that lock too, so it must
/// not issue statements on the same backend.
pub struct SqliteBackend {
    /// The path to the database file (or ":memory:").
    path: PathBuf,
    conn: Mutex<rusqlite::Connection>,
    txn: TransactionState,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .field("in_transaction", &self.txn.is_open())
            .finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Opens a SQLite database at the given path.
    ///
    /// If the path is `:memory:`, an in-memory database is created.
    /// WAL journal mode is enabled for file-based databases.
    pub fn open(path: impl Into<PathBuf>) -> OrmResult<Self> {
        Self::open_with_pragmas(path.into(), &[])
    }

    /// Opens an in-memory database (convenience constructor).
    pub fn memory() -> OrmResult<Self> {
        Self::open(MEMORY)
    }

    /// Opens the database named by a settings entry.
    ///
    /// Every entry of `options` is applied as a `PRAGMA` after the defaults,
    /// e.g. `journal_mode = "DELETE"` or `busy_timeout = "5000"`.
    pub fn from_settings(settings: &DatabaseSettings) -> OrmResult<Self> {
        let mut pragmas: Vec<(&str, &str)> = settings
            .options
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        pragmas.sort_unstable();
        Self::open_with_pragmas(PathBuf::from(&settings.name), &pragmas)
    }

    fn open_with_pragmas(path: PathBuf, pragmas: &[(&str, &str)]) -> OrmResult<Self> {
        let in_memory = path.to_str() == Some(MEMORY);
        let conn = if in_memory {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&path)
        }
        .map_err(|e| OrmError::OperationalError(format!("SQLite open failed: {e}")))?;

        let mut setup = String::from("PRAGMA foreign_keys=ON;");
        if !in_memory {
            setup.push_str(" PRAGMA journal_mode=WAL;");
        }
        for (name, value) in pragmas {
            setup.push_str(&format!(" PRAGMA {name}={value};"));
        }
        conn.execute_batch(&setup)
            .map_err(|e| OrmError::OperationalError(format!("Failed to set pragmas: {e}")))?;

        tracing::debug!(path = %path.display(), "Opened SQLite database");
        Ok(Self {
            path,
            conn: Mutex::new(conn),
            txn: TransactionState::default(),
        })
    }

    /// Returns the database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> OrmResult<MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| OrmError::OperationalError("SQLite connection lock poisoned".to_string()))
    }

    /// Binds ORM `Value` types to a `rusqlite` statement.
    fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &[Value]) -> OrmResult<()> {
        for (i, param) in params.iter().enumerate() {
            let idx = i + 1;
            match param {
                Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
                Value::Bool(b) => stmt.raw_bind_parameter(idx, b),
                Value::Int(v) => stmt.raw_bind_parameter(idx, v),
                Value::Float(v) => stmt.raw_bind_parameter(idx, v),
                // Text keeps every digit; DECIMAL affinity converts on store.
                Value::Decimal(d) => stmt.raw_bind_parameter(idx, d.to_string()),
                Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
                Value::Date(d) => stmt.raw_bind_parameter(idx, d.to_string()),
                Value::DateTime(dt) => stmt.raw_bind_parameter(idx, dt.to_string()),
                Value::List(_) => {
                    return Err(OrmError::DatabaseError(format!(
                        "Bind error: parameter {idx} is a list"
                    )))
                }
            }
            .map_err(|e| OrmError::DatabaseError(format!("Bind error: {e}")))?;
        }
        Ok(())
    }

    /// Converts a `rusqlite::Row` to our generic `Row`.
    fn convert_row(sqlite_row: &rusqlite::Row<'_>, column_names: &[String]) -> OrmResult<Row> {
        let values = (0..column_names.len())
            .map(|i| {
                let value = match sqlite_row.get_ref(i).map_err(map_error)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(v) => Value::Int(v),
                    ValueRef::Real(v) => Value::Float(v),
                    ValueRef::Text(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
                    ValueRef::Blob(_) => {
                        return Err(OrmError::DatabaseError(format!(
                            "column '{}' holds a BLOB, which no field type reads",
                            column_names[i]
                        )))
                    }
                };
                Ok(value)
            })
            .collect::<OrmResult<Vec<_>>>()?;
        Ok(Row::new(column_names.to_vec(), values))
    }

    fn run(&self, sql: &str, params: &[Value]) -> OrmResult<(u64, i64)> {
        let span = query_span("sqlite", statement_kind(sql));
        let _enter = span.enter();
        tracing::debug!(sql, params = params.len(), "Executing statement");

        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(map_error)?;
        Self::bind_params(&mut stmt, params)?;
        let count = stmt.raw_execute().map_err(map_error)?;
        Ok((count as u64, conn.last_insert_rowid()))
    }

    fn batch(&self, sql: &str) -> OrmResult<()> {
        tracing::debug!(sql, "Executing statement");
        self.lock()?.execute_batch(sql).map_err(map_error)
    }
}

/// Maps driver errors onto [`OrmError`] variants.
fn map_error(e: rusqlite::Error) -> OrmError {
    match &e {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::ConstraintViolation => OrmError::IntegrityError(e.to_string()),
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::ReadOnly
            | ErrorCode::DiskFull
            | ErrorCode::SystemIoFailure => OrmError::OperationalError(e.to_string()),
            _ => OrmError::DatabaseError(e.to_string()),
        },
        _ => OrmError::DatabaseError(e.to_string()),
    }
}

impl DbExecutor for SqliteBackend {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::SQLite
    }

    fn execute_sql(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        self.run(sql, params).map(|(count, _)| count)
    }

    fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Row>> {
        let mut rows = Vec::new();
        self.query_each(sql, params, &mut |row| {
            rows.push(row);
            Ok(true)
        })?;
        Ok(rows)
    }

    fn query_each(
        &self,
        sql: &str,
        params: &[Value],
        f: &mut dyn FnMut(Row) -> OrmResult<bool>,
    ) -> OrmResult<()> {
        let span = query_span("sqlite", statement_kind(sql));
        let _enter = span.enter();
        tracing::debug!(sql, params = params.len(), "Executing query");

        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(map_error)?;
        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        Self::bind_params(&mut stmt, params)?;

        let mut raw_rows = stmt.raw_query();
        while let Some(row) = raw_rows.next().map_err(map_error)? {
            if !f(Self::convert_row(row, &column_names)?)? {
                break;
            }
        }
        Ok(())
    }

    fn insert_returning_id(
        &self,
        sql: &str,
        params: &[Value],
        _pk_column: &str,
    ) -> OrmResult<Value> {
        self.run(sql, params).map(|(_, id)| Value::Int(id))
    }

    fn begin(&self) -> OrmResult<()> {
        self.txn.ensure_closed()?;
        self.batch("BEGIN")?;
        self.txn.set_open(true);
        Ok(())
    }

    fn commit(&self) -> OrmResult<()> {
        self.txn.ensure_open("commit")?;
        self.batch("COMMIT")?;
        self.txn.set_open(false);
        Ok(())
    }

    fn rollback(&self) -> OrmResult<()> {
        self.txn.ensure_open("roll back")?;
        let result = self.batch("ROLLBACK");
        self.txn.set_open(false);
        result
    }

    fn in_transaction(&self) -> bool {
        self.txn.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_with(table_sql: &str) -> SqliteBackend {
        let backend = SqliteBackend::memory().unwrap();
        backend.execute_sql(table_sql, &[]).unwrap();
        backend
    }

    #[test]
    fn test_sqlite_memory_open() {
        let backend = SqliteBackend::memory().unwrap();
        assert_eq!(backend.backend_type(), DatabaseBackendType::SQLite);
        assert_eq!(backend.path(), Path::new(MEMORY));
        assert!(!backend.in_transaction());
    }

    #[test]
    fn test_sqlite_insert_and_query() {
        let backend =
            backend_with("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)");
        let id = backend
            .insert_returning_id(
                "INSERT INTO users (name, age) VALUES (?, ?)",
                &[Value::from("Alice"), Value::from(30)],
                "id",
            )
            .unwrap();
        assert_eq!(id, Value::Int(1));

        let rows = backend
            .query("SELECT id, name, age FROM users", &[])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String>("name").unwrap(), "Alice");
        assert_eq!(rows[0].get::<i64>("age").unwrap(), 30);
    }

    #[test]
    fn test_sqlite_null_and_typed_values() {
        let backend = backend_with(
            "CREATE TABLE test (id INTEGER PRIMARY KEY, bio TEXT, price REAL, \
             active INTEGER, born TEXT, cost DECIMAL(6, 2))",
        );
        let born = chrono::NaiveDate::from_ymd_opt(1990, 5, 17).unwrap();
        backend
            .execute_sql(
                "INSERT INTO test (bio, price, active, born, cost) VALUES (?, ?, ?, ?, ?)",
                &[
                    Value::Null,
                    Value::from(19.99),
                    Value::from(true),
                    Value::from(born),
                    Value::Decimal(rust_decimal::Decimal::new(1250, 2)),
                ],
            )
            .unwrap();

        let rows = backend
            .query("SELECT bio, price, active, born, cost FROM test", &[])
            .unwrap();
        let row = &rows[0];
        assert_eq!(row.get::<Option<String>>("bio").unwrap(), None);
        assert!((row.get::<f64>("price").unwrap() - 19.99).abs() < f64::EPSILON);
        assert!(row.get::<bool>("active").unwrap());
        assert_eq!(row.get::<chrono::NaiveDate>("born").unwrap(), born);
        assert_eq!(
            row.get::<rust_decimal::Decimal>("cost").unwrap(),
            rust_decimal::Decimal::new(125, 1)
        );

        let blob = backend.query("SELECT x'DEAD' AS raw", &[]);
        assert!(matches!(blob, Err(OrmError::DatabaseError(_))));
    }

    #[test]
    fn test_sqlite_rowcount() {
        let backend = backend_with("CREATE TABLE t (id INTEGER PRIMARY KEY, n INTEGER)");
        let inserted = backend
            .execute_sql("INSERT INTO t (n) VALUES (?), (?), (?)", &[
                Value::from(1),
                Value::from(2),
                Value::from(3),
            ])
            .unwrap();
        assert_eq!(inserted, 3);
        let updated = backend
            .execute_sql("UPDATE t SET n = 0 WHERE n > ?", &[Value::from(1)])
            .unwrap();
        assert_eq!(updated, 2);
    }

    #[test]
    fn test_sqlite_query_each_stops_early() {
        let backend = backend_with("CREATE TABLE t (id INTEGER PRIMARY KEY)");
        backend
            .execute_sql("INSERT INTO t DEFAULT VALUES", &[])
            .unwrap();
        backend
            .execute_sql("INSERT INTO t DEFAULT VALUES", &[])
            .unwrap();

        let mut seen = 0;
        backend
            .query_each("SELECT id FROM t", &[], &mut |_| {
                seen += 1;
                Ok(false)
            })
            .unwrap();
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_sqlite_error_mapping() {
        let backend = backend_with("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT NOT NULL)");
        assert!(matches!(
            backend.execute_sql("INSERT INTO t (name) VALUES (?)", &[Value::Null]),
            Err(OrmError::IntegrityError(_))
        ));
        assert!(matches!(
            backend.query("SELECT nope FROM t", &[]),
            Err(OrmError::DatabaseError(_))
        ));
        assert!(matches!(
            backend.execute_sql("SELECT ?", &[Value::list([1])]),
            Err(OrmError::DatabaseError(_))
        ));
    }

    #[test]
    fn test_sqlite_foreign_keys_enforced() {
        let backend = backend_with("CREATE TABLE parent (id INTEGER PRIMARY KEY)");
        backend
            .execute_sql(
                "CREATE TABLE child (id INTEGER PRIMARY KEY, \
                 parent_id INTEGER NOT NULL REFERENCES parent (id))",
                &[],
            )
            .unwrap();
        assert!(matches!(
            backend.execute_sql("INSERT INTO child (parent_id) VALUES (?)", &[Value::from(9)]),
            Err(OrmError::IntegrityError(_))
        ));
    }

    #[test]
    fn test_sqlite_transactions() {
        let backend = backend_with("CREATE TABLE t (id INTEGER PRIMARY KEY)");
        assert!(matches!(backend.commit(), Err(OrmError::TransactionError(_))));

        backend.begin().unwrap();
        assert!(backend.in_transaction());
        assert!(matches!(backend.begin(), Err(OrmError::TransactionError(_))));
        backend
            .execute_sql("INSERT INTO t DEFAULT VALUES", &[])
            .unwrap();
        backend.rollback().unwrap();
        assert!(!backend.in_transaction());
        assert!(backend.query("SELECT id FROM t", &[]).unwrap().is_empty());

        backend.begin().unwrap();
        backend
            .execute_sql("INSERT INTO t DEFAULT VALUES", &[])
            .unwrap();
        backend.commit().unwrap();
        assert_eq!(backend.query("SELECT id FROM t", &[]).unwrap().len(), 1);
    }

    #[test]
    fn test_sqlite_from_settings_applies_options() {
        let mut settings = DatabaseSettings::sqlite_memory();
        settings
            .options
            .insert("user_version".to_string(), "7".to_string());
        let backend = SqliteBackend::from_settings(&settings).unwrap();
        let rows = backend.query("PRAGMA user_version", &[]).unwrap();
        assert_eq!(rows[0].get_by_index::<i64>(0).unwrap(), 7);
    }
}
