//! PostgreSQL database backend using the blocking `postgres` client.
//!
//! This module provides the [`PostgresBackend`], a
//! [`DbExecutor`](minorm_db::DbExecutor) over one [`postgres::Client`]
//! guarded by a `Mutex`. Statements are prepared first so that every ORM
//! [`Value`] can be bound with the Rust type matching the parameter type
//! the server inferred.

use std::sync::{Mutex, MutexGuard};

use minorm_core::logging::{query_span, statement_kind};
use minorm_core::{DatabaseSettings, OrmError, OrmResult};
use minorm_db::query::compiler::DatabaseBackendType;
use minorm_db::value::Value;
use minorm_db::{DbExecutor, Row};
use postgres::fallible_iterator::FallibleIterator;
use postgres::types::{FromSql, ToSql, Type};
use postgres::{Client, NoTls, Statement};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::base::TransactionState;

type Param = Box<dyn ToSql + Sync>;

/// A PostgreSQL database backend.
///
/// The callback given to `query_each` runs while the client lock is held,
/// so it must not issue statements on the same backend.
pub struct PostgresBackend {
    client: Mutex<Client>,
    txn: TransactionState,
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackend")
            .field("in_transaction", &self.txn.is_open())
            .finish_non_exhaustive()
    }
}

impl PostgresBackend {
    /// Wraps an already connected client.
    pub fn new(client: Client) -> Self {
        Self {
            client: Mutex::new(client),
            txn: TransactionState::default(),
        }
    }

    /// Connects with a libpq-style URL or key/value string.
    pub fn connect(params: &str) -> OrmResult<Self> {
        let client = Client::connect(params, NoTls)
            .map_err(|e| OrmError::OperationalError(format!("PostgreSQL connect failed: {e}")))?;
        tracing::debug!("Connected to PostgreSQL");
        Ok(Self::new(client))
    }

    /// Connects to the database described by a settings entry.
    pub fn from_settings(settings: &DatabaseSettings) -> OrmResult<Self> {
        Self::connect(&settings.connection_url())
    }

    fn lock(&self) -> OrmResult<MutexGuard<'_, Client>> {
        self.client.lock().map_err(|_| {
            OrmError::OperationalError("PostgreSQL client lock poisoned".to_string())
        })
    }

    fn prepare(client: &mut Client, sql: &str, params: &[Value]) -> OrmResult<(Statement, Vec<Param>)> {
        let stmt = client.prepare(sql).map_err(map_error)?;
        if stmt.params().len() != params.len() {
            return Err(OrmError::DatabaseError(format!(
                "statement expects {} parameters, got {}",
                stmt.params().len(),
                params.len()
            )));
        }
        let bound = params
            .iter()
            .zip(stmt.params())
            .map(|(value, ty)| to_param(value, ty))
            .collect::<OrmResult<Vec<_>>>()?;
        Ok((stmt, bound))
    }

    fn batch(&self, sql: &str) -> OrmResult<()> {
        tracing::debug!(sql, "Executing statement");
        self.lock()?.batch_execute(sql).map_err(map_error)
    }
}

/// Maps driver errors onto [`OrmError`] variants.
///
/// SQLSTATE class 23 (integrity constraint violation) becomes
/// [`OrmError::IntegrityError`]; a closed connection is operational.
fn map_error(e: postgres::Error) -> OrmError {
    if e.code().is_some_and(|state| state.code().starts_with("23")) {
        return OrmError::IntegrityError(e.to_string());
    }
    if e.is_closed() {
        return OrmError::OperationalError(e.to_string());
    }
    OrmError::DatabaseError(e.to_string())
}

fn null_param(ty: &Type) -> Param {
    match *ty {
        Type::BOOL => Box::new(Option::<bool>::None),
        Type::INT2 => Box::new(Option::<i16>::None),
        Type::INT4 => Box::new(Option::<i32>::None),
        Type::INT8 => Box::new(Option::<i64>::None),
        Type::FLOAT4 => Box::new(Option::<f32>::None),
        Type::FLOAT8 => Box::new(Option::<f64>::None),
        Type::NUMERIC => Box::new(Option::<Decimal>::None),
        Type::DATE => Box::new(Option::<chrono::NaiveDate>::None),
        Type::TIMESTAMP => Box::new(Option::<chrono::NaiveDateTime>::None),
        Type::TIMESTAMPTZ => Box::new(Option::<chrono::DateTime<chrono::Utc>>::None),
        _ => Box::new(Option::<String>::None),
    }
}

#[allow(clippy::cast_precision_loss)]
fn int_param(i: i64, ty: &Type) -> OrmResult<Param> {
    let out_of_range =
        |_| OrmError::DatabaseError(format!("integer {i} does not fit a {ty} parameter"));
    Ok(match *ty {
        Type::INT2 => Box::new(i16::try_from(i).map_err(out_of_range)?),
        Type::INT4 => Box::new(i32::try_from(i).map_err(out_of_range)?),
        Type::FLOAT4 => Box::new(i as f32),
        Type::FLOAT8 => Box::new(i as f64),
        Type::NUMERIC => Box::new(Decimal::from(i)),
        Type::BOOL => Box::new(i != 0),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR => Box::new(i.to_string()),
        _ => Box::new(i),
    })
}

/// Converts one ORM value to a parameter of the server-inferred type.
fn to_param(value: &Value, ty: &Type) -> OrmResult<Param> {
    let mismatch = || OrmError::DatabaseError(format!("cannot bind {value:?} as {ty}"));
    Ok(match value {
        Value::Null => null_param(ty),
        Value::Bool(b) => match *ty {
            Type::INT2 | Type::INT4 | Type::INT8 => int_param(i64::from(*b), ty)?,
            _ => Box::new(*b),
        },
        Value::Int(i) => int_param(*i, ty)?,
        #[allow(clippy::cast_possible_truncation)]
        Value::Float(f) => match *ty {
            Type::FLOAT4 => Box::new(*f as f32),
            Type::NUMERIC => Box::new(Decimal::try_from(*f).map_err(|_| mismatch())?),
            _ => Box::new(*f),
        },
        Value::Decimal(d) => match *ty {
            Type::FLOAT4 => Box::new(d.to_f32().ok_or_else(mismatch)?),
            Type::FLOAT8 => Box::new(d.to_f64().ok_or_else(mismatch)?),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR => Box::new(d.to_string()),
            _ => Box::new(*d),
        },
        Value::String(s) => match *ty {
            Type::NUMERIC => Box::new(s.trim().parse::<Decimal>().map_err(|_| mismatch())?),
            _ => Box::new(s.clone()),
        },
        Value::Date(d) => Box::new(*d),
        Value::DateTime(dt) => match *ty {
            Type::TIMESTAMPTZ => Box::new(dt.and_utc()),
            _ => Box::new(*dt),
        },
        Value::List(_) => return Err(mismatch()),
    })
}

fn column<'a, T: FromSql<'a>>(
    row: &'a postgres::Row,
    i: usize,
    wrap: impl FnOnce(T) -> Value,
) -> OrmResult<Value> {
    Ok(row
        .try_get::<_, Option<T>>(i)
        .map_err(map_error)?
        .map_or(Value::Null, wrap))
}

/// Converts a `postgres::Row` to our generic `Row`.
fn convert_row(pg_row: &postgres::Row, names: &[String]) -> OrmResult<Row> {
    let values = pg_row
        .columns()
        .iter()
        .enumerate()
        .map(|(i, col)| match *col.type_() {
            Type::BOOL => column(pg_row, i, Value::Bool),
            Type::INT2 => column(pg_row, i, |v: i16| Value::Int(i64::from(v))),
            Type::INT4 => column(pg_row, i, |v: i32| Value::Int(i64::from(v))),
            Type::INT8 => column(pg_row, i, Value::Int),
            Type::FLOAT4 => column(pg_row, i, |v: f32| Value::Float(f64::from(v))),
            Type::FLOAT8 => column(pg_row, i, Value::Float),
            Type::NUMERIC => column(pg_row, i, Value::Decimal),
            Type::DATE => column(pg_row, i, Value::Date),
            Type::TIMESTAMP => column(pg_row, i, Value::DateTime),
            Type::TIMESTAMPTZ => column(pg_row, i, |v: chrono::DateTime<chrono::Utc>| {
                Value::DateTime(v.naive_utc())
            }),
            _ => column(pg_row, i, Value::String),
        })
        .collect::<OrmResult<Vec<_>>>()?;
    Ok(Row::new(names.to_vec(), values))
}

impl DbExecutor for PostgresBackend {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::PostgreSQL
    }

    fn execute_sql(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        let span = query_span("postgresql", statement_kind(sql));
        let _enter = span.enter();
        tracing::debug!(sql, params = params.len(), "Executing statement");

        let mut client = self.lock()?;
        let (stmt, bound) = Self::prepare(&mut client, sql, params)?;
        let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|p| &**p).collect();
        client.execute(&stmt, &refs).map_err(map_error)
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
        let span = query_span("postgresql", statement_kind(sql));
        let _enter = span.enter();
        tracing::debug!(sql, params = params.len(), "Executing query");

        let mut client = self.lock()?;
        let (stmt, bound) = Self::prepare(&mut client, sql, params)?;
        let names: Vec<String> = stmt
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let mut rows = client
            .query_raw(&stmt, bound.iter().map(|p| &**p as &dyn ToSql))
            .map_err(map_error)?;
        while let Some(row) = rows.next().map_err(map_error)? {
            if !f(convert_row(&row, &names)?)? {
                break;
            }
        }
        Ok(())
    }

    fn insert_returning_id(
        &self,
        sql: &str,
        params: &[Value],
        pk_column: &str,
    ) -> OrmResult<Value> {
        let sql = format!(
            "{} RETURNING {pk_column};",
            sql.trim_end().trim_end_matches(';')
        );
        self.query(&sql, params)?
            .into_iter()
            .next()
            .and_then(|row| row.into_values().into_iter().next())
            .ok_or_else(|| OrmError::DatabaseError("INSERT returned no row".to_string()))
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

    fn accepts<T: ToSql>(ty: &Type) -> bool {
        T::accepts(ty)
    }

    #[test]
    fn test_int_param_narrowing() {
        assert!(int_param(7, &Type::INT4).is_ok());
        assert!(int_param(i64::from(i32::MAX) + 1, &Type::INT4).is_err());
        assert!(int_param(70_000, &Type::INT2).is_err());
        assert!(int_param(1, &Type::INT8).is_ok());
    }

    #[test]
    fn test_list_is_rejected() {
        let err = to_param(&Value::list([1, 2]), &Type::INT8).err().unwrap();
        assert!(matches!(err, OrmError::DatabaseError(_)));
    }

    #[test]
    fn test_numeric_params() {
        assert!(accepts::<Decimal>(&Type::NUMERIC));
        assert!(to_param(&Value::from("12.50"), &Type::NUMERIC).is_ok());
        assert!(to_param(&Value::from("twelve"), &Type::NUMERIC).is_err());
        assert!(to_param(&Value::Int(4), &Type::NUMERIC).is_ok());
        assert!(to_param(&Value::Float(f64::NAN), &Type::NUMERIC).is_err());
        let price = Value::Decimal(Decimal::new(1999, 2));
        assert!(to_param(&price, &Type::NUMERIC).is_ok());
        assert!(to_param(&price, &Type::FLOAT8).is_ok());
    }

    #[test]
    fn test_typed_nulls_accept_their_type() {
        assert!(accepts::<Option<i32>>(&Type::INT4));
        assert!(accepts::<Option<chrono::NaiveDate>>(&Type::DATE));
        for ty in [Type::INT2, Type::INT8, Type::TEXT, Type::NUMERIC, Type::DATE] {
            assert!(to_param(&Value::Null, &ty).is_ok());
        }
    }

    /// Runs against a live server when `MINORM_TEST_POSTGRES_URL` is set.
    #[test]
    fn test_live_roundtrip() {
        let Ok(url) = std::env::var("MINORM_TEST_POSTGRES_URL") else {
            return;
        };
        let backend = PostgresBackend::connect(&url).unwrap();
        backend
            .execute_sql("DROP TABLE IF EXISTS minorm_probe;", &[])
            .unwrap();
        backend
            .execute_sql(
                "CREATE TABLE minorm_probe (id SERIAL PRIMARY KEY, name VARCHAR(20), n INTEGER);",
                &[],
            )
            .unwrap();
        let id = backend
            .insert_returning_id(
                "INSERT INTO minorm_probe (name, n) VALUES ($1, $2);",
                &[Value::from("x"), Value::Int(3)],
                "id",
            )
            .unwrap();
        assert_eq!(id, Value::Int(1));

        let rows = backend
            .query(
                "SELECT name, n FROM minorm_probe WHERE n >= $1;",
                &[Value::Int(1)],
            )
            .unwrap();
        assert_eq!(rows[0].get::<String>("name").unwrap(), "x");
        assert_eq!(rows[0].get::<i64>("n").unwrap(), 3);

        backend.begin().unwrap();
        backend
            .execute_sql("DELETE FROM minorm_probe;", &[])
            .unwrap();
        backend.rollback().unwrap();
        let count = backend
            .query("SELECT COUNT(*) FROM minorm_probe;", &[])
            .unwrap();
        assert_eq!(count[0].get_by_index::<i64>(0).unwrap(), 1);
        backend.execute_sql("DROP TABLE minorm_probe;", &[]).unwrap();
    }
}
