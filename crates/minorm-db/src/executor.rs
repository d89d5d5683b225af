//! Database executor trait and model CRUD operations.
//!
//! This module defines the [`DbExecutor`] trait that provides the minimal
//! blocking interface required by [`QuerySet`](crate::query::queryset::QuerySet)
//! execution methods and model CRUD operations. It also provides free
//! functions for save/delete/refresh on model instances and for creating and
//! dropping a model's table.
//!
//! The `DbExecutor` trait is implemented by backend types (`SqliteBackend`,
//! `PostgresBackend`) in the `minorm-db-backends` crate.

use minorm_core::{OrmError, OrmResult};

use crate::model::Model;
use crate::query::compiler::{
    CreateTableQuery, DatabaseBackendType, DeleteQuery, DropTableQuery, InsertQuery, Row,
    UpdateQuery,
};
use crate::query::expressions::{Operator, WhereCondition};
use crate::value::Value;

/// Minimal blocking database executor trait.
///
/// This is the bridge between the ORM layer (`minorm-db`) and the concrete
/// database backends (`minorm-db-backends`). `QuerySet` execution methods
/// and model CRUD functions accept `&dyn DbExecutor`, which backends implement.
/// SQL handed to the executor already carries the dialect's placeholders.
pub trait DbExecutor: Send + Sync {
    /// Returns the backend type for SQL rendering.
    fn backend_type(&self) -> DatabaseBackendType;

    /// Runs a SQL statement that does not return rows.
    /// Returns the number of rows affected.
    fn execute_sql(&self, sql: &str, params: &[Value]) -> OrmResult<u64>;

    /// Runs one statement once per parameter set, returning the total
    /// number of rows affected.
    fn execute_many(&self, sql: &str, param_sets: &[Vec<Value>]) -> OrmResult<u64> {
        let mut total = 0;
        for params in param_sets {
            total += self.execute_sql(sql, params)?;
        }
        Ok(total)
    }

    /// Runs a SQL query and returns all result rows.
    fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Row>>;

    /// Runs a SQL query and hands rows to `f` one at a time as the cursor
    /// produces them. Iteration stops early when `f` returns `Ok(false)`.
    fn query_each(
        &self,
        sql: &str,
        params: &[Value],
        f: &mut dyn FnMut(Row) -> OrmResult<bool>,
    ) -> OrmResult<()>;

    /// Executes an INSERT and returns the generated value of `pk_column`.
    fn insert_returning_id(&self, sql: &str, params: &[Value], pk_column: &str)
        -> OrmResult<Value>;

    /// Opens a transaction.
    fn begin(&self) -> OrmResult<()>;

    /// Commits the open transaction.
    fn commit(&self) -> OrmResult<()>;

    /// Rolls back the open transaction.
    fn rollback(&self) -> OrmResult<()>;

    /// Returns `true` while a transaction is open.
    fn in_transaction(&self) -> bool;
}

// ── Model CRUD free functions ──────────────────────────────────────────

fn pk_condition<M: Model>(pk: Value) -> OrmResult<WhereCondition> {
    let meta = M::meta();
    let pk_field = meta.pk_field();
    Ok(WhereCondition::new(
        pk_field.query_name(meta.table_name()),
        Operator::Eq,
        pk_field.adapt(pk)?,
    ))
}

/// Collects `(column, adapted value)` pairs for the non-primary-key fields.
/// A NULL value falls back to the field's default.
fn write_columns<M: Model>(model: &M) -> OrmResult<Vec<(String, Value)>> {
    let meta = M::meta();
    model
        .field_values()
        .into_iter()
        .map(|(name, value)| {
            let field = meta.check_field(name)?;
            let value = if value.is_null() {
                field.get_default()
            } else {
                value
            };
            Ok((field.column.clone(), field.adapt(value)?))
        })
        .collect()
}

/// Collects the columns written by an INSERT: the primary key first unless
/// the database generates it, then every other field.
pub(crate) fn insert_columns<M: Model>(model: &M) -> OrmResult<Vec<(String, Value)>> {
    let pk_field = M::meta().pk_field();
    let mut columns = write_columns(model)?;
    if !pk_field.is_auto() {
        columns.insert(0, (pk_field.column.clone(), pk_field.adapt(model.pk())?));
    }
    Ok(columns)
}

/// Inserts a model instance, writing back a database-generated key.
pub(crate) fn insert_model<M: Model>(model: &mut M, db: &dyn DbExecutor) -> OrmResult<()> {
    let meta = M::meta();
    let pk_field = meta.pk_field();
    let (names, values): (Vec<String>, Vec<Value>) = insert_columns(model)?.into_iter().unzip();
    let query = InsertQuery::new(meta.table_name(), names, values);

    let sql = query.render_sql(db.backend_type());
    let pk = db.insert_returning_id(&sql, &query.params(), &pk_field.column)?;
    if pk_field.is_auto() {
        model.set_pk(pk);
    }
    Ok(())
}

/// Saves a model instance to the database.
///
/// An instance whose primary key is unset (`NULL`, `0`, or empty) is
/// inserted and receives the generated key. Otherwise every non-pk field is
/// written with an UPDATE; when that matches no row and the key is not
/// generated by the database, the instance is inserted with its key.
pub fn save_model<M: Model>(model: &mut M, db: &dyn DbExecutor) -> OrmResult<()> {
    let pk = model.pk();
    if !pk.is_set() {
        return insert_model(model, db);
    }

    let assignments = write_columns(model)?;
    if assignments.is_empty() {
        return Ok(());
    }
    let mut query = UpdateQuery::new(M::table_name(), assignments);
    query.where_clause = Some(pk_condition::<M>(pk)?);
    let updated = db.execute_sql(&query.render_sql(db.backend_type()), &query.params())?;
    if updated == 0 && !M::meta().pk_field().is_auto() {
        return insert_model(model, db);
    }
    Ok(())
}

/// Deletes a model instance from the database and clears its primary key.
///
/// Returns the number of rows deleted.
pub fn delete_model<M: Model>(model: &mut M, db: &dyn DbExecutor) -> OrmResult<u64> {
    let pk = model.pk();
    if !pk.is_set() {
        return Err(OrmError::DatabaseError(format!(
            "{} object can't be deleted because its primary key is not set",
            M::table_name()
        )));
    }
    let mut query = DeleteQuery::new(M::table_name());
    query.where_clause = Some(pk_condition::<M>(pk)?);
    let deleted = db.execute_sql(&query.render_sql(db.backend_type()), &query.params())?;
    model.set_pk(Value::Null);
    Ok(deleted)
}

/// Reloads every field of a model instance from its row.
pub fn refresh_model<M: Model>(model: &mut M, db: &dyn DbExecutor) -> OrmResult<()> {
    let pk = model.pk();
    if !pk.is_set() {
        return Err(OrmError::DatabaseError(format!(
            "{} object can't be refreshed because its primary key is not set",
            M::table_name()
        )));
    }
    *model = M::objects().get(db, [("pk", pk)])?;
    Ok(())
}

/// Creates the table of model `M` from its field declarations.
pub fn create_table<M: Model>(db: &dyn DbExecutor) -> OrmResult<()> {
    let backend = db.backend_type();
    let declarations = M::meta()
        .fields
        .iter()
        .map(|f| f.to_sql_declaration(backend))
        .collect();
    let query = CreateTableQuery::new(M::table_name(), declarations);
    db.execute_sql(&query.render_sql(), &[])?;
    Ok(())
}

/// Drops the table of model `M`.
pub fn drop_table<M: Model>(db: &dyn DbExecutor) -> OrmResult<()> {
    db.execute_sql(&DropTableQuery::new(M::table_name()).render_sql(), &[])?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use super::testing::RecordingExecutor;
    use super::*;
    use crate::fields::{FieldDef, FieldType};
    use crate::model::{ModelMeta, Record};

    // Test that DbExecutor is object-safe
    fn _assert_object_safe(_: &dyn DbExecutor) {}

    #[derive(Debug, Default, PartialEq)]
    struct Person {
        id: Option<i64>,
        name: String,
        age: i64,
    }

    impl Model for Person {
        fn meta() -> &'static ModelMeta {
            static META: LazyLock<ModelMeta> = LazyLock::new(|| {
                ModelMeta::new(
                    "person",
                    vec![
                        FieldDef::new("name", FieldType::CharField).max_length(50),
                        FieldDef::new("age", FieldType::IntegerField).default(0),
                    ],
                )
            });
            &META
        }

        fn pk(&self) -> Value {
            self.id.into()
        }

        fn set_pk(&mut self, value: Value) {
            self.id = value.as_int();
        }

        fn field_values(&self) -> Vec<(&'static str, Value)> {
            vec![("name", self.name.clone().into()), ("age", self.age.into())]
        }

        fn from_record(record: &mut Record) -> OrmResult<Self> {
            Ok(Self {
                id: record.next()?,
                name: record.next()?,
                age: record.next()?,
            })
        }
    }

    struct Tag {
        slug: String,
        label: Option<String>,
    }

    impl Model for Tag {
        fn meta() -> &'static ModelMeta {
            static META: LazyLock<ModelMeta> = LazyLock::new(|| {
                ModelMeta::new(
                    "tag",
                    vec![
                        FieldDef::new("slug", FieldType::CharField)
                            .max_length(20)
                            .primary_key(),
                        FieldDef::new("label", FieldType::TextField)
                            .nullable()
                            .default("untitled"),
                    ],
                )
            });
            &META
        }

        fn pk(&self) -> Value {
            self.slug.clone().into()
        }

        fn set_pk(&mut self, value: Value) {
            self.slug = value.as_str().unwrap_or_default().to_string();
        }

        fn field_values(&self) -> Vec<(&'static str, Value)> {
            vec![("label", self.label.clone().into())]
        }

        fn from_record(record: &mut Record) -> OrmResult<Self> {
            Ok(Self {
                slug: record.next()?,
                label: record.next()?,
            })
        }
    }

    fn person(name: &str, age: i64) -> Person {
        Person {
            id: None,
            name: name.into(),
            age,
        }
    }

    #[test]
    fn test_save_inserts_and_sets_pk() {
        let mut db = RecordingExecutor::new(DatabaseBackendType::SQLite);
        db.next_id = 7;
        let mut p = person("x", 3);
        save_model(&mut p, &db).unwrap();
        assert_eq!(p.id, Some(7));
        assert_eq!(
            db.last(),
            (
                "INSERT INTO person (name, age) VALUES (?, ?);".to_string(),
                vec![Value::from("x"), Value::Int(3)]
            )
        );
    }

    #[test]
    fn test_save_updates_existing() {
        let db = RecordingExecutor::new(DatabaseBackendType::PostgreSQL);
        let mut p = person("x", 4);
        p.id = Some(2);
        save_model(&mut p, &db).unwrap();
        assert_eq!(
            db.last(),
            (
                "UPDATE person SET name = $1, age = $2 WHERE person.id = $3;".to_string(),
                vec![Value::from("x"), Value::Int(4), Value::Int(2)]
            )
        );
        assert_eq!(db.sql().len(), 1);
    }

    #[test]
    fn test_save_explicit_pk_falls_back_to_insert() {
        let mut db = RecordingExecutor::new(DatabaseBackendType::SQLite);
        db.rowcount = 0;
        let mut tag = Tag {
            slug: "rust".into(),
            label: None,
        };
        save_model(&mut tag, &db).unwrap();
        let sql = db.sql();
        assert_eq!(sql[0], "UPDATE tag SET label = ? WHERE tag.slug = ?;");
        assert_eq!(
            db.last(),
            (
                "INSERT INTO tag (slug, label) VALUES (?, ?);".to_string(),
                vec![Value::from("rust"), Value::from("untitled")]
            )
        );
        assert_eq!(tag.slug, "rust");
    }

    #[test]
    fn test_delete_clears_pk() {
        let db = RecordingExecutor::new(DatabaseBackendType::SQLite);
        let mut p = person("x", 3);
        assert!(delete_model(&mut p, &db).is_err());

        p.id = Some(5);
        assert_eq!(delete_model(&mut p, &db).unwrap(), 1);
        assert_eq!(p.id, None);
        assert_eq!(
            db.last(),
            (
                "DELETE FROM person WHERE person.id = ?;".to_string(),
                vec![Value::Int(5)]
            )
        );
    }

    #[test]
    fn test_refresh_reloads_fields() {
        let db = RecordingExecutor::new(DatabaseBackendType::SQLite);
        db.push_rows(
            &["id", "name", "age"],
            vec![vec![Value::Int(3), Value::from("fresh"), Value::Int(40)]],
        );
        let mut p = person("stale", 1);
        p.id = Some(3);
        refresh_model(&mut p, &db).unwrap();
        assert_eq!(
            p,
            Person {
                id: Some(3),
                name: "fresh".into(),
                age: 40
            }
        );
        assert_eq!(
            db.last().0,
            "SELECT person.id, person.name, person.age FROM person WHERE person.id = ? LIMIT 2;"
        );
    }

    #[test]
    fn test_refresh_missing_row() {
        let db = RecordingExecutor::new(DatabaseBackendType::SQLite);
        let mut p = person("gone", 1);
        p.id = Some(9);
        assert!(matches!(
            refresh_model(&mut p, &db),
            Err(OrmError::DoesNotExist(_))
        ));
    }

    #[test]
    fn test_create_and_drop_table() {
        let db = RecordingExecutor::new(DatabaseBackendType::SQLite);
        create_table::<Person>(&db).unwrap();
        drop_table::<Person>(&db).unwrap();
        assert_eq!(
            db.sql(),
            vec![
                "CREATE TABLE person (id INTEGER PRIMARY KEY AUTOINCREMENT, \
                 name VARCHAR(50) NOT NULL, age INTEGER NOT NULL DEFAULT 0);",
                "DROP TABLE person;",
            ]
        );

        let pg = RecordingExecutor::new(DatabaseBackendType::PostgreSQL);
        create_table::<Tag>(&pg).unwrap();
        assert_eq!(
            pg.sql()[0],
            "CREATE TABLE tag (slug VARCHAR(20) PRIMARY KEY NOT NULL, \
             label TEXT DEFAULT 'untitled');"
        );
    }
}
