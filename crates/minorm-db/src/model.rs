//! Model trait and metadata for the ORM.
//!
//! The [`Model`] trait is implemented by every struct that maps to a table.
//! It exposes the model's static [`ModelMeta`], reads and writes the primary
//! key, lists field values for writes, and rebuilds an instance from a
//! [`Record`] when rows come back.
//!
//! Materialization is positional: a [`Record`] hands out values in the order
//! of [`ModelMeta::fields`], so `from_record` reads fields in declaration
//! order (with the implicit `id` primary key first when the model does not
//! declare one).

use std::fmt;

use indexmap::IndexMap;
use minorm_core::{OrmError, OrmResult};

use crate::fields::{FieldDef, FieldType};
use crate::query::compiler::FromValue;
use crate::query::queryset::Manager;
use crate::value::Value;

/// The core trait for all ORM models.
///
/// # Examples
///
/// ```
/// use std::sync::LazyLock;
///
/// use minorm_core::OrmResult;
/// use minorm_db::fields::{FieldDef, FieldType};
/// use minorm_db::model::{Model, ModelMeta, Record};
/// use minorm_db::value::Value;
///
/// struct Person {
///     id: Option<i64>,
///     name: String,
///     age: i64,
/// }
///
/// impl Model for Person {
///     fn meta() -> &'static ModelMeta {
///         static META: LazyLock<ModelMeta> = LazyLock::new(|| {
///             ModelMeta::new(
///                 "person",
///                 vec![
///                     FieldDef::new("name", FieldType::CharField).max_length(255),
///                     FieldDef::new("age", FieldType::IntegerField),
///                 ],
///             )
///         });
///         &META
///     }
///
///     fn pk(&self) -> Value {
///         self.id.into()
///     }
///
///     fn set_pk(&mut self, value: Value) {
///         self.id = value.as_int();
///     }
///
///     fn field_values(&self) -> Vec<(&'static str, Value)> {
///         vec![
///             ("name", self.name.clone().into()),
///             ("age", self.age.into()),
///         ]
///     }
///
///     fn from_record(record: &mut Record) -> OrmResult<Self> {
///         Ok(Self {
///             id: record.next()?,
///             name: record.next()?,
///             age: record.next()?,
///         })
///     }
/// }
///
/// assert_eq!(Person::meta().pk_field().name, "id");
/// ```
pub trait Model: Sized + Send + Sync + 'static {
    /// Returns the static metadata for this model type.
    fn meta() -> &'static ModelMeta;

    /// Returns the primary key value, `Value::Null` if the instance is unsaved.
    fn pk(&self) -> Value;

    /// Sets the primary key value on this instance (used after INSERT).
    fn set_pk(&mut self, value: Value);

    /// Returns `(field name, value)` pairs for the non-primary-key fields.
    ///
    /// Fields missing from the list are written with their default.
    fn field_values(&self) -> Vec<(&'static str, Value)>;

    /// Rebuilds an instance from a record, reading fields in declaration order.
    fn from_record(record: &mut Record) -> OrmResult<Self>;

    /// Returns the manager used to start queries for this model.
    fn objects() -> Manager<Self> {
        Manager::new()
    }

    /// Returns the database table name.
    fn table_name() -> &'static str {
        Self::meta().table_name()
    }
}

/// Static metadata about a model: table name and ordered field list.
///
/// Build it once per model (typically inside a `LazyLock`). A model that does
/// not declare a primary key receives an `id` [`FieldType::AutoField`] as
/// its first field.
#[derive(Debug)]
pub struct ModelMeta {
    table: String,
    /// Field definitions for this model, primary key included.
    pub fields: Vec<FieldDef>,
    pk_index: usize,
}

impl ModelMeta {
    /// Creates metadata for `table` with the given fields.
    ///
    /// # Panics
    ///
    /// Panics if more than one field is marked as primary key. Use
    /// [`try_new`](Self::try_new) to get the error instead.
    pub fn new(table: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        match Self::try_new(table, fields) {
            Ok(meta) => meta,
            Err(err) => panic!("{err}"),
        }
    }

    /// Fallible version of [`new`](Self::new).
    pub fn try_new(table: impl Into<String>, mut fields: Vec<FieldDef>) -> OrmResult<Self> {
        let table = table.into();
        let pk_count = fields.iter().filter(|f| f.primary_key).count();
        if pk_count > 1 {
            return Err(OrmError::ModelSetupError(format!(
                "Model '{table}' should have only one primary key."
            )));
        }
        if pk_count == 0 {
            fields.insert(0, FieldDef::new("id", FieldType::AutoField).primary_key());
        }
        let pk_index = fields.iter().position(|f| f.primary_key).unwrap_or(0);
        Ok(Self {
            table,
            fields,
            pk_index,
        })
    }

    /// Returns the database table name.
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Returns the primary key field.
    pub fn pk_field(&self) -> &FieldDef {
        &self.fields[self.pk_index]
    }

    /// Looks up a field by name. `pk` is an alias for the primary key field.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        if name == "pk" {
            return Some(self.pk_field());
        }
        self.fields.iter().find(|f| f.name == name)
    }

    /// Like [`field`](Self::field), but fails with [`OrmError::InvalidField`].
    pub fn check_field(&self, name: &str) -> OrmResult<&FieldDef> {
        self.field(name).ok_or_else(|| {
            OrmError::InvalidField(format!(
                "'{name}' is not a valid field for model '{}'",
                self.table
            ))
        })
    }

    /// Returns the fields written on INSERT/UPDATE: everything except auto fields.
    pub fn writable_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| !f.is_auto())
    }

    /// Returns the column names in field order.
    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.column.as_str()).collect()
    }

    /// Returns the table-qualified column names in field order.
    pub fn query_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.query_name(&self.table)).collect()
    }

    /// Returns `true` if `other` is this very metadata instance.
    pub fn is(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

/// The values of one model's row, handed to [`Model::from_record`].
///
/// Values are consumed in field order with [`next`](Record::next). Related
/// instances loaded through `select_related` are attached to their foreign
/// key field and picked up by [`next_related`](Record::next_related).
pub struct Record {
    meta: &'static ModelMeta,
    values: Vec<Value>,
    related: IndexMap<&'static str, Record>,
    cursor: usize,
}

impl Record {
    /// Creates a record for `meta`. `values` must follow field order.
    pub fn new(
        meta: &'static ModelMeta,
        values: Vec<Value>,
        related: IndexMap<&'static str, Record>,
    ) -> Self {
        Self {
            meta,
            values,
            related,
            cursor: 0,
        }
    }

    /// Returns the model metadata this record belongs to.
    pub const fn meta(&self) -> &'static ModelMeta {
        self.meta
    }

    /// Returns the primary key value of this record.
    pub fn pk(&self) -> &Value {
        self.values.get(self.meta.pk_index).unwrap_or(&Value::Null)
    }

    /// Returns all values in field order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the record loaded for a foreign key field, if any.
    pub fn related(&self, field: &str) -> Option<&Self> {
        self.related.get(field)
    }

    /// Takes the next raw value.
    pub fn next_value(&mut self) -> OrmResult<Value> {
        let slot = self.values.get_mut(self.cursor).ok_or_else(|| {
            OrmError::DatabaseError(format!(
                "record for '{}' has only {} values",
                self.meta.table_name(),
                self.cursor
            ))
        })?;
        self.cursor += 1;
        Ok(std::mem::replace(slot, Value::Null))
    }

    /// Takes the next value, converted to `T`.
    pub fn next<T: FromValue>(&mut self) -> OrmResult<T> {
        let name = self.meta.fields.get(self.cursor).map_or("?", |f| f.name);
        let value = self.next_value()?;
        T::from_value(&value).map_err(|e| {
            OrmError::DatabaseError(format!("{}.{name}: {e}", self.meta.table_name()))
        })
    }

    /// Takes the next value as a foreign key to `T`.
    ///
    /// Yields [`ForeignKey::Loaded`] when the relation was selected and the
    /// row had a related row, [`ForeignKey::Id`] otherwise.
    pub fn next_related<T: Model>(&mut self) -> OrmResult<ForeignKey<T>> {
        let name = self.meta.fields.get(self.cursor).map(|f| f.name);
        let id = self.next_value()?;
        if let Some(mut child) = name.and_then(|n| self.related.shift_remove(n)) {
            return Ok(ForeignKey::Loaded(Box::new(T::from_record(&mut child)?)));
        }
        Ok(ForeignKey::Id(id))
    }

    /// Like [`next_related`](Self::next_related) for nullable foreign keys.
    pub fn next_optional_related<T: Model>(&mut self) -> OrmResult<Option<ForeignKey<T>>> {
        let fk = self.next_related::<T>()?;
        Ok(match fk {
            ForeignKey::Id(Value::Null) => None,
            other => Some(other),
        })
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("table", &self.meta.table_name())
            .field("values", &self.values)
            .field("related", &self.related)
            .finish()
    }
}

/// The value of a foreign key field: either the raw id or the loaded instance.
#[derive(Debug, Clone, PartialEq)]
pub enum ForeignKey<T> {
    /// Only the referenced primary key is known.
    Id(Value),
    /// The referenced row was loaded with `select_related`.
    Loaded(Box<T>),
}

impl<T: Model> ForeignKey<T> {
    /// Returns the referenced primary key.
    pub fn id(&self) -> Value {
        match self {
            Self::Id(id) => id.clone(),
            Self::Loaded(instance) => instance.pk(),
        }
    }

    /// Returns the loaded instance, if the relation was selected.
    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Id(_) => None,
            Self::Loaded(instance) => Some(instance),
        }
    }

    /// Returns `true` if the related instance was loaded.
    pub const fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }
}

impl<T: Model> From<T> for ForeignKey<T> {
    fn from(instance: T) -> Self {
        Self::Loaded(Box::new(instance))
    }
}

impl<T: Model> From<&ForeignKey<T>> for Value {
    fn from(fk: &ForeignKey<T>) -> Self {
        fk.id()
    }
}
