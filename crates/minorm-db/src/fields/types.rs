//! Field type definitions for the ORM.
//!
//! Each [`FieldType`] variant determines a column's SQL type and how values
//! are coerced before they are bound. [`FieldDef`] captures everything about
//! a single model field: attribute name, column name, nullability, default,
//! and constraints.

use std::str::FromStr;

use minorm_core::{OrmError, OrmResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::model::ModelMeta;
use crate::query::compiler::DatabaseBackendType;
use crate::value::Value;

/// A lazy reference to another model's metadata.
///
/// Foreign keys point at their target through a function instead of a
/// direct reference so that models can refer to themselves or to models
/// declared later.
pub type ModelRef = fn() -> &'static ModelMeta;

/// The type of a model field, determining its SQL column type and behavior.
#[derive(Debug, Clone, Copy)]
pub enum FieldType {
    /// Auto-incrementing integer primary key.
    AutoField,
    /// Signed integer.
    IntegerField,
    /// Floating-point number.
    FloatField,
    /// Fixed-precision decimal number.
    DecimalField {
        /// Total number of significant digits.
        max_digits: u32,
        /// Digits after the decimal point.
        decimal_places: u32,
    },
    /// Boolean (true/false).
    BooleanField,
    /// Variable-length string, sized by [`FieldDef::max_length`].
    CharField,
    /// Unlimited-length text.
    TextField,
    /// Date without time.
    DateField,
    /// Date and time without timezone.
    DateTimeField,
    /// Many-to-one relationship holding the target's primary key.
    ForeignKey {
        /// The target model.
        to: ModelRef,
        /// Optional `ON DELETE` action rendered into the column declaration.
        on_delete: Option<OnDelete>,
    },
}

/// Behavior when a referenced row is deleted (`ON DELETE` action).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    /// Delete all referencing rows.
    Cascade,
    /// Refuse to delete while referencing rows exist.
    Restrict,
    /// Set the foreign key column to NULL.
    SetNull,
}

impl OnDelete {
    /// Returns the SQL keyword for this action.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::Restrict => "RESTRICT",
            Self::SetNull => "SET NULL",
        }
    }
}

/// Complete definition of a model field.
///
/// Built with [`FieldDef::new`] (or [`FieldDef::foreign_key`]) and the
/// chainable modifiers below, then handed to [`ModelMeta::new`].
///
/// ```
/// use minorm_db::fields::{FieldDef, FieldType};
///
/// let name = FieldDef::new("name", FieldType::CharField).max_length(255);
/// assert_eq!(name.column, "name");
/// assert!(!name.null);
/// ```
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// The Rust attribute name of this field, used in lookups.
    pub name: &'static str,
    /// The database column name (may differ from `name`).
    pub column: String,
    /// The type of this field.
    pub field_type: FieldType,
    /// Whether this field is the primary key.
    pub primary_key: bool,
    /// Whether NULL is allowed in the database.
    pub null: bool,
    /// Default value for the column and for unset values on insert.
    pub default: Option<Value>,
    /// Whether a UNIQUE constraint is applied.
    pub unique: bool,
    /// Maximum character length (for `CharField`).
    pub max_length: Option<usize>,
}

impl FieldDef {
    /// Creates a new `FieldDef` with sensible defaults.
    ///
    /// Only the field name and type are required. The column name defaults
    /// to the field name and the column is `NOT NULL`.
    pub fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            column: name.to_string(),
            field_type,
            primary_key: false,
            null: false,
            default: None,
            unique: false,
            max_length: None,
        }
    }

    /// Creates a foreign key field pointing at `to`.
    ///
    /// The column name defaults to `{name}_id`.
    pub fn foreign_key(name: &'static str, to: ModelRef) -> Self {
        Self::new(name, FieldType::ForeignKey { to, on_delete: None }).column(format!("{name}_id"))
    }

    /// Sets the database column name.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Marks this field as the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Allows NULL values in the database.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Sets the maximum character length.
    #[must_use]
    pub const fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Marks this field as having a UNIQUE constraint.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the default value for this field.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the `ON DELETE` action of a foreign key. Ignored for other field types.
    #[must_use]
    pub fn on_delete(mut self, action: OnDelete) -> Self {
        if let FieldType::ForeignKey { on_delete, .. } = &mut self.field_type {
            *on_delete = Some(action);
        }
        self
    }

    /// Returns `true` if this field is a foreign key.
    pub const fn is_relation(&self) -> bool {
        matches!(self.field_type, FieldType::ForeignKey { .. })
    }

    /// Returns `true` if the database generates this field's value.
    pub const fn is_auto(&self) -> bool {
        matches!(self.field_type, FieldType::AutoField)
    }

    /// Returns the metadata of the target model for foreign keys.
    pub fn related_model(&self) -> Option<&'static ModelMeta> {
        match self.field_type {
            FieldType::ForeignKey { to, .. } => Some(to()),
            _ => None,
        }
    }

    /// Returns the column reference qualified by a table name or alias.
    pub fn query_name(&self, table: &str) -> String {
        format!("{table}.{}", self.column)
    }

    /// Returns the value used for a missing attribute on insert.
    pub fn get_default(&self) -> Value {
        self.default.clone().unwrap_or(Value::Null)
    }

    /// Coerces a value into this field's storage type.
    ///
    /// `Null` always passes through; nullability is enforced by the database.
    /// Foreign keys store whatever the target's primary key stores.
    pub fn adapt(&self, value: Value) -> OrmResult<Value> {
        if value.is_null() {
            return Ok(value);
        }
        let adapted = match (self.field_type, value) {
            (FieldType::ForeignKey { to, .. }, value) => {
                return to().pk_field().adapt(value).map_err(|e| match e {
                    OrmError::SerializationError(detail) => self.conversion_error(&detail),
                    other => other,
                })
            }
            (FieldType::AutoField | FieldType::IntegerField, value) => match value {
                Value::Int(i) => Value::Int(i),
                Value::Bool(b) => Value::Int(i64::from(b)),
                Value::String(s) => Value::Int(s.trim().parse().map_err(|_| {
                    self.conversion_error(&format!("'{s}' is not an integer"))
                })?),
                other => return Err(self.conversion_error(&format!("cannot store {other:?}"))),
            },
            (FieldType::FloatField, value) => match value {
                Value::Float(f) => Value::Float(f),
                #[allow(clippy::cast_precision_loss)]
                Value::Int(i) => Value::Float(i as f64),
                Value::Decimal(d) => Value::Float(d.to_f64().ok_or_else(|| {
                    self.conversion_error(&format!("{d} does not fit a float"))
                })?),
                Value::String(s) => Value::Float(s.trim().parse().map_err(|_| {
                    self.conversion_error(&format!("'{s}' is not a number"))
                })?),
                other => return Err(self.conversion_error(&format!("cannot store {other:?}"))),
            },
            (
                FieldType::DecimalField {
                    max_digits,
                    decimal_places,
                },
                value,
            ) => Value::Decimal(self.to_decimal(value, max_digits, decimal_places)?),
            (FieldType::BooleanField, value) => match value {
                Value::Bool(b) => Value::Bool(b),
                Value::Int(i) => Value::Bool(i != 0),
                other => return Err(self.conversion_error(&format!("cannot store {other:?}"))),
            },
            (FieldType::CharField | FieldType::TextField, value) => match value {
                Value::String(s) => Value::String(s),
                Value::List(_) => {
                    return Err(self.conversion_error("cannot store a composite value"))
                }
                other => Value::String(other.to_string()),
            },
            (FieldType::DateField, value) => match value {
                Value::Date(d) => Value::Date(d),
                Value::DateTime(dt) => Value::Date(dt.date()),
                Value::String(s) => Value::Date(
                    chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                        .map_err(|e| self.conversion_error(&format!("'{s}': {e}")))?,
                ),
                other => return Err(self.conversion_error(&format!("cannot store {other:?}"))),
            },
            (FieldType::DateTimeField, value) => match value {
                Value::DateTime(dt) => Value::DateTime(dt),
                Value::Date(d) => Value::DateTime(d.and_time(chrono::NaiveTime::MIN)),
                Value::String(s) => Value::DateTime(parse_datetime(&s).ok_or_else(|| {
                    self.conversion_error(&format!("'{s}' is not a datetime"))
                })?),
                other => return Err(self.conversion_error(&format!("cannot store {other:?}"))),
            },
        };
        Ok(adapted)
    }

    /// Converts a lookup value into bind-ready parameters.
    ///
    /// Lists (from `__in` lookups) are adapted element by element.
    pub fn to_query_parameter(&self, value: Value) -> OrmResult<Value> {
        match value {
            Value::List(items) => Ok(Value::List(
                items
                    .into_iter()
                    .map(|item| self.adapt(item))
                    .collect::<OrmResult<_>>()?,
            )),
            other => self.adapt(other),
        }
    }

    /// Returns the SQL column type for this field.
    pub fn column_type(&self, backend: DatabaseBackendType) -> String {
        match self.field_type {
            FieldType::AutoField | FieldType::IntegerField => "INTEGER".to_string(),
            FieldType::FloatField => match backend {
                DatabaseBackendType::SQLite => "REAL".to_string(),
                DatabaseBackendType::PostgreSQL => "DOUBLE PRECISION".to_string(),
            },
            FieldType::DecimalField {
                max_digits,
                decimal_places,
            } => format!("DECIMAL({max_digits}, {decimal_places})"),
            FieldType::BooleanField => "BOOLEAN".to_string(),
            FieldType::CharField => format!("VARCHAR({})", self.max_length.unwrap_or(255)),
            FieldType::TextField => "TEXT".to_string(),
            FieldType::DateField => "DATE".to_string(),
            FieldType::DateTimeField => "TIMESTAMP".to_string(),
            FieldType::ForeignKey { to, on_delete } => {
                let target = to();
                let pk = target.pk_field();
                let mut sql = format!(
                    "{} REFERENCES {} ({})",
                    pk.column_type(backend),
                    target.table_name(),
                    pk.column
                );
                if let Some(action) = on_delete {
                    sql.push_str(" ON DELETE ");
                    sql.push_str(action.as_sql());
                }
                sql
            }
        }
    }

    /// Renders the column declaration used in `CREATE TABLE`.
    ///
    /// Auto primary keys use the dialect's declaration; other columns get
    /// `NOT NULL`, `UNIQUE`, `PRIMARY KEY`, and `DEFAULT` clauses as configured.
    pub fn to_sql_declaration(&self, backend: DatabaseBackendType) -> String {
        if self.primary_key && self.is_auto() {
            return format!("{} {}", self.column, backend.auto_field_declaration());
        }

        let mut parts = vec![format!("{} {}", self.column, self.column_type(backend))];
        if self.primary_key {
            parts.push("PRIMARY KEY".to_string());
        }
        if !self.null {
            parts.push("NOT NULL".to_string());
        }
        if self.unique {
            parts.push("UNIQUE".to_string());
        }
        match &self.default {
            Some(value) => parts.push(format!("DEFAULT {}", sql_literal(value))),
            None if self.null => parts.push("DEFAULT NULL".to_string()),
            None => {}
        }
        parts.join(" ")
    }

    /// Parses and rounds a value to `decimal_places`, rejecting values with
    /// more than `max_digits` significant digits.
    fn to_decimal(&self, value: Value, max_digits: u32, decimal_places: u32) -> OrmResult<Decimal> {
        let mut decimal = match value {
            Value::Decimal(d) => d,
            Value::Int(i) => Decimal::from(i),
            Value::Float(f) => Decimal::try_from(f)
                .map_err(|e| self.conversion_error(&format!("{f}: {e}")))?,
            Value::String(s) => Decimal::from_str(s.trim())
                .map_err(|_| self.conversion_error(&format!("'{s}' is not a decimal")))?,
            other => return Err(self.conversion_error(&format!("cannot store {other:?}"))),
        };
        decimal = decimal.round_dp(decimal_places);
        decimal.rescale(decimal_places);
        let digits = decimal.mantissa().unsigned_abs().to_string().len();
        if digits > max_digits as usize {
            return Err(self.conversion_error(&format!(
                "{decimal} has more than {max_digits} digits"
            )));
        }
        Ok(decimal)
    }

    fn conversion_error(&self, detail: &str) -> OrmError {
        OrmError::SerializationError(format!("field '{}': {detail}", self.name))
    }
}

fn parse_datetime(s: &str) -> Option<chrono::NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| chrono::NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Renders a value as an inline SQL literal for DDL defaults.
fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Decimal(d) => d.to_string(),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}
