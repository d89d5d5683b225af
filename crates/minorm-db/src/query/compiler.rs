//! SQL statement builders and result rows.
//!
//! The builders in this module are plain data: a table, its columns, joins,
//! a [`WhereCondition`], ordering, and a limit. Each renders once to a
//! dialect-neutral template in which every bound value is a `{0}` hole, and
//! [`DatabaseBackendType::fill_placeholders`] then substitutes the dialect's
//! placeholder token across the whole statement.
//!
//! ```
//! use minorm_db::query::compiler::{DatabaseBackendType, SelectQuery};
//! use minorm_db::query::expressions::{Operator, WhereCondition};
//!
//! let mut query = SelectQuery::new("person", vec!["person.id".into(), "person.name".into()]);
//! query.where_clause = Some(WhereCondition::new("person.age", Operator::Gte, 6));
//! query.limit = Some(2);
//!
//! assert_eq!(
//!     query.render_sql(DatabaseBackendType::PostgreSQL),
//!     "SELECT person.id, person.name FROM person WHERE person.age >= $1 LIMIT 2;"
//! );
//! ```

use minorm_core::{OrmError, OrmResult};

use super::expressions::{JoinExpression, OrderByExpression, WhereCondition, HOLE};
use crate::value::Value;

/// The SQL dialect a statement is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    /// PostgreSQL (uses `$1, $2, ...` placeholders).
    PostgreSQL,
    /// SQLite (uses `?` placeholders).
    SQLite,
}

impl DatabaseBackendType {
    /// Returns the placeholder token for the given 1-based parameter index.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::PostgreSQL => format!("${index}"),
            Self::SQLite => "?".to_string(),
        }
    }

    /// Replaces every `{0}` hole in a template with this dialect's placeholders,
    /// numbered left to right.
    pub fn fill_placeholders(self, template: &str) -> String {
        let mut parts = template.split(HOLE);
        let mut sql = String::with_capacity(template.len());
        if let Some(head) = parts.next() {
            sql.push_str(head);
        }
        for (i, part) in parts.enumerate() {
            sql.push_str(&self.placeholder(i + 1));
            sql.push_str(part);
        }
        sql
    }

    /// Returns the column declaration suffix of an auto-increment primary key.
    pub const fn auto_field_declaration(self) -> &'static str {
        match self {
            Self::PostgreSQL => "SERIAL PRIMARY KEY",
            Self::SQLite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        }
    }

    /// Returns the most placeholders one statement may bind.
    pub const fn max_query_params(self) -> usize {
        match self {
            Self::PostgreSQL => 65_535,
            Self::SQLite => 32_766,
        }
    }

    /// Returns the dialect name used in logs and spans.
    pub const fn vendor(self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgresql",
            Self::SQLite => "sqlite",
        }
    }
}

// ── Rows ────────────────────────────────────────────────────────────

/// A single row returned from a database query.
///
/// `Row` holds a list of column names and their corresponding values. It
/// provides typed access via the [`get`](Row::get) method.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row from column names and values.
    ///
    /// # Panics
    ///
    /// Panics if the number of columns does not match the number of values.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "Row column count must match value count"
        );
        Self { columns, values }
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row, returning its values in column order.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Gets a typed value by column name.
    pub fn get<T: FromValue>(&self, column: &str) -> OrmResult<T> {
        let value = self.get_value(column).ok_or_else(|| {
            OrmError::DatabaseError(format!("Column '{column}' not found in row"))
        })?;
        T::from_value(value)
    }

    /// Gets a typed value by column index.
    pub fn get_by_index<T: FromValue>(&self, idx: usize) -> OrmResult<T> {
        let value = self.values.get(idx).ok_or_else(|| {
            OrmError::DatabaseError(format!(
                "Column index {idx} out of bounds (row has {} columns)",
                self.values.len()
            ))
        })?;
        T::from_value(value)
    }

    /// Returns a reference to the raw value at the given column name.
    pub fn get_value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }
}

/// Conversion from a [`Value`] cell into a concrete Rust type.
pub trait FromValue: Sized {
    /// Attempts to convert a value reference to this type.
    fn from_value(value: &Value) -> OrmResult<Self>;
}

fn mismatch(expected: &str, value: &Value) -> OrmError {
    OrmError::DatabaseError(format!("Expected {expected}, got {value:?}"))
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Int(i) => Ok(*i),
            _ => Err(mismatch("Int", value)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Int(i) => Self::try_from(*i).map_err(|e| {
                OrmError::DatabaseError(format!("Int value out of i32 range: {e}"))
            }),
            _ => Err(mismatch("Int", value)),
        }
    }
}

impl FromValue for f64 {
    #[allow(clippy::cast_precision_loss)]
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as Self),
            _ => Err(mismatch("Float", value)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            // SQLite stores booleans as integers.
            Value::Int(i) => Ok(*i != 0),
            _ => Err(mismatch("Bool", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::String(s) => Ok(s.clone()),
            _ => Err(mismatch("String", value)),
        }
    }
}

impl FromValue for rust_decimal::Decimal {
    fn from_value(value: &Value) -> OrmResult<Self> {
        let parse = |s: &str| {
            s.parse::<Self>()
                .map_err(|e| OrmError::DatabaseError(format!("Invalid decimal '{s}': {e}")))
        };
        match value {
            Value::Decimal(d) => Ok(*d),
            Value::Int(i) => Ok(Self::from(*i)),
            // SQLite hands DECIMAL columns back as REAL; the shortest float
            // rendering recovers the stored digits.
            Value::Float(f) => parse(&f.to_string()),
            Value::String(s) => parse(s),
            _ => Err(mismatch("Decimal", value)),
        }
    }
}

impl FromValue for chrono::NaiveDate {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Date(d) => Ok(*d),
            Value::String(s) => Self::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| OrmError::DatabaseError(format!("Invalid date '{s}': {e}"))),
            _ => Err(mismatch("Date", value)),
        }
    }
}

impl FromValue for chrono::NaiveDateTime {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::DateTime(dt) => Ok(*dt),
            Value::String(s) => ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| Self::parse_from_str(s, fmt).ok())
                .ok_or_else(|| OrmError::DatabaseError(format!("Invalid datetime '{s}'"))),
            _ => Err(mismatch("DateTime", value)),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> OrmResult<Self> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> OrmResult<Self> {
        match value {
            Value::Null => Ok(None),
            _ => T::from_value(value).map(Some),
        }
    }
}

// ── Statement builders ──────────────────────────────────────────────

fn push_where(sql: &mut String, where_clause: Option<&WhereCondition>) {
    if let Some(cond) = where_clause {
        sql.push_str(" WHERE ");
        sql.push_str(&cond.to_string());
    }
}

/// A `SELECT` over a table, its joins, a condition, ordering, and a limit.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    /// The base table.
    pub table: String,
    /// Qualified column references (or expressions such as `COUNT(*)`).
    pub columns: Vec<String>,
    /// Joined tables in render order.
    pub joins: Vec<JoinExpression>,
    /// The `WHERE` condition, if any.
    pub where_clause: Option<WhereCondition>,
    /// `ORDER BY` entries in render order.
    pub order_by: Vec<OrderByExpression>,
    /// The `LIMIT`, if any.
    pub limit: Option<usize>,
}

impl SelectQuery {
    /// Creates a `SELECT columns FROM table` statement.
    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table: table.into(),
            columns,
            joins: Vec::new(),
            where_clause: None,
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Renders the statement with `{0}` holes.
    pub fn render_template(&self) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.columns.join(", "), self.table);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.to_string());
        }
        push_where(&mut sql, self.where_clause.as_ref());
        if !self.order_by.is_empty() {
            let order: Vec<String> = self.order_by.iter().map(ToString::to_string).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        sql.push(';');
        sql
    }

    /// Returns the bound values in placeholder order.
    pub fn params(&self) -> Vec<Value> {
        self.where_clause
            .as_ref()
            .map(WhereCondition::values)
            .unwrap_or_default()
    }

    /// Renders the statement for a dialect.
    pub fn render_sql(&self, backend: DatabaseBackendType) -> String {
        backend.fill_placeholders(&self.render_template())
    }
}

/// An `INSERT` of one or more rows.
///
/// With no columns the statement inserts a single row of defaults.
#[derive(Debug, Clone)]
pub struct InsertQuery {
    /// The target table.
    pub table: String,
    /// Column names, unqualified.
    pub columns: Vec<String>,
    /// One value list per row, aligned with `columns`.
    pub rows: Vec<Vec<Value>>,
}

impl InsertQuery {
    /// Creates a single-row insert.
    pub fn new(table: impl Into<String>, columns: Vec<String>, values: Vec<Value>) -> Self {
        Self {
            table: table.into(),
            columns,
            rows: vec![values],
        }
    }

    /// Creates a multi-row insert sharing one column list.
    pub fn many(table: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            table: table.into(),
            columns,
            rows,
        }
    }

    /// Renders the statement with `{0}` holes.
    pub fn render_template(&self) -> String {
        if self.columns.is_empty() {
            return format!("INSERT INTO {} DEFAULT VALUES;", self.table);
        }
        let holes = vec![HOLE; self.columns.len()].join(", ");
        let rows = vec![format!("({holes})"); self.rows.len().max(1)].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES {rows};",
            self.table,
            self.columns.join(", ")
        )
    }

    /// Returns the bound values row by row.
    pub fn params(&self) -> Vec<Value> {
        if self.columns.is_empty() {
            return Vec::new();
        }
        self.rows.iter().flatten().cloned().collect()
    }

    /// Renders the statement for a dialect.
    pub fn render_sql(&self, backend: DatabaseBackendType) -> String {
        backend.fill_placeholders(&self.render_template())
    }
}

/// An `UPDATE` of the base table.
#[derive(Debug, Clone)]
pub struct UpdateQuery {
    /// The target table.
    pub table: String,
    /// `column = value` assignments, columns unqualified.
    pub assignments: Vec<(String, Value)>,
    /// The `WHERE` condition, if any.
    pub where_clause: Option<WhereCondition>,
}

impl UpdateQuery {
    /// Creates an update with no condition.
    pub fn new(table: impl Into<String>, assignments: Vec<(String, Value)>) -> Self {
        Self {
            table: table.into(),
            assignments,
            where_clause: None,
        }
    }

    /// Renders the statement with `{0}` holes.
    pub fn render_template(&self) -> String {
        let sets: Vec<String> = self
            .assignments
            .iter()
            .map(|(column, _)| format!("{column} = {HOLE}"))
            .collect();
        let mut sql = format!("UPDATE {} SET {}", self.table, sets.join(", "));
        push_where(&mut sql, self.where_clause.as_ref());
        sql.push(';');
        sql
    }

    /// Returns the assigned values followed by the condition's values.
    pub fn params(&self) -> Vec<Value> {
        let mut params: Vec<Value> = self.assignments.iter().map(|(_, v)| v.clone()).collect();
        if let Some(cond) = &self.where_clause {
            params.extend(cond.values());
        }
        params
    }

    /// Renders the statement for a dialect.
    pub fn render_sql(&self, backend: DatabaseBackendType) -> String {
        backend.fill_placeholders(&self.render_template())
    }
}

/// A `DELETE` from the base table.
#[derive(Debug, Clone)]
pub struct DeleteQuery {
    /// The target table.
    pub table: String,
    /// The `WHERE` condition, if any.
    pub where_clause: Option<WhereCondition>,
}

impl DeleteQuery {
    /// Creates an unconditional delete.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            where_clause: None,
        }
    }

    /// Renders the statement with `{0}` holes.
    pub fn render_template(&self) -> String {
        let mut sql = format!("DELETE FROM {}", self.table);
        push_where(&mut sql, self.where_clause.as_ref());
        sql.push(';');
        sql
    }

    /// Returns the condition's values.
    pub fn params(&self) -> Vec<Value> {
        self.where_clause
            .as_ref()
            .map(WhereCondition::values)
            .unwrap_or_default()
    }

    /// Renders the statement for a dialect.
    pub fn render_sql(&self, backend: DatabaseBackendType) -> String {
        backend.fill_placeholders(&self.render_template())
    }
}

/// `CREATE TABLE` from rendered column declarations.
#[derive(Debug, Clone)]
pub struct CreateTableQuery {
    /// The table to create.
    pub table: String,
    /// Column declarations such as `age INTEGER NOT NULL`.
    pub declarations: Vec<String>,
    /// Render `IF NOT EXISTS`.
    pub if_not_exists: bool,
}

impl CreateTableQuery {
    /// Creates the statement.
    pub fn new(table: impl Into<String>, declarations: Vec<String>) -> Self {
        Self {
            table: table.into(),
            declarations,
            if_not_exists: false,
        }
    }

    /// Renders the statement. DDL binds no parameters.
    pub fn render_sql(&self) -> String {
        format!(
            "CREATE TABLE {}{} ({});",
            if self.if_not_exists { "IF NOT EXISTS " } else { "" },
            self.table,
            self.declarations.join(", ")
        )
    }
}

/// `DROP TABLE`.
#[derive(Debug, Clone)]
pub struct DropTableQuery {
    /// The table to drop.
    pub table: String,
    /// Render `IF EXISTS`.
    pub if_exists: bool,
}

impl DropTableQuery {
    /// Creates the statement.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            if_exists: false,
        }
    }

    /// Renders the statement. DDL binds no parameters.
    pub fn render_sql(&self) -> String {
        format!(
            "DROP TABLE {}{};",
            if self.if_exists { "IF EXISTS " } else { "" },
            self.table
        )
    }
}
