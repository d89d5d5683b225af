//! QuerySet and Manager for building and executing database queries.
//!
//! A [`QuerySet`] accumulates a condition tree, an ordering, a limit, and a
//! [`RelationNode`] tree of the foreign keys it touches. Nothing runs until a
//! terminal method (`all`, `get`, `first`, `exists`, `count`, `update`,
//! `delete`, ...) is called with a [`DbExecutor`]. Every chainable method
//! takes `&self` and returns a new queryset, so a base queryset can be kept
//! and refined in several directions.
//!
//! Field names are validated eagerly: an unknown field or a path through a
//! non-foreign-key field fails in the chainable call, before any SQL is sent.
//!
//! The projection is part of the type. `QuerySet<M>` yields model instances;
//! [`values`](QuerySet::values) switches to `QuerySet<M, AsValues>`, which
//! yields [`ValuesRow`] maps keyed by the requested paths.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Bound, RangeBounds};

use indexmap::IndexMap;
use minorm_core::{OrmError, OrmResult};

use super::compiler::{DatabaseBackendType, DeleteQuery, InsertQuery, Row, SelectQuery, UpdateQuery};
use super::expressions::{OrderByExpression, WhereCondition};
use super::lookups::{for_lookup, resolve_lookup, LOOKUP_SEP};
use super::relations::RelationNode;
use crate::executor::{insert_columns, insert_model, DbExecutor};
use crate::fields::FieldDef;
use crate::model::{Model, ModelMeta};
use crate::transactions::atomic;
use crate::value::Value;

/// One row of a `values()` query, keyed by the requested field paths.
pub type ValuesRow = IndexMap<String, Value>;

/// Decides which columns a queryset selects and what each row becomes.
pub trait Projection<M: Model>: 'static {
    /// The item produced per row.
    type Output;

    /// Returns the qualified columns to select.
    fn columns(related: &RelationNode, mapping: &IndexMap<String, String>) -> Vec<String>;

    /// Decodes one result row.
    fn decode(
        related: &RelationNode,
        mapping: &IndexMap<String, String>,
        row: Row,
    ) -> OrmResult<Self::Output>;
}

/// Rows become model instances, with selected relations loaded.
#[derive(Debug, Clone, Copy)]
pub struct AsInstances;

/// Rows become [`ValuesRow`] maps.
#[derive(Debug, Clone, Copy)]
pub struct AsValues;

impl<M: Model> Projection<M> for AsInstances {
    type Output = M;

    fn columns(related: &RelationNode, _mapping: &IndexMap<String, String>) -> Vec<String> {
        related.get_column_names()
    }

    fn decode(
        related: &RelationNode,
        _mapping: &IndexMap<String, String>,
        row: Row,
    ) -> OrmResult<M> {
        let (mut record, _) = related.row_to_instance(&row.into_values(), 0)?;
        M::from_record(&mut record)
    }
}

impl<M: Model> Projection<M> for AsValues {
    type Output = ValuesRow;

    fn columns(_related: &RelationNode, mapping: &IndexMap<String, String>) -> Vec<String> {
        mapping.values().cloned().collect()
    }

    fn decode(
        _related: &RelationNode,
        mapping: &IndexMap<String, String>,
        row: Row,
    ) -> OrmResult<ValuesRow> {
        Ok(mapping.keys().cloned().zip(row.into_values()).collect())
    }
}

/// The entry point for model-level query operations.
///
/// The `Manager` holds no query state; it creates fresh querysets. Obtain
/// one with [`Model::objects`].
pub struct Manager<M: Model> {
    _phantom: PhantomData<fn() -> M>,
}

impl<M: Model> Default for Manager<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> fmt::Debug for Manager<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("model", &M::table_name())
            .finish()
    }
}

impl<M: Model> Manager<M> {
    /// Creates a new manager.
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }

    /// Returns a queryset over every row.
    pub fn all(&self) -> QuerySet<M> {
        QuerySet::new()
    }

    /// Returns a queryset filtered by keyword lookups.
    pub fn filter<I, K, V>(&self, lookups: I) -> OrmResult<QuerySet<M>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.all().filter(lookups)
    }

    /// Fetches the single instance matching the lookups.
    pub fn get<I, K, V>(&self, db: &dyn DbExecutor, lookups: I) -> OrmResult<M>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.all().get(db, lookups)
    }

    /// Inserts an instance and returns it with its primary key set.
    pub fn create(&self, db: &dyn DbExecutor, instance: M) -> OrmResult<M> {
        self.all().create(db, instance)
    }

    /// Inserts every instance of `M` among `instances` in one statement.
    pub fn bulk_create(&self, db: &dyn DbExecutor, instances: &[&dyn Any]) -> OrmResult<u64> {
        self.all().bulk_create(db, instances)
    }

    /// Counts every row.
    pub fn count(&self, db: &dyn DbExecutor) -> OrmResult<u64> {
        self.all().count(db)
    }
}

/// A lazy, composable database query over model `M`.
pub struct QuerySet<M: Model, P: Projection<M> = AsInstances> {
    related: RelationNode,
    where_clause: Option<WhereCondition>,
    order_by: Vec<OrderByExpression>,
    limit: Option<usize>,
    values_mapping: IndexMap<String, String>,
    /// Set once a lookup resolved through a join.
    joined_filter: bool,
    _marker: PhantomData<fn() -> (M, P)>,
}

impl<M: Model, P: Projection<M>> Clone for QuerySet<M, P> {
    fn clone(&self) -> Self {
        Self {
            related: self.related.clone(),
            where_clause: self.where_clause.clone(),
            order_by: self.order_by.clone(),
            limit: self.limit,
            values_mapping: self.values_mapping.clone(),
            joined_filter: self.joined_filter,
            _marker: PhantomData,
        }
    }
}

impl<M: Model, P: Projection<M>> fmt::Debug for QuerySet<M, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySet")
            .field("model", &M::table_name())
            .field("query", &self.query().render_template())
            .finish()
    }
}

impl<M: Model> Default for QuerySet<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> QuerySet<M> {
    /// Creates a queryset over every row of `M`.
    pub fn new() -> Self {
        Self {
            related: RelationNode::root(M::meta()),
            where_clause: None,
            order_by: Vec::new(),
            limit: None,
            values_mapping: IndexMap::new(),
            joined_filter: false,
            _marker: PhantomData,
        }
    }
}

impl<M: Model, P: Projection<M>> QuerySet<M, P> {
    fn cast<Q: Projection<M>>(self) -> QuerySet<M, Q> {
        QuerySet {
            related: self.related,
            where_clause: self.where_clause,
            order_by: self.order_by,
            limit: self.limit,
            values_mapping: self.values_mapping,
            joined_filter: self.joined_filter,
            _marker: PhantomData,
        }
    }

    /// Resolves `relation__...__field` to its qualified column, interning the
    /// relation path. Returns whether the path went through a join.
    fn resolve_field(&mut self, path: &str) -> OrmResult<(String, &'static FieldDef, bool)> {
        let (relation, name) = path.rsplit_once(LOOKUP_SEP).unwrap_or(("", path));
        let node = self.related.resolve(relation, false)?;
        let meta: &'static ModelMeta = node.meta();
        let field = meta.check_field(name)?;
        Ok((field.query_name(&node.alias()), field, !relation.is_empty()))
    }

    fn lookup_condition<I, K, V>(&mut self, lookups: I) -> OrmResult<Option<WhereCondition>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut combined: Option<WhereCondition> = None;
        for (key, value) in lookups {
            let (path, lookup) = resolve_lookup(key.as_ref());
            let (column, field, joined) = self.resolve_field(path)?;
            self.joined_filter |= joined;
            let cond = for_lookup(column, lookup, field.to_query_parameter(value.into())?);
            combined = Some(match combined {
                Some(previous) => previous.and(cond),
                None => cond,
            });
        }
        Ok(combined)
    }

    fn combine(&mut self, cond: Option<WhereCondition>, or: bool) {
        let Some(cond) = cond else {
            return;
        };
        self.where_clause = Some(match self.where_clause.take() {
            None => cond,
            Some(existing) if or => existing.or(cond),
            Some(existing) => existing.and(cond),
        });
    }

    // ── Chainable methods ────────────────────────────────────────────

    /// Returns a queryset narrowed by keyword lookups, AND-ed together and
    /// with the existing condition.
    ///
    /// Keys are field paths with an optional lookup suffix, such as
    /// `age__gte` or `author__name__startswith`.
    pub fn filter<I, K, V>(&self, lookups: I) -> OrmResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut qs = self.clone();
        let cond = qs.lookup_condition(lookups)?;
        qs.combine(cond, false);
        Ok(qs)
    }

    /// Returns a queryset widened by keyword lookups: they are AND-ed
    /// together and OR-ed with the existing condition.
    pub fn aswell<I, K, V>(&self, lookups: I) -> OrmResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut qs = self.clone();
        let cond = qs.lookup_condition(lookups)?;
        qs.combine(cond, true);
        Ok(qs)
    }

    /// AND-s a prebuilt condition onto the queryset.
    #[must_use]
    pub fn filter_where(&self, cond: WhereCondition) -> Self {
        let mut qs = self.clone();
        qs.combine(Some(cond), false);
        qs
    }

    /// OR-s a prebuilt condition onto the queryset.
    #[must_use]
    pub fn aswell_where(&self, cond: WhereCondition) -> Self {
        let mut qs = self.clone();
        qs.combine(Some(cond), true);
        qs
    }

    /// Negates the whole condition. A queryset without a condition is unchanged.
    #[must_use]
    pub fn negate(&self) -> Self {
        let mut qs = self.clone();
        qs.where_clause = qs.where_clause.map(WhereCondition::negate);
        qs
    }

    /// Appends ordering entries; a leading `-` sorts descending.
    ///
    /// Entries already present are skipped, so the first occurrence keeps
    /// its place.
    pub fn order_by(&self, fields: &[&str]) -> OrmResult<Self> {
        let mut qs = self.clone();
        for name in fields {
            let (path, direction) = OrderByExpression::split_direction(name);
            let (column, _, _) = qs.resolve_field(path)?;
            let order = OrderByExpression::new(column, direction);
            if !qs.order_by.contains(&order) {
                qs.order_by.push(order);
            }
        }
        Ok(qs)
    }

    /// Loads the related instances along each foreign key path in the same query.
    pub fn select_related(&self, paths: &[&str]) -> OrmResult<Self> {
        let mut qs = self.clone();
        for path in paths {
            qs.related.resolve(path, true)?;
        }
        Ok(qs)
    }

    /// Stops loading related instances. Joins needed by filters stay.
    #[must_use]
    pub fn clear_select_related(&self) -> Self {
        let mut qs = self.clone();
        qs.related.clear_selection();
        qs
    }

    /// Switches to mapping rows, one entry per path.
    ///
    /// Paths may cross foreign keys (`author__name`). Called with no paths on
    /// a queryset that has none yet, every field of `M` is projected.
    pub fn values(&self, paths: &[&str]) -> OrmResult<QuerySet<M, AsValues>> {
        let mut qs = self.clone();
        if paths.is_empty() && qs.values_mapping.is_empty() {
            let meta = M::meta();
            for field in &meta.fields {
                qs.values_mapping
                    .insert(field.name.to_string(), field.query_name(meta.table_name()));
            }
        }
        for path in paths {
            let (column, _, _) = qs.resolve_field(path)?;
            qs.values_mapping.insert((*path).to_string(), column);
        }
        Ok(qs.cast())
    }

    /// Switches back to model instances.
    pub fn instances(&self) -> QuerySet<M> {
        let mut qs = self.clone();
        qs.values_mapping.clear();
        qs.cast()
    }

    /// Caps the number of rows.
    #[must_use]
    pub fn limit(&self, n: usize) -> Self {
        let mut qs = self.clone();
        qs.limit = Some(n);
        qs
    }

    /// Caps the number of rows at the end of `range`. The start is ignored.
    #[must_use]
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Self {
        let mut qs = self.clone();
        match range.end_bound() {
            Bound::Included(end) => qs.limit = Some(end + 1),
            Bound::Excluded(end) => qs.limit = Some(*end),
            Bound::Unbounded => {}
        }
        qs
    }

    // ── Rendering ────────────────────────────────────────────────────

    /// Builds the `SELECT` this queryset runs.
    pub fn query(&self) -> SelectQuery {
        let mut query = SelectQuery::new(
            M::table_name(),
            P::columns(&self.related, &self.values_mapping),
        );
        query.joins = self.related.get_joins();
        query.where_clause.clone_from(&self.where_clause);
        query.order_by.clone_from(&self.order_by);
        query.limit = self.limit;
        query
    }

    /// Returns the SQL and parameters for a dialect without executing anything.
    pub fn to_sql(&self, backend: DatabaseBackendType) -> (String, Vec<Value>) {
        let query = self.query();
        (query.render_sql(backend), query.params())
    }

    // ── Terminal methods ─────────────────────────────────────────────

    fn decode(&self, row: Row) -> OrmResult<P::Output> {
        P::decode(&self.related, &self.values_mapping, row)
    }

    /// Runs the query and materializes every row.
    pub fn all(&self, db: &dyn DbExecutor) -> OrmResult<Vec<P::Output>> {
        let query = self.query();
        let sql = query.render_sql(db.backend_type());
        db.query(&sql, &query.params())?
            .into_iter()
            .map(|row| self.decode(row))
            .collect()
    }

    /// Same as [`all`](Self::all).
    pub fn fetch(&self, db: &dyn DbExecutor) -> OrmResult<Vec<P::Output>> {
        self.all(db)
    }

    /// Runs the query and hands each item to `f` as its row arrives.
    pub fn for_each<F>(&self, db: &dyn DbExecutor, mut f: F) -> OrmResult<()>
    where
        F: FnMut(P::Output) -> OrmResult<()>,
    {
        let query = self.query();
        let sql = query.render_sql(db.backend_type());
        db.query_each(&sql, &query.params(), &mut |row| {
            f(self.decode(row)?)?;
            Ok(true)
        })
    }

    /// Fetches the single item matching the lookups and the current condition.
    ///
    /// The item follows the projection: after [`values`](Self::values) it is
    /// a [`ValuesRow`]. Call [`instances`](Self::instances) first to get a
    /// model instance instead.
    pub fn get<I, K, V>(&self, db: &dyn DbExecutor, lookups: I) -> OrmResult<P::Output>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let qs = self.filter(lookups)?.limit(2);
        let mut results = qs.all(db)?.into_iter();
        match (results.next(), results.next()) {
            (Some(item), None) => Ok(item),
            (None, _) => Err(OrmError::DoesNotExist(format!(
                "{} matching query does not exist.",
                M::table_name()
            ))),
            (Some(_), Some(_)) => Err(OrmError::MultipleResultsFound(format!(
                "get() returned more than one {}.",
                M::table_name()
            ))),
        }
    }

    /// Returns the first item, or `None` when nothing matches.
    ///
    /// Like [`get`](Self::get), the item follows the projection.
    pub fn first(&self, db: &dyn DbExecutor) -> OrmResult<Option<P::Output>> {
        Ok(self.limit(1).all(db)?.into_iter().next())
    }

    /// Returns the item at `index`; negative indices count from the end.
    pub fn at(&self, db: &dyn DbExecutor, index: isize) -> OrmResult<P::Output> {
        let items = self.all(db)?;
        let len = items.len();
        let position = if index < 0 {
            len.checked_sub(index.unsigned_abs())
        } else {
            Some(index.unsigned_abs())
        };
        position
            .filter(|&p| p < len)
            .and_then(|p| items.into_iter().nth(p))
            .ok_or(OrmError::IndexOutOfRange)
    }

    /// Returns `true` if any row matches. Only the primary key is selected.
    pub fn exists(&self, db: &dyn DbExecutor) -> OrmResult<bool> {
        let meta = M::meta();
        let mut query = self.query();
        query.columns = vec![meta.pk_field().query_name(meta.table_name())];
        query.order_by.clear();
        query.limit = Some(1);
        let rows = db.query(&query.render_sql(db.backend_type()), &query.params())?;
        Ok(!rows.is_empty())
    }

    /// Counts the matching rows, capped by the limit.
    pub fn count(&self, db: &dyn DbExecutor) -> OrmResult<u64> {
        let mut query = self.query();
        query.columns = vec!["COUNT(*)".to_string()];
        query.order_by.clear();
        query.limit = None;
        let rows = db.query(&query.render_sql(db.backend_type()), &query.params())?;
        let count = match rows.first() {
            Some(row) => row.get_by_index::<i64>(0)?,
            None => 0,
        };
        let count = u64::try_from(count).unwrap_or(0);
        Ok(self.limit.map_or(count, |limit| {
            count.min(u64::try_from(limit).unwrap_or(u64::MAX))
        }))
    }

    fn reject_joined_filter(&self, action: &str) -> OrmResult<()> {
        if self.joined_filter {
            return Err(OrmError::InvalidRelation(format!(
                "{action}() cannot filter on related models"
            )));
        }
        Ok(())
    }

    /// Sets fields on every matching row and returns the number updated.
    ///
    /// Conditions that reach through a foreign key are rejected.
    pub fn update<I, K, V>(&self, db: &dyn DbExecutor, fields: I) -> OrmResult<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.reject_joined_filter("update")?;
        let meta = M::meta();
        let assignments = fields
            .into_iter()
            .map(|(name, value)| {
                let field = meta.check_field(name.as_ref())?;
                Ok((field.column.clone(), field.adapt(value.into())?))
            })
            .collect::<OrmResult<Vec<_>>>()?;
        if assignments.is_empty() {
            return Ok(0);
        }
        let mut query = UpdateQuery::new(M::table_name(), assignments);
        query.where_clause.clone_from(&self.where_clause);
        db.execute_sql(&query.render_sql(db.backend_type()), &query.params())
    }

    /// Deletes every matching row and returns the number deleted.
    ///
    /// Conditions that reach through a foreign key are rejected.
    pub fn delete(&self, db: &dyn DbExecutor) -> OrmResult<u64> {
        self.reject_joined_filter("delete")?;
        let mut query = DeleteQuery::new(M::table_name());
        query.where_clause.clone_from(&self.where_clause);
        db.execute_sql(&query.render_sql(db.backend_type()), &query.params())
    }

    /// Inserts an instance and returns it with its primary key set.
    pub fn create(&self, db: &dyn DbExecutor, mut instance: M) -> OrmResult<M> {
        insert_model(&mut instance, db)?;
        Ok(instance)
    }

    /// Inserts every instance of `M` among `instances` with multi-row
    /// `INSERT`s and returns the number of rows inserted. Values of other
    /// types are skipped.
    ///
    /// Rows are split into statements that stay under the dialect's
    /// placeholder limit. When more than one statement is needed they run in
    /// a single transaction, unless one is already open.
    pub fn bulk_create(&self, db: &dyn DbExecutor, instances: &[&dyn Any]) -> OrmResult<u64> {
        let mut columns: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        for instance in instances.iter().filter_map(|i| i.downcast_ref::<M>()) {
            let (names, values): (Vec<String>, Vec<Value>) =
                insert_columns(instance)?.into_iter().unzip();
            columns.get_or_insert(names);
            rows.push(values);
        }
        let Some(columns) = columns else {
            return Ok(0);
        };

        let backend = db.backend_type();
        if columns.is_empty() {
            let sql = InsertQuery::new(M::table_name(), columns, Vec::new()).render_sql(backend);
            return db.execute_many(&sql, &vec![Vec::new(); rows.len()]);
        }
        let per_statement = (backend.max_query_params() / columns.len()).max(1);
        if rows.len() <= per_statement || db.in_transaction() {
            return insert_batches::<M>(db, &columns, rows, per_statement);
        }
        atomic(db, |txn| {
            insert_batches::<M>(txn.executor(), &columns, rows, per_statement)
        })
    }
}

fn insert_batches<M: Model>(
    db: &dyn DbExecutor,
    columns: &[String],
    rows: Vec<Vec<Value>>,
    per_statement: usize,
) -> OrmResult<u64> {
    let backend = db.backend_type();
    let mut rows = rows.into_iter().peekable();
    let mut inserted = 0;
    while rows.peek().is_some() {
        let batch: Vec<_> = rows.by_ref().take(per_statement).collect();
        let query = InsertQuery::many(M::table_name(), columns.to_vec(), batch);
        inserted += db.execute_sql(&query.render_sql(backend), &query.params())?;
    }
    Ok(inserted)
}
