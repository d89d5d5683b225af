//! Condition, ordering, and join expressions.
//!
//! A [`WhereCondition`] is a chain of predicates linked by `AND`/`OR`, with an
//! optional `NOT` over the whole chain. Its [`Display`](fmt::Display) output
//! is a SQL template where every bound value appears as a `{0}` hole, and
//! [`values`](WhereCondition::values) returns the bound values in exactly the
//! order the holes appear.
//!
//! ```
//! use minorm_db::query::expressions::{Operator, WhereCondition};
//! use minorm_db::value::Value;
//!
//! let cond = WhereCondition::new("person.name", Operator::Eq, "x")
//!     .and(WhereCondition::new("person.age", Operator::Gt, 2))
//!     .negate();
//! assert_eq!(cond.to_string(), "NOT (person.name = {0} AND person.age > {0})");
//! assert_eq!(cond.values(), vec![Value::from("x"), Value::from(2)]);
//! ```

use std::fmt;

use crate::value::Value;

/// The placeholder hole written into rendered templates.
pub const HOLE: &str = "{0}";

/// A comparison operator of a single predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=` (`IS NULL` against a NULL value).
    Eq,
    /// `!=` (`IS NOT NULL` against a NULL value).
    Neq,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `IN (...)`, one hole per list element.
    In,
    /// `LIKE`
    Like,
}

impl Operator {
    /// Returns the SQL spelling of this operator.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::In => "IN",
            Self::Like => "LIKE",
        }
    }
}

/// How a condition is linked to the next one in its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// `AND`
    And,
    /// `OR`
    Or,
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::And => "AND",
            Self::Or => "OR",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Compare {
        field: String,
        op: Operator,
        value: Value,
    },
    Columns {
        left: String,
        right: String,
    },
    Group(Box<WhereCondition>),
}

impl Predicate {
    fn binds_nothing(op: Operator, value: &Value) -> bool {
        value.is_null() && matches!(op, Operator::Eq | Operator::Neq)
    }

    fn collect_values(&self, out: &mut Vec<Value>) {
        match self {
            Self::Compare { op, value, .. } => match value {
                Value::List(items) if *op == Operator::In => out.extend(items.iter().cloned()),
                value if Self::binds_nothing(*op, value) => {}
                value => out.push(value.clone()),
            },
            Self::Columns { .. } => {}
            Self::Group(inner) => inner.collect_values(out),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { field, op, value } => match (op, value) {
                (Operator::In, Value::List(items)) if items.is_empty() => {
                    write!(f, "{field} IN (NULL)")
                }
                (Operator::In, Value::List(items)) => {
                    let holes = vec![HOLE; items.len()].join(", ");
                    write!(f, "{field} IN ({holes})")
                }
                (Operator::In, _) => write!(f, "{field} IN ({HOLE})"),
                (Operator::Eq, Value::Null) => write!(f, "{field} IS NULL"),
                (Operator::Neq, Value::Null) => write!(f, "{field} IS NOT NULL"),
                (op, _) => write!(f, "{field} {} {HOLE}", op.as_sql()),
            },
            Self::Columns { left, right } => write!(f, "{left} = {right}"),
            Self::Group(inner) => write!(f, "({inner})"),
        }
    }
}

/// A boolean condition tree rendered into a `WHERE` or `ON` clause.
///
/// Composition goes through [`and`](Self::and), [`or`](Self::or), and
/// [`negate`](Self::negate), each returning a new condition. Where plain
/// left-to-right chaining would change the meaning under SQL's `AND`-before-`OR`
/// precedence, the affected side is wrapped in parentheses.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereCondition {
    predicate: Predicate,
    next: Option<(Combinator, Box<WhereCondition>)>,
    negated: bool,
}

impl WhereCondition {
    /// Creates a leaf condition `field op value`.
    pub fn new(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self::leaf(Predicate::Compare {
            field: field.into(),
            op,
            value: value.into(),
        })
    }

    /// Creates a column-to-column equality (`left = right`) that binds no values.
    pub fn columns_equal(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::leaf(Predicate::Columns {
            left: left.into(),
            right: right.into(),
        })
    }

    const fn leaf(predicate: Predicate) -> Self {
        Self {
            predicate,
            next: None,
            negated: false,
        }
    }

    /// Returns `self AND other`.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let lhs = if self.negated || self.contains_or() {
            self.into_group()
        } else {
            self
        };
        let rhs = if other.negated || other.contains_or() {
            other.into_group()
        } else {
            other
        };
        lhs.append(Combinator::And, rhs)
    }

    /// Returns `self OR other`.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        let lhs = if self.negated { self.into_group() } else { self };
        let rhs = if other.negated {
            other.into_group()
        } else {
            other
        };
        lhs.append(Combinator::Or, rhs)
    }

    /// Returns the condition with its negation toggled.
    #[must_use]
    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    /// Returns `true` if the whole chain is wrapped in `NOT (...)`.
    pub const fn is_negated(&self) -> bool {
        self.negated
    }

    /// Returns the bound values in the order their holes are rendered.
    pub fn values(&self) -> Vec<Value> {
        let mut out = Vec::new();
        self.collect_values(&mut out);
        out
    }

    /// Returns the number of holes in the rendered template.
    pub fn placeholder_count(&self) -> usize {
        self.values().len()
    }

    fn collect_values(&self, out: &mut Vec<Value>) {
        self.predicate.collect_values(out);
        if let Some((_, next)) = &self.next {
            next.collect_values(out);
        }
    }

    fn contains_or(&self) -> bool {
        match &self.next {
            Some((Combinator::Or, _)) => true,
            Some((Combinator::And, next)) => next.contains_or(),
            None => false,
        }
    }

    fn into_group(self) -> Self {
        Self::leaf(Predicate::Group(Box::new(self)))
    }

    fn append(mut self, combinator: Combinator, other: Self) -> Self {
        self.next = Some(match self.next.take() {
            None => (combinator, Box::new(other)),
            Some((existing, next)) => (existing, Box::new(next.append(combinator, other))),
        });
        self
    }
}

impl fmt::Display for WhereCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("NOT (")?;
        }
        write!(f, "{}", self.predicate)?;
        if let Some((combinator, next)) = &self.next {
            write!(f, " {combinator} {next}")?;
        }
        if self.negated {
            f.write_str(")")?;
        }
        Ok(())
    }
}

// ── Ordering ────────────────────────────────────────────────────────

/// Sort direction of an `ORDER BY` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl Direction {
    /// Returns `ASC` or `DESC`.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One `ORDER BY` entry. Compared and hashed by value so repeated entries
/// can be deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderByExpression {
    /// The qualified column reference.
    pub column: String,
    /// The sort direction.
    pub direction: Direction,
}

impl OrderByExpression {
    /// Creates an ordering entry.
    pub fn new(column: impl Into<String>, direction: Direction) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    /// Splits a leading `-` off a field name: `-age` orders descending by `age`.
    pub fn split_direction(name: &str) -> (&str, Direction) {
        name.strip_prefix('-')
            .map_or((name, Direction::Asc), |rest| (rest, Direction::Desc))
    }
}

impl fmt::Display for OrderByExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.column, self.direction.as_sql())
    }
}

// ── Joins ───────────────────────────────────────────────────────────

/// SQL join kinds used for foreign key traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `INNER JOIN`, for non-nullable foreign key chains.
    Inner,
    /// `LEFT OUTER JOIN`, once any hop of the chain is nullable.
    Left,
}

impl JoinKind {
    /// Returns the SQL keyword for this join kind.
    pub const fn sql_keyword(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT OUTER JOIN",
        }
    }
}

/// A joined table occurrence with its alias and `ON` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinExpression {
    /// The joined table name.
    pub table: String,
    /// The alias under which the table's columns are referenced.
    pub alias: String,
    /// The equi-join condition.
    pub on: WhereCondition,
    /// The join kind.
    pub kind: JoinKind,
}

impl fmt::Display for JoinExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} AS {} ON {}",
            self.kind.sql_keyword(),
            self.table,
            self.alias,
            self.on
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq(field: &str, value: impl Into<Value>) -> WhereCondition {
        WhereCondition::new(field, Operator::Eq, value)
    }

    /// Counts the holes in a rendered template.
    fn holes(cond: &WhereCondition) -> usize {
        cond.to_string().matches(HOLE).count()
    }

    #[test]
    fn test_leaf_render() {
        let cond = WhereCondition::new("person.age", Operator::Gte, 6);
        assert_eq!(cond.to_string(), "person.age >= {0}");
        assert_eq!(cond.values(), vec![Value::Int(6)]);
    }

    #[test]
    fn test_and_render() {
        let cond = eq("person.name", "x").and(WhereCondition::new("person.age", Operator::Gt, 2));
        assert_eq!(cond.to_string(), "person.name = {0} AND person.age > {0}");
        assert_eq!(cond.values(), vec![Value::from("x"), Value::Int(2)]);
    }

    #[test]
    fn test_in_expands_holes() {
        let cond = WhereCondition::new("person.age", Operator::In, Value::list([3, 4]))
            .or(WhereCondition::new("person.age", Operator::Lte, 5));
        assert_eq!(
            cond.to_string(),
            "person.age IN ({0}, {0}) OR person.age <= {0}"
        );
        assert_eq!(cond.values(), vec![Value::Int(3), Value::Int(4), Value::Int(5)]);
    }

    #[test]
    fn test_empty_in_list() {
        let cond = WhereCondition::new("person.id", Operator::In, Value::List(vec![]));
        assert_eq!(cond.to_string(), "person.id IN (NULL)");
        assert!(cond.values().is_empty());
    }

    #[test]
    fn test_null_comparisons() {
        let cond = eq("person.age", Value::Null)
            .and(WhereCondition::new("person.name", Operator::Neq, Value::Null));
        assert_eq!(
            cond.to_string(),
            "person.age IS NULL AND person.name IS NOT NULL"
        );
        assert!(cond.values().is_empty());
    }

    #[test]
    fn test_negate_wraps_whole_chain() {
        let cond = eq("x", 3).and(eq("y", 5)).negate();
        assert_eq!(cond.to_string(), "NOT (x = {0} AND y = {0})");
        assert!(cond.is_negated());
    }

    #[test]
    fn test_double_negation() {
        let cond = eq("x", 3);
        assert_eq!(cond.clone().negate().negate(), cond);
    }

    #[test]
    fn test_and_onto_or_chain_groups_receiver() {
        let cond = eq("a", 1).or(eq("b", 2)).and(eq("c", 3));
        assert_eq!(cond.to_string(), "(a = {0} OR b = {0}) AND c = {0}");
        assert_eq!(cond.values(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn test_and_with_or_operand_groups_operand() {
        let cond = eq("a", 1).and(eq("b", 2).or(eq("c", 3)));
        assert_eq!(cond.to_string(), "a = {0} AND (b = {0} OR c = {0})");
    }

    #[test]
    fn test_or_keeps_and_precedence() {
        let cond = eq("a", 1).and(eq("b", 2)).or(eq("c", 3));
        assert_eq!(cond.to_string(), "a = {0} AND b = {0} OR c = {0}");
        let cond = eq("a", 1).or(eq("b", 2).and(eq("c", 3)));
        assert_eq!(cond.to_string(), "a = {0} OR b = {0} AND c = {0}");
    }

    #[test]
    fn test_append_after_negation_groups() {
        let cond = eq("a", 1).negate().and(eq("b", 2));
        assert_eq!(cond.to_string(), "(NOT (a = {0})) AND b = {0}");

        let cond = eq("a", 1).or(eq("b", 2).negate());
        assert_eq!(cond.to_string(), "a = {0} OR (NOT (b = {0}))");

        let cond = eq("a", 1).or(eq("b", 2).negate()).or(eq("c", 3));
        assert_eq!(cond.to_string(), "a = {0} OR (NOT (b = {0})) OR c = {0}");
    }

    #[test]
    fn test_values_align_with_holes() {
        let chains = vec![
            eq("a", 1).and(WhereCondition::new("b", Operator::In, Value::list([2, 3]))),
            eq("a", 1).or(eq("b", 2)).and(eq("c", 3)).negate().or(eq("d", 4)),
            eq("a", 1)
                .and(eq("b", Value::Null))
                .or(WhereCondition::new("c", Operator::In, Value::list(["x", "y", "z"])))
                .and(eq("d", 4).negate()),
        ];
        for cond in chains {
            assert_eq!(holes(&cond), cond.values().len(), "{cond}");
            assert_eq!(cond.placeholder_count(), cond.values().len());
        }
    }

    #[test]
    fn test_values_follow_render_order() {
        let cond = eq("a", 1)
            .or(eq("b", 2))
            .and(eq("c", 3).or(eq("d", 4)))
            .or(eq("e", 5));
        assert_eq!(
            cond.to_string(),
            "(a = {0} OR b = {0}) AND (c = {0} OR d = {0}) OR e = {0}"
        );
        assert_eq!(cond.values(), Value::list([1, 2, 3, 4, 5]).as_list().unwrap());
    }

    #[test]
    fn test_columns_equal() {
        let on = WhereCondition::columns_equal("book.author_id", "T11.id");
        assert_eq!(on.to_string(), "book.author_id = T11.id");
        assert!(on.values().is_empty());
    }

    #[test]
    fn test_clone_is_independent() {
        let base = eq("a", 1);
        let extended = base.clone().and(eq("b", 2));
        assert_eq!(base.to_string(), "a = {0}");
        assert_eq!(extended.to_string(), "a = {0} AND b = {0}");
    }

    #[test]
    fn test_order_by_expression() {
        assert_eq!(
            OrderByExpression::split_direction("-age"),
            ("age", Direction::Desc)
        );
        assert_eq!(
            OrderByExpression::split_direction("name"),
            ("name", Direction::Asc)
        );
        let order = OrderByExpression::new("person.age", Direction::Desc);
        assert_eq!(order.to_string(), "person.age DESC");
        assert_eq!(order, OrderByExpression::new("person.age", Direction::Desc));
    }

    #[test]
    fn test_join_expression_render() {
        let join = JoinExpression {
            table: "person".into(),
            alias: "T11".into(),
            on: WhereCondition::columns_equal("book.author_id", "T11.id"),
            kind: JoinKind::Left,
        };
        assert_eq!(
            join.to_string(),
            "LEFT OUTER JOIN person AS T11 ON book.author_id = T11.id"
        );
    }
}
