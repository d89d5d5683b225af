//! # minorm-db
//!
//! ORM layer of minorm. Provides the [`Model`](model::Model) trait for
//! declaring models, [`QuerySet`](query::QuerySet) for building and running
//! queries, [`Manager`](query::Manager) for model-level operations, and the
//! [`DbExecutor`](executor::DbExecutor) trait that database backends implement.
//!
//! ## Architecture
//!
//! Querysets are lazy. Chaining methods only grows a condition tree and a
//! tree of foreign key relations; SQL is rendered when a terminal method
//! (`.all()`, `.get()`, `.count()`, ...) runs against an executor. Statements
//! are rendered once with neutral `{0}` holes and then filled with the
//! placeholder style of the target backend.
//!
//! ## Module Overview
//!
//! - [`model`] - The [`Model`](model::Model) trait, [`ModelMeta`](model::ModelMeta), and records
//! - [`fields`] - Field definitions ([`FieldDef`](fields::FieldDef)) and types
//! - [`value`] - The backend-agnostic [`Value`](value::Value) enum
//! - [`query`] - Conditions, lookups, relations, compilation, and querysets
//! - [`executor`] - The executor trait and instance persistence
//! - [`transactions`] - Atomic blocks

// These clippy lints are intentionally allowed for the ORM crate:
// - struct_excessive_bools: FieldDef carries several independent flags
// - result_large_err: OrmError is used consistently across the crate
// - format_push_string: format! with push_str is clearer than write! for SQL generation
// - doc_markdown: backtick requirements for documentation items are too strict
// - needless_pass_by_value: builders take owned values
// - return_self_not_must_use: builder pattern methods are self-documenting
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::result_large_err)]
#![allow(clippy::format_push_string)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
// literal_string_with_formatting_args: `{0}` holes in SQL templates are intentional
#![allow(clippy::literal_string_with_formatting_args)]
#![allow(clippy::significant_drop_tightening)]

pub mod executor;
pub mod fields;
pub mod model;
pub mod query;
pub mod transactions;
pub mod value;

// Re-export the most commonly used types at the crate root.
pub use executor::{
    create_table, delete_model, drop_table, refresh_model, save_model, DbExecutor,
};
pub use fields::{FieldDef, FieldType, ModelRef, OnDelete};
pub use model::{ForeignKey, Model, ModelMeta, Record};
pub use query::{
    AsInstances, AsValues, DatabaseBackendType, Direction, FromValue, Lookup, Manager, Operator,
    OrderByExpression, Projection, QuerySet, RelationNode, Row, ValuesRow, WhereCondition,
};
pub use transactions::{atomic, Transaction};
pub use value::Value;
