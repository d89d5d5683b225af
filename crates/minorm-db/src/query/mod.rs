//! Query building, compilation, and execution.
//!
//! - [`expressions`] - condition trees, ordering, and joins
//! - [`lookups`] - `field__lookup` keyword parsing
//! - [`relations`] - the foreign key tree behind joins and eager loading
//! - [`compiler`] - statement builders and SQL rendering per dialect
//! - [`queryset`] - QuerySet and Manager for lazy query building

pub mod compiler;
pub mod expressions;
pub mod lookups;
pub mod queryset;
pub mod relations;

pub use compiler::{DatabaseBackendType, FromValue, Row};
pub use expressions::{Direction, Operator, OrderByExpression, WhereCondition};
pub use lookups::Lookup;
pub use queryset::{AsInstances, AsValues, Manager, Projection, QuerySet, ValuesRow};
pub use relations::RelationNode;
