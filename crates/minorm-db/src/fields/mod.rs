//! Field declarations.
//!
//! A model's columns are described by an ordered list of [`FieldDef`]s.
//! Each one knows its column name, how to coerce values before they are
//! bound, and how to declare itself in `CREATE TABLE`.

pub mod types;

pub use types::{FieldDef, FieldType, ModelRef, OnDelete};
