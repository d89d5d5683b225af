//! # minorm
//!
//! A minimal object-relational mapper for Rust: declarative models, lazy
//! chainable querysets, eager loading across foreign keys, and blocking
//! SQLite and PostgreSQL backends.
//!
//! This is the meta-crate that re-exports all sub-crates for convenient access.
//! You can depend on `minorm` to get everything, or depend on individual crates
//! for finer-grained control.
//!
//! ```
//! use std::sync::LazyLock;
//!
//! use minorm::prelude::*;
//!
//! struct Person {
//!     id: Option<i64>,
//!     name: String,
//!     age: i64,
//! }
//!
//! impl Model for Person {
//!     fn meta() -> &'static ModelMeta {
//!         static META: LazyLock<ModelMeta> = LazyLock::new(|| {
//!             ModelMeta::new(
//!                 "person",
//!                 vec![
//!                     FieldDef::new("name", FieldType::CharField).max_length(50),
//!                     FieldDef::new("age", FieldType::IntegerField),
//!                 ],
//!             )
//!         });
//!         &META
//!     }
//!
//!     fn pk(&self) -> Value {
//!         self.id.into()
//!     }
//!
//!     fn set_pk(&mut self, value: Value) {
//!         self.id = value.as_int();
//!     }
//!
//!     fn field_values(&self) -> Vec<(&'static str, Value)> {
//!         vec![("name", self.name.clone().into()), ("age", self.age.into())]
//!     }
//!
//!     fn from_record(record: &mut Record) -> OrmResult<Self> {
//!         Ok(Self {
//!             id: record.next()?,
//!             name: record.next()?,
//!             age: record.next()?,
//!         })
//!     }
//! }
//!
//! # fn main() -> OrmResult<()> {
//! let db = minorm::db_backends::connect(&DatabaseSettings::sqlite_memory())?;
//! let db = db.as_ref();
//! create_table::<Person>(db)?;
//! for (name, age) in [("x", 3), ("y", 6), ("z", 6)] {
//!     Person::objects().create(db, Person { id: None, name: name.into(), age })?;
//! }
//!
//! let older = Person::objects()
//!     .filter([("age__gte", 6)])?
//!     .order_by(&["name"])?
//!     .all(db)?;
//! assert_eq!(older.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(), ["y", "z"]);
//! # Ok(())
//! # }
//! ```

/// Core types: errors, settings, settings loading, and logging.
pub use minorm_core as core;

/// ORM: models, fields, querysets, rendering, and transactions.
pub use minorm_db as db;

/// Database backends: `PostgreSQL` and `SQLite`.
pub use minorm_db_backends as db_backends;

/// Third-party crates that appear in the public API.
pub use chrono;
pub use rust_decimal;
pub use tracing;

/// The names most code needs, in one import.
pub mod prelude {
    pub use minorm_core::logging::setup_logging;
    pub use minorm_core::{DatabaseSettings, OrmError, OrmResult, Settings};
    pub use minorm_db::executor::{
        create_table, delete_model, drop_table, refresh_model, save_model, DbExecutor,
    };
    pub use minorm_db::fields::{FieldDef, FieldType, OnDelete};
    pub use minorm_db::model::{ForeignKey, Model, ModelMeta, Record};
    pub use minorm_db::query::{Manager, QuerySet, ValuesRow, WhereCondition};
    pub use minorm_db::transactions::atomic;
    pub use minorm_db::value::Value;
}
