//! # minorm-db-backends
//!
//! Database backend implementations for minorm. Each backend implements
//! [`DbExecutor`](minorm_db::DbExecutor) with a blocking driver.
//!
//! Supported backends:
//! - `SQLite` (feature `sqlite`, via `rusqlite`)
//! - `PostgreSQL` (feature `postgres`, via `postgres`)

pub mod base;
#[cfg(feature = "postgres")]
pub mod postgresql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use base::{connect, connect_default, TransactionState};
#[cfg(feature = "postgres")]
pub use postgresql::PostgresBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
