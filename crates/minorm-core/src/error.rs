//! Core error types for minorm.
//!
//! This module provides the [`OrmError`] enum covering query-building errors
//! (unknown fields, bad relation paths), lookup results (`DoesNotExist`,
//! `MultipleResultsFound`), driver errors, configuration errors, and model
//! setup errors.

use thiserror::Error;

/// The primary error type for minorm.
///
/// Validation variants ([`InvalidField`](OrmError::InvalidField),
/// [`InvalidRelation`](OrmError::InvalidRelation)) are produced while a query
/// is being built, before any SQL reaches the database. Driver variants are
/// produced by the backends and are propagated unchanged.
#[derive(Error, Debug)]
pub enum OrmError {
    // ── Query building ───────────────────────────────────────────────

    /// A lookup, ordering, or projection named a field the model does not have.
    #[error("Invalid field: {0}")]
    InvalidField(String),

    /// A relation path segment is not a foreign key.
    #[error("Invalid relation: {0}")]
    InvalidRelation(String),

    // ── Lookup results ───────────────────────────────────────────────

    /// `get()` expected exactly one result but found none.
    #[error("Object does not exist: {0}")]
    DoesNotExist(String),

    /// `get()` expected exactly one result but found several.
    #[error("Multiple results found when one expected: {0}")]
    MultipleResultsFound(String),

    /// An integer index was outside the materialized result set.
    #[error("QuerySet index out of range")]
    IndexOutOfRange,

    // ── Database ─────────────────────────────────────────────────────

    /// A generic database error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A database integrity constraint was violated.
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    /// An operational database error (connection failure, etc.).
    #[error("Operational error: {0}")]
    OperationalError(String),

    /// A transaction was used incorrectly (nested `atomic`, commit outside a block).
    #[error("Transaction error: {0}")]
    TransactionError(String),

    // ── Models ───────────────────────────────────────────────────────

    /// A model declaration is inconsistent (e.g. two primary keys).
    #[error("Model setup error: {0}")]
    ModelSetupError(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The requested database engine is not compiled in or not recognized.
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),

    // ── Serialization ────────────────────────────────────────────────

    /// A value could not be converted to or from its stored representation.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrmError {
    /// Returns `true` for errors raised while building a query, before any
    /// statement was sent to the database.
    pub const fn is_validation_error(&self) -> bool {
        matches!(self, Self::InvalidField(_) | Self::InvalidRelation(_))
    }

    /// Returns `true` for errors reported by the database driver.
    pub const fn is_database_error(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(_) | Self::IntegrityError(_) | Self::OperationalError(_)
        )
    }
}

/// A convenience type alias for `Result<T, OrmError>`.
pub type OrmResult<T> = Result<T, OrmError>;
