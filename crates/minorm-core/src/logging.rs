//! Logging integration for minorm.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`Settings`](crate::settings::Settings) and for creating per-statement spans.

use crate::settings::Settings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The log level is read from `settings.log_level` (e.g. "debug", "info",
/// "minorm_db=debug"). In debug mode a pretty, human-readable format is used;
/// otherwise a structured JSON format is used. Installing a subscriber twice
/// is a no-op.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for a single SQL statement.
///
/// Backends enter this span around statement execution so that driver logs
/// and errors are attributed to the vendor and statement kind.
///
/// # Examples
///
/// ```
/// use minorm_core::logging::query_span;
///
/// let span = query_span("sqlite", "SELECT");
/// let _guard = span.enter();
/// tracing::debug!("running query");
/// ```
pub fn query_span(vendor: &str, statement: &str) -> tracing::Span {
    tracing::debug_span!("query", vendor, statement)
}

/// Returns the leading keyword of a SQL statement (`SELECT`, `INSERT`, ...).
///
/// Used to label [`query_span`]s without logging full statement text at span level.
pub fn statement_kind(sql: &str) -> &str {
    sql.split_whitespace().next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_kind() {
        assert_eq!(statement_kind("SELECT person.id FROM person"), "SELECT");
        assert_eq!(statement_kind("  INSERT INTO person"), "INSERT");
        assert_eq!(statement_kind(""), "");
    }

    #[test]
    fn test_setup_logging_twice_is_noop() {
        let settings = Settings::default();
        setup_logging(&settings);
        setup_logging(&settings);
    }
}
