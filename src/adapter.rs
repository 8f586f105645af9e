//! Contract every native backend adapter implements.
//!
//! The connection manager, statement executor, result cursor and transaction
//! coordinator only ever talk to a `dyn NativeAdapter`; backend differences are
//! expressed through [`Capabilities`] instead of branching on backend identity.

use std::sync::LazyLock;

use regex::Regex;
use tokio::runtime::{Builder, Runtime};

use crate::config::ConnectionOptions;
use crate::error::DbManagerError;
use crate::placeholders::PlaceholderStyle;
use crate::results::FieldInfo;
use crate::types::{Engine, PreparedParameter, RowValues};

/// How a backend copes with a `begin` while a transaction is already open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionNesting {
    /// One transaction at a time; a nested begin is an unsupported operation.
    Flat,
    /// Nested scopes are emulated with named savepoints.
    Emulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub nesting: TransactionNesting,
    /// Whether a persistent-connection request can be honoured.
    pub persistent_connections: bool,
    /// Whether results are fully buffered at execution time, so row counts are known
    /// before any row is fetched.
    pub buffered_results: bool,
    pub placeholders: PlaceholderStyle,
}

/// Identity captured right after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerIdentity {
    pub server: String,
    pub user: String,
    pub version: String,
}

/// What a statement produced.
pub enum NativeOutcome<'a> {
    /// A result set; rows are pulled through the handle.
    Rows(Box<dyn NativeResult + 'a>),
    /// No result set; number of rows the statement changed.
    Affected(u64),
}

impl NativeOutcome<'_> {
    /// Rows changed by the statement; 0 for row-producing statements.
    #[must_use]
    pub fn affected_rows(&self) -> u64 {
        match self {
            NativeOutcome::Rows(_) => 0,
            NativeOutcome::Affected(n) => *n,
        }
    }
}

/// Backend result handle. Single pass: rows come out once, in order.
pub trait NativeResult {
    fn columns(&self) -> &[FieldInfo];

    /// Next row, or `None` once the result is exhausted.
    ///
    /// # Errors
    /// Returns the backend error if reading the row fails.
    fn fetch_row(&mut self) -> Result<Option<Vec<RowValues>>, DbManagerError>;

    /// Total rows in the result if the backend knows it without draining.
    fn row_count(&self) -> Option<u64> {
        None
    }
}

/// Backend-specific connect/query/fetch/transaction primitives.
///
/// Scope operations (`*_scope`) emulate nesting on backends whose capabilities say
/// [`TransactionNesting::Emulated`]; the defaults refuse.
pub trait NativeAdapter {
    fn engine(&self) -> Engine;

    fn capabilities(&self) -> Capabilities;

    /// Apply a character set.
    ///
    /// # Errors
    /// Returns an error when the backend rejects the charset; the caller falls back
    /// to [`NativeAdapter::default_charset`].
    fn set_charset(&mut self, charset: &str) -> Result<(), DbManagerError>;

    /// Charset currently in effect.
    fn charset(&self) -> String;

    fn default_charset(&self) -> &'static str {
        "UTF-8"
    }

    /// # Errors
    /// Returns the backend error if the mode cannot be applied.
    fn set_autocommit(&mut self, enabled: bool) -> Result<(), DbManagerError>;

    /// # Errors
    /// Returns the backend error if the identity queries fail.
    fn describe(&mut self) -> Result<ServerIdentity, DbManagerError>;

    /// Run one statement. `sql` still uses `?` placeholders; the adapter rewrites them
    /// for its native client.
    ///
    /// # Errors
    /// Returns the backend error if preparing, binding or executing fails.
    fn execute(
        &mut self,
        sql: &str,
        params: &[PreparedParameter],
    ) -> Result<NativeOutcome<'_>, DbManagerError>;

    /// Run a parameterless multi-statement script.
    ///
    /// # Errors
    /// Returns the backend error if any statement fails.
    fn execute_batch(&mut self, sql: &str) -> Result<(), DbManagerError>;

    /// # Errors
    /// Returns the backend error if the directive fails.
    fn begin(&mut self) -> Result<(), DbManagerError>;

    /// # Errors
    /// Returns the backend error if the directive fails.
    fn commit(&mut self) -> Result<(), DbManagerError>;

    /// # Errors
    /// Returns the backend error if the directive fails.
    fn rollback(&mut self) -> Result<(), DbManagerError>;

    /// # Errors
    /// `DbManagerError::Unsupported` unless the backend emulates nesting.
    fn begin_scope(&mut self, name: &str) -> Result<(), DbManagerError> {
        Err(unsupported_nesting(self.engine(), name))
    }

    /// # Errors
    /// `DbManagerError::Unsupported` unless the backend emulates nesting.
    fn commit_scope(&mut self, name: &str) -> Result<(), DbManagerError> {
        Err(unsupported_nesting(self.engine(), name))
    }

    /// # Errors
    /// `DbManagerError::Unsupported` unless the backend emulates nesting.
    fn rollback_scope(&mut self, name: &str) -> Result<(), DbManagerError> {
        Err(unsupported_nesting(self.engine(), name))
    }

    /// # Errors
    /// Returns the backend error if the id cannot be read.
    fn last_insert_id(&mut self) -> Result<i64, DbManagerError>;

    /// # Errors
    /// `DbManagerError::Unsupported` unless the backend can switch databases.
    fn select_db(&mut self, database: &str) -> Result<(), DbManagerError> {
        Err(DbManagerError::Unsupported(format!(
            "{:?} cannot switch to database '{database}' on an open connection",
            self.engine()
        )))
    }

    fn escape_string(&self, text: &str) -> String {
        escape_literal(text)
    }

    /// Release the native handle. Called at most once.
    ///
    /// # Errors
    /// Returns the backend error if the handle does not close cleanly.
    fn close(&mut self) -> Result<(), DbManagerError>;
}

/// Establishes adapters for one engine.
pub trait Driver {
    fn engine(&self) -> Engine;

    /// One connection attempt. Retrying is the caller's business.
    ///
    /// # Errors
    /// Returns the backend error of this attempt.
    fn connect(&self, options: &ConnectionOptions)
    -> Result<Box<dyn NativeAdapter>, DbManagerError>;
}

/// Current-thread runtime owned by an async-backed adapter. Nothing runs on it
/// between blocking calls.
///
/// # Errors
/// Returns `DbManagerError::Io` if the runtime cannot be built.
pub fn blocking_runtime() -> Result<Runtime, DbManagerError> {
    Ok(Builder::new_current_thread().enable_all().build()?)
}

/// Built-in driver for `engine`.
///
/// # Errors
/// `DbManagerError::ConfigError` when the engine's cargo feature is disabled.
pub fn driver_for(engine: Engine) -> Result<Box<dyn Driver>, DbManagerError> {
    match engine {
        #[cfg(feature = "sqlite")]
        Engine::Sqlite => Ok(Box::new(crate::sqlite::SqliteDriver)),
        #[cfg(feature = "postgres")]
        Engine::Postgres => Ok(Box::new(crate::postgres::PostgresDriver)),
        #[cfg(feature = "mssql")]
        Engine::Mssql => Ok(Box::new(crate::mssql::MssqlDriver)),
        #[allow(unreachable_patterns)]
        other => Err(DbManagerError::ConfigError(format!(
            "engine {other:?} is not compiled in (enable the matching cargo feature)"
        ))),
    }
}

fn unsupported_nesting(engine: Engine, name: &str) -> DbManagerError {
    DbManagerError::Unsupported(format!(
        "{engine:?} does not support nested transactions (scope '{name}')"
    ))
}

static NON_DISPLAYABLE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"%0[0-8bcef]",
        r"%1[0-9a-f]",
        r"[\x00-\x08]",
        r"\x0b",
        r"\x0c",
        r"[\x0e-\x1f]",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Legacy literal escaping: strip non-displayable characters (raw and URL-encoded)
/// and double single quotes. Numeric input is returned as-is.
#[must_use]
pub fn escape_literal(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    if text.trim().parse::<f64>().is_ok() {
        return text.to_owned();
    }
    let mut cleaned = text.to_owned();
    for pattern in NON_DISPLAYABLE.iter() {
        cleaned = pattern.replace_all(&cleaned, "").into_owned();
    }
    cleaned.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_doubles_quotes() {
        assert_eq!(escape_literal("O'Brien"), "O''Brien");
    }

    #[test]
    fn escape_strips_control_characters() {
        assert_eq!(escape_literal("a\u{0}b\u{1f}c%0bd"), "abcd");
        assert_eq!(escape_literal("line\nbreak\ttab"), "line\nbreak\ttab");
    }

    #[test]
    fn escape_passes_numbers_and_empty() {
        assert_eq!(escape_literal("12.5"), "12.5");
        assert_eq!(escape_literal(""), "");
    }
}
