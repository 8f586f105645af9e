use serde::Serialize;
use thiserror::Error;

/// The five error kinds every failure is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing options, detected before any connect attempt.
    Configuration,
    /// Connection could not be established (retries exhausted) or is gone.
    Connection,
    /// Malformed SQL, parameter mismatch, or a backend rejection.
    Execution,
    /// Commit/rollback issued in an invalid context.
    Transaction,
    /// The selected backend adapter lacks the requested capability.
    UnsupportedOperation,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::Connection => "ConnectionError",
            ErrorKind::Execution => "ExecutionError",
            ErrorKind::Transaction => "TransactionError",
            ErrorKind::UnsupportedOperation => "UnsupportedOperationError",
        };
        f.write_str(name)
    }
}

/// Structured, serializable snapshot of a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    /// SQL text the failure originated from, when there was one.
    pub sql: Option<String>,
    /// Backend error code (SQLite extended code, SQLSTATE, SQL Server error number).
    pub code: Option<String>,
}

#[derive(Debug, Error)]
pub enum DbManagerError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[cfg(feature = "mssql")]
    #[error(transparent)]
    MssqlError(#[from] tiberius::error::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error after {attempts} attempt(s): {source}")]
    ConnectionError {
        attempts: u32,
        #[source]
        source: Box<DbManagerError>,
    },

    #[error("Connection error: {0}")]
    ConnectFailed(String),

    #[error("Connection error: connection is closed")]
    NotConnected,

    #[error("Parameter error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {message}")]
    ExecutionError {
        message: String,
        sql: Option<String>,
        code: Option<String>,
    },

    #[error("Result cursor error: {0}")]
    CursorError(String),

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl DbManagerError {
    /// Shorthand for an execution failure that has no backend code.
    pub fn execution(message: impl Into<String>) -> Self {
        DbManagerError::ExecutionError {
            message: message.into(),
            sql: None,
            code: None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbManagerError::ConfigError(_) => ErrorKind::Configuration,
            DbManagerError::ConnectionError { .. }
            | DbManagerError::ConnectFailed(_)
            | DbManagerError::NotConnected
            | DbManagerError::Io(_) => ErrorKind::Connection,
            DbManagerError::TransactionError(_) => ErrorKind::Transaction,
            DbManagerError::Unsupported(_) => ErrorKind::UnsupportedOperation,
            DbManagerError::ParameterError(_)
            | DbManagerError::ExecutionError { .. }
            | DbManagerError::CursorError(_) => ErrorKind::Execution,
            #[cfg(feature = "postgres")]
            DbManagerError::PostgresError(_) => ErrorKind::Execution,
            #[cfg(feature = "sqlite")]
            DbManagerError::SqliteError(_) => ErrorKind::Execution,
            #[cfg(feature = "mssql")]
            DbManagerError::MssqlError(_) => ErrorKind::Execution,
        }
    }

    /// Backend-reported error code, if the failure came from a backend.
    #[must_use]
    pub fn code(&self) -> Option<String> {
        match self {
            DbManagerError::ExecutionError { code, .. } => code.clone(),
            DbManagerError::ConnectionError { source, .. } => source.code(),
            #[cfg(feature = "sqlite")]
            DbManagerError::SqliteError(rusqlite::Error::SqliteFailure(err, _)) => {
                Some(err.extended_code.to_string())
            }
            #[cfg(feature = "postgres")]
            DbManagerError::PostgresError(err) => err.code().map(|state| state.code().to_owned()),
            #[cfg(feature = "mssql")]
            DbManagerError::MssqlError(tiberius::error::Error::Server(token)) => {
                Some(token.code().to_string())
            }
            _ => None,
        }
    }

    /// Attach the originating SQL to an execution-kind failure.
    ///
    /// Backend errors are folded into [`DbManagerError::ExecutionError`] so the code and
    /// the statement travel together; other kinds are returned untouched.
    #[must_use]
    pub fn with_sql(self, sql: &str) -> Self {
        if self.kind() != ErrorKind::Execution {
            return self;
        }
        match self {
            DbManagerError::ExecutionError {
                message,
                sql: None,
                code,
            } => DbManagerError::ExecutionError {
                message,
                sql: Some(sql.to_owned()),
                code,
            },
            DbManagerError::ExecutionError { .. } | DbManagerError::CursorError(_) => self,
            other => {
                let code = other.code();
                let message = match &other {
                    DbManagerError::ParameterError(msg) => msg.clone(),
                    backend => backend.to_string(),
                };
                DbManagerError::ExecutionError {
                    message,
                    sql: Some(sql.to_owned()),
                    code,
                }
            }
        }
    }

    #[must_use]
    pub fn report(&self) -> ErrorReport {
        let sql = match self {
            DbManagerError::ExecutionError { sql, .. } => sql.clone(),
            _ => None,
        };
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
            sql,
            code: self.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_cover_the_taxonomy() {
        assert_eq!(
            DbManagerError::ConfigError("x".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(DbManagerError::NotConnected.kind(), ErrorKind::Connection);
        assert_eq!(
            DbManagerError::ParameterError("x".into()).kind(),
            ErrorKind::Execution
        );
        assert_eq!(
            DbManagerError::TransactionError("x".into()).kind(),
            ErrorKind::Transaction
        );
        assert_eq!(
            DbManagerError::Unsupported("x".into()).kind(),
            ErrorKind::UnsupportedOperation
        );
    }

    #[test]
    fn with_sql_folds_parameter_errors() {
        let err = DbManagerError::ParameterError("expected 2 parameters, got 1".into())
            .with_sql("select ?, ?");
        let report = err.report();
        assert_eq!(report.kind, ErrorKind::Execution);
        assert_eq!(report.sql.as_deref(), Some("select ?, ?"));
        assert!(report.message.contains("expected 2 parameters"));
    }

    #[test]
    fn with_sql_leaves_other_kinds_alone() {
        let err = DbManagerError::Unsupported("nested".into()).with_sql("begin");
        assert!(matches!(err, DbManagerError::Unsupported(_)));
        assert_eq!(err.report().sql, None);
    }

    #[test]
    fn connection_error_reports_wrapped_code() {
        let inner = DbManagerError::ExecutionError {
            message: "denied".into(),
            sql: None,
            code: Some("28P01".into()),
        };
        let err = DbManagerError::ConnectionError {
            attempts: 3,
            source: Box::new(inner),
        };
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.code().as_deref(), Some("28P01"));
        assert!(err.to_string().contains("3 attempt"));
    }
}
