use std::time::Duration;

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::DbManagerError;
use crate::manager::ConnectionManager;
use crate::types::Engine;

pub const DEFAULT_CHARSET: &str = "utf8";
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Options for establishing a connection.
///
/// `host`, `username`, `password` and `database` are required for every engine (for
/// `SQLite`, `database` is the file path or `:memory:`).
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionOptions {
    pub engine: Engine,
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
    pub database: String,
    pub charset: String,
    /// Request a persistent connection. Backends that cannot honour it connect
    /// normally and report `persistent: false` in the connection info.
    pub persistent: bool,
    pub autocommit: bool,
    /// Passed through to the backend's own connect/busy timeout support.
    pub timeout: Option<Duration>,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    /// Calls that omit an error mode escalate to the fatal path.
    pub debug: bool,
}

impl ConnectionOptions {
    #[must_use]
    pub fn new(
        engine: Engine,
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            host: host.into(),
            port: None,
            username: username.into(),
            password: password.into(),
            database: database.into(),
            charset: DEFAULT_CHARSET.to_owned(),
            persistent: false,
            autocommit: true,
            timeout: None,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            debug: false,
        }
    }

    #[must_use]
    pub fn builder(
        engine: Engine,
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> ConnectionOptionsBuilder {
        ConnectionOptionsBuilder::new(engine, host, username, password, database)
    }

    /// Build options from a configuration record. Unknown keys are ignored.
    ///
    /// ```rust
    /// use db_manager::prelude::*;
    ///
    /// let opts = ConnectionOptions::from_json(&serde_json::json!({
    ///     "engine": "sqlite",
    ///     "host": "localhost",
    ///     "username": "app",
    ///     "password": "secret",
    ///     "database": ":memory:",
    ///     "retry_attempts": 3,
    ///     "retry_delay": 100,
    ///     "favourite_colour": "green"
    /// }))?;
    /// assert_eq!(opts.retry_attempts, 3);
    /// # Ok::<(), DbManagerError>(())
    /// ```
    ///
    /// # Errors
    /// `DbManagerError::ConfigError` if a required key is missing or a value is invalid.
    pub fn from_json(value: &JsonValue) -> Result<Self, DbManagerError> {
        let raw = RawOptions::deserialize(value)
            .map_err(|e| DbManagerError::ConfigError(format!("invalid options: {e}")))?;
        raw.into_options()
    }

    /// # Errors
    /// `DbManagerError::ConfigError` if the text is not JSON or fails [`Self::from_json`].
    pub fn from_json_str(text: &str) -> Result<Self, DbManagerError> {
        let value: JsonValue = serde_json::from_str(text)
            .map_err(|e| DbManagerError::ConfigError(format!("options are not valid JSON: {e}")))?;
        Self::from_json(&value)
    }

    /// Port to dial: the configured one, else the engine default.
    #[must_use]
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or_else(|| self.engine.default_port())
    }

    /// Check required fields and ranges.
    ///
    /// # Errors
    /// `DbManagerError::ConfigError` naming the first offending field.
    pub fn validate(&self) -> Result<(), DbManagerError> {
        for (field, value) in [
            ("host", &self.host),
            ("username", &self.username),
            ("password", &self.password),
            ("database", &self.database),
        ] {
            if value.trim().is_empty() {
                return Err(DbManagerError::ConfigError(format!(
                    "missing required option '{field}'"
                )));
            }
        }
        if self.retry_attempts == 0 {
            return Err(DbManagerError::ConfigError(
                "retry_attempts must be at least 1".into(),
            ));
        }
        if self.charset.trim().is_empty() {
            return Err(DbManagerError::ConfigError("charset must not be empty".into()));
        }
        Ok(())
    }
}

/// Fluent builder for [`ConnectionOptions`].
#[derive(Debug, Clone)]
pub struct ConnectionOptionsBuilder {
    opts: ConnectionOptions,
}

impl ConnectionOptionsBuilder {
    #[must_use]
    pub fn new(
        engine: Engine,
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            opts: ConnectionOptions::new(engine, host, username, password, database),
        }
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.opts.port = Some(port);
        self
    }

    #[must_use]
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.opts.charset = charset.into();
        self
    }

    #[must_use]
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.opts.persistent = persistent;
        self
    }

    #[must_use]
    pub fn autocommit(mut self, autocommit: bool) -> Self {
        self.opts.autocommit = autocommit;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.opts.retry_attempts = attempts;
        self
    }

    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.opts.retry_delay = delay;
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.opts.debug = debug;
        self
    }

    /// Validate and return the options.
    ///
    /// # Errors
    /// `DbManagerError::ConfigError` if validation fails.
    pub fn finish(self) -> Result<ConnectionOptions, DbManagerError> {
        self.opts.validate()?;
        Ok(self.opts)
    }

    /// Validate, then connect with the built-in driver for the engine.
    ///
    /// # Errors
    /// `ConfigError` for invalid options, `ConnectionError` once retries are exhausted.
    pub fn connect(self) -> Result<ConnectionManager, DbManagerError> {
        ConnectionManager::connect(self.finish()?)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawOptions {
    #[serde(alias = "driver")]
    engine: Option<String>,
    #[serde(alias = "server")]
    host: Option<String>,
    port: Option<u16>,
    #[serde(alias = "user")]
    username: Option<String>,
    #[serde(alias = "pass")]
    password: Option<String>,
    #[serde(alias = "dbname", alias = "schema")]
    database: Option<String>,
    charset: Option<String>,
    persistent: Option<bool>,
    autocommit: Option<bool>,
    /// seconds
    timeout: Option<u64>,
    retry_attempts: Option<u32>,
    /// milliseconds
    retry_delay: Option<u64>,
    debug: Option<bool>,
}

impl RawOptions {
    fn into_options(self) -> Result<ConnectionOptions, DbManagerError> {
        fn required(field: &str, value: Option<String>) -> Result<String, DbManagerError> {
            value.ok_or_else(|| {
                DbManagerError::ConfigError(format!("missing required option '{field}'"))
            })
        }

        let engine = match self.engine.as_deref() {
            Some(name) => name.parse::<Engine>()?,
            None => Engine::default(),
        };
        let mut opts = ConnectionOptions::new(
            engine,
            required("host", self.host)?,
            required("username", self.username)?,
            required("password", self.password)?,
            required("database", self.database)?,
        );
        opts.port = self.port;
        if let Some(charset) = self.charset {
            opts.charset = charset;
        }
        opts.persistent = self.persistent.unwrap_or(false);
        opts.autocommit = self.autocommit.unwrap_or(true);
        opts.timeout = self.timeout.map(Duration::from_secs);
        opts.retry_attempts = self.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS);
        opts.retry_delay = self
            .retry_delay
            .map_or(DEFAULT_RETRY_DELAY, Duration::from_millis);
        opts.debug = self.debug.unwrap_or(false);
        opts.validate()?;
        Ok(opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> JsonValue {
        json!({
            "host": "db1",
            "username": "u",
            "password": "p",
            "database": "app",
        })
    }

    #[test]
    fn defaults_apply() {
        let opts = ConnectionOptions::from_json(&base()).unwrap();
        assert_eq!(opts.engine, Engine::Postgres);
        assert_eq!(opts.charset, DEFAULT_CHARSET);
        assert!(opts.autocommit);
        assert!(!opts.persistent);
        assert_eq!(opts.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
        assert_eq!(opts.retry_delay, DEFAULT_RETRY_DELAY);
        assert_eq!(opts.effective_port(), Some(5432));
    }

    #[test]
    fn aliases_and_unknown_keys() {
        let opts = ConnectionOptions::from_json(&json!({
            "driver": "sqlserver",
            "server": "sql01\\INSTANCE",
            "user": "sa",
            "pass": "pw",
            "dbname": "shop",
            "retry_delay": 250,
            "timeout": 5,
            "colour": "blue",
        }))
        .unwrap();
        assert_eq!(opts.engine, Engine::Mssql);
        assert_eq!(opts.host, "sql01\\INSTANCE");
        assert_eq!(opts.retry_delay, Duration::from_millis(250));
        assert_eq!(opts.timeout, Some(Duration::from_secs(5)));
        assert_eq!(opts.effective_port(), Some(1433));
    }

    #[test]
    fn missing_required_key_fails_construction() {
        for key in ["host", "username", "password", "database"] {
            let mut value = base();
            value.as_object_mut().unwrap().remove(key);
            let err = ConnectionOptions::from_json(&value).unwrap_err();
            assert!(
                matches!(err, DbManagerError::ConfigError(ref msg) if msg.contains(key)),
                "{key}: {err}"
            );
        }
    }

    #[test]
    fn empty_required_value_fails_validation() {
        let err = ConnectionOptions::builder(Engine::Sqlite, "", "u", "p", ":memory:")
            .finish()
            .unwrap_err();
        assert!(matches!(err, DbManagerError::ConfigError(_)));
    }

    #[test]
    fn zero_retry_attempts_rejected() {
        let err = ConnectionOptions::builder(Engine::Sqlite, "h", "u", "p", ":memory:")
            .retry_attempts(0)
            .finish()
            .unwrap_err();
        assert!(matches!(err, DbManagerError::ConfigError(_)));
    }

    #[test]
    fn unknown_engine_is_config_error() {
        let mut value = base();
        value["engine"] = json!("oracle");
        assert!(matches!(
            ConnectionOptions::from_json(&value),
            Err(DbManagerError::ConfigError(_))
        ));
    }
}
