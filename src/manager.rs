use std::time::Instant;

use crate::adapter::{Driver, driver_for};
use crate::config::ConnectionOptions;
use crate::connection::{Connection, ConnectionInfo};
use crate::error::DbManagerError;

/// Owns at most one [`Connection`] and the options it was made from.
///
/// ```rust,no_run
/// use db_manager::prelude::*;
///
/// let mut manager = ConnectionOptions::builder(Engine::Sqlite, "localhost", "app", "secret", ":memory:")
///     .retry_attempts(3)
///     .connect()?;
/// let conn = manager.connection()?;
/// conn.execute_batch("create table t (id integer primary key, name text)")?;
/// conn.execute("insert into t (name) values (?)", &[PreparedParameter::string("alice")])?;
/// assert_eq!(conn.query_count(), 2);
/// manager.close()?;
/// # Ok::<(), DbManagerError>(())
/// ```
#[derive(Debug)]
pub struct ConnectionManager {
    options: ConnectionOptions,
    connection: Option<Connection>,
}

impl ConnectionManager {
    /// Validate `options` and connect with the built-in driver for its engine.
    ///
    /// # Errors
    /// `ConfigError` before any network access for invalid options or an engine that
    /// is not compiled in; `ConnectionError` once every attempt has failed.
    pub fn connect(options: ConnectionOptions) -> Result<Self, DbManagerError> {
        options.validate()?;
        let driver = driver_for(options.engine)?;
        Self::connect_with(options, driver.as_ref())
    }

    /// Connect through a caller-supplied driver.
    ///
    /// Up to `retry_attempts` attempts are made, sleeping `retry_delay` between
    /// consecutive attempts (never after the last one). Setup failures after the
    /// native connect (charset, autocommit, identity) also count as a failed attempt.
    ///
    /// # Errors
    /// `ConfigError` for invalid options; `ConnectionError` wrapping the last attempt's
    /// error and the attempt count.
    pub fn connect_with(
        options: ConnectionOptions,
        driver: &dyn Driver,
    ) -> Result<Self, DbManagerError> {
        options.validate()?;
        let attempts = options.retry_attempts;
        let started = Instant::now();
        let mut last_error = None;

        for attempt in 1..=attempts {
            tracing::debug!(
                attempt,
                attempts,
                engine = ?driver.engine(),
                host = %options.host,
                "connecting"
            );
            let connected = driver
                .connect(&options)
                .and_then(|adapter| Connection::establish(adapter, &options));
            match connected {
                Ok(connection) => {
                    tracing::debug!(attempt, elapsed = ?started.elapsed(), "connect succeeded");
                    return Ok(Self {
                        options,
                        connection: Some(connection),
                    });
                }
                Err(err) => {
                    tracing::warn!(attempt, attempts, "connection attempt failed: {err}");
                    last_error = Some(err);
                }
            }
            if attempt < attempts {
                std::thread::sleep(options.retry_delay);
            }
        }

        tracing::error!(
            attempts,
            elapsed = ?started.elapsed(),
            host = %options.host,
            "giving up on connection"
        );
        let source = last_error.unwrap_or_else(|| {
            DbManagerError::ConnectFailed("no connection attempt was made".into())
        });
        Err(DbManagerError::ConnectionError {
            attempts,
            source: Box::new(source),
        })
    }

    /// The live connection.
    ///
    /// # Errors
    /// `NotConnected` after [`ConnectionManager::close`].
    pub fn connection(&mut self) -> Result<&mut Connection, DbManagerError> {
        self.connection.as_mut().ok_or(DbManagerError::NotConnected)
    }

    /// # Errors
    /// `NotConnected` after [`ConnectionManager::close`].
    pub fn connection_info(&self) -> Result<&ConnectionInfo, DbManagerError> {
        self.connection
            .as_ref()
            .map(Connection::connection_info)
            .ok_or(DbManagerError::NotConnected)
    }

    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Close and drop the connection. Safe to call any number of times.
    ///
    /// # Errors
    /// The first failure from rolling back an open transaction or releasing the
    /// handle; the manager is disconnected either way.
    pub fn close(&mut self) -> Result<(), DbManagerError> {
        match self.connection.take() {
            Some(mut connection) => connection.close(),
            None => Ok(()),
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!("error while closing connection manager: {err}");
        }
    }
}
