use rusqlite::Connection;

use crate::adapter::{Driver, NativeAdapter};
use crate::config::ConnectionOptions;
use crate::error::DbManagerError;
use crate::types::Engine;

use super::connection::SqliteAdapter;

/// Path that opens a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Opens `SQLite` databases. `database` is the file path (or `:memory:`); host and
/// credentials are only recorded for connection info.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn connect(
        &self,
        options: &ConnectionOptions,
    ) -> Result<Box<dyn NativeAdapter>, DbManagerError> {
        let conn = open(&options.database)?;
        if let Some(timeout) = options.timeout {
            conn.busy_timeout(timeout)?;
        }
        Ok(Box::new(SqliteAdapter::new(
            conn,
            options.database.clone(),
            options.username.clone(),
        )))
    }
}

/// Open `path`, or an in-memory database for [`MEMORY_PATH`].
///
/// # Errors
/// Returns `DbManagerError::SqliteError` if the database cannot be opened.
pub fn open(path: &str) -> Result<Connection, DbManagerError> {
    let conn = if path == MEMORY_PATH {
        Connection::open_in_memory()?
    } else {
        Connection::open(path)?
    };
    Ok(conn)
}
