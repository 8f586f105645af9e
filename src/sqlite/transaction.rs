//! `SQLite` transaction directives. Nested scopes are savepoints.

use rusqlite::Connection;

use crate::error::DbManagerError;

/// Open a transaction unless one is already open (an implicit one is adopted).
pub(crate) fn begin(conn: &Connection) -> Result<(), DbManagerError> {
    if conn.is_autocommit() {
        conn.execute_batch("BEGIN")?;
    }
    Ok(())
}

pub(crate) fn commit(conn: &Connection) -> Result<(), DbManagerError> {
    if !conn.is_autocommit() {
        conn.execute_batch("COMMIT")?;
    }
    Ok(())
}

pub(crate) fn rollback(conn: &Connection) -> Result<(), DbManagerError> {
    if !conn.is_autocommit() {
        conn.execute_batch("ROLLBACK")?;
    }
    Ok(())
}

pub(crate) fn savepoint(conn: &Connection, name: &str) -> Result<(), DbManagerError> {
    conn.execute_batch(&format!("SAVEPOINT {}", quote_ident(name)))?;
    Ok(())
}

pub(crate) fn release_savepoint(conn: &Connection, name: &str) -> Result<(), DbManagerError> {
    conn.execute_batch(&format!("RELEASE SAVEPOINT {}", quote_ident(name)))?;
    Ok(())
}

/// Undo everything since the savepoint, then drop it from the savepoint stack.
pub(crate) fn rollback_to_savepoint(conn: &Connection, name: &str) -> Result<(), DbManagerError> {
    let name = quote_ident(name);
    conn.execute_batch(&format!(
        "ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}"
    ))?;
    Ok(())
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
