use rusqlite::Connection;

use crate::adapter::{
    Capabilities, NativeAdapter, NativeOutcome, ServerIdentity, TransactionNesting,
};
use crate::error::DbManagerError;
use crate::placeholders::PlaceholderStyle;
use crate::types::{Engine, PreparedParameter};

use super::params::Params;
use super::query::SqliteResult;
use super::transaction;

const CAPABILITIES: Capabilities = Capabilities {
    nesting: TransactionNesting::Emulated,
    persistent_connections: false,
    buffered_results: true,
    placeholders: PlaceholderStyle::Question,
};

/// `SQLite` adapter over one rusqlite connection.
///
/// With autocommit off, the first statement outside a transaction opens one
/// implicitly; it stays open until committed, rolled back, or autocommit is
/// switched back on.
pub struct SqliteAdapter {
    conn: Option<Connection>,
    path: String,
    username: String,
    autocommit: bool,
    charset: String,
}

impl SqliteAdapter {
    #[must_use]
    pub fn new(conn: Connection, path: String, username: String) -> Self {
        Self {
            conn: Some(conn),
            path,
            username,
            autocommit: true,
            charset: "UTF-8".to_owned(),
        }
    }

    fn conn(&self) -> Result<&Connection, DbManagerError> {
        self.conn.as_ref().ok_or(DbManagerError::NotConnected)
    }

    fn ensure_implicit_transaction(&self) -> Result<(), DbManagerError> {
        let conn = self.conn()?;
        if !self.autocommit && conn.is_autocommit() {
            tracing::debug!("sqlite: opening implicit transaction");
            conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }
}

/// `PRAGMA encoding` name for a requested charset.
fn sqlite_encoding(charset: &str) -> Option<&'static str> {
    let normalized: String = charset
        .chars()
        .filter(|c| !matches!(c, '-' | '_'))
        .collect::<String>()
        .to_ascii_lowercase();
    match normalized.as_str() {
        "utf8" | "utf8mb4" | "utf8mb3" => Some("UTF-8"),
        "utf16" => Some("UTF-16"),
        "utf16le" => Some("UTF-16le"),
        "utf16be" => Some("UTF-16be"),
        _ => None,
    }
}

impl NativeAdapter for SqliteAdapter {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    fn set_charset(&mut self, charset: &str) -> Result<(), DbManagerError> {
        let encoding = sqlite_encoding(charset).ok_or_else(|| {
            DbManagerError::Unsupported(format!("SQLite has no encoding for charset '{charset}'"))
        })?;
        let conn = self.conn()?;
        // only takes effect before the database file has content
        conn.execute_batch(&format!("PRAGMA encoding = '{encoding}'"))?;
        let active: String = conn.query_row("PRAGMA encoding", [], |row| row.get(0))?;
        self.charset = active;
        Ok(())
    }

    fn charset(&self) -> String {
        self.charset.clone()
    }

    fn set_autocommit(&mut self, enabled: bool) -> Result<(), DbManagerError> {
        if enabled {
            transaction::commit(self.conn()?)?;
        }
        self.autocommit = enabled;
        Ok(())
    }

    fn describe(&mut self) -> Result<ServerIdentity, DbManagerError> {
        self.conn()?;
        Ok(ServerIdentity {
            server: format!("sqlite:{}", self.path),
            user: self.username.clone(),
            version: rusqlite::version().to_owned(),
        })
    }

    fn execute(
        &mut self,
        sql: &str,
        params: &[PreparedParameter],
    ) -> Result<NativeOutcome<'_>, DbManagerError> {
        self.ensure_implicit_transaction()?;
        let conn = self.conn()?;
        let values = Params::convert(params);
        let mut stmt = conn.prepare(sql)?;
        if stmt.column_count() == 0 {
            let affected =
                stmt.execute(rusqlite::params_from_iter(values.as_values().iter()))?;
            return Ok(NativeOutcome::Affected(affected as u64));
        }
        let result = SqliteResult::collect(&mut stmt, values.as_values())?;
        Ok(NativeOutcome::Rows(Box::new(result)))
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), DbManagerError> {
        self.ensure_implicit_transaction()?;
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    fn begin(&mut self) -> Result<(), DbManagerError> {
        transaction::begin(self.conn()?)
    }

    fn commit(&mut self) -> Result<(), DbManagerError> {
        transaction::commit(self.conn()?)
    }

    fn rollback(&mut self) -> Result<(), DbManagerError> {
        transaction::rollback(self.conn()?)
    }

    fn begin_scope(&mut self, name: &str) -> Result<(), DbManagerError> {
        transaction::savepoint(self.conn()?, name)
    }

    fn commit_scope(&mut self, name: &str) -> Result<(), DbManagerError> {
        transaction::release_savepoint(self.conn()?, name)
    }

    fn rollback_scope(&mut self, name: &str) -> Result<(), DbManagerError> {
        transaction::rollback_to_savepoint(self.conn()?, name)
    }

    fn last_insert_id(&mut self) -> Result<i64, DbManagerError> {
        Ok(self.conn()?.last_insert_rowid())
    }

    fn close(&mut self) -> Result<(), DbManagerError> {
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, err)| DbManagerError::SqliteError(err)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> SqliteAdapter {
        let conn = Connection::open_in_memory().unwrap();
        SqliteAdapter::new(conn, ":memory:".into(), "tester".into())
    }

    #[test]
    fn charset_mapping() {
        assert_eq!(sqlite_encoding("utf8"), Some("UTF-8"));
        assert_eq!(sqlite_encoding("UTF-8"), Some("UTF-8"));
        assert_eq!(sqlite_encoding("utf16le"), Some("UTF-16le"));
        assert_eq!(sqlite_encoding("latin1"), None);
    }

    #[test]
    fn dml_reports_affected_rows() {
        let mut a = adapter();
        a.execute_batch("create table t (id integer primary key, v text)").unwrap();
        let affected = a
            .execute(
                "insert into t (v) values (?), (?)",
                &[PreparedParameter::string("a"), PreparedParameter::string("b")],
            )
            .unwrap()
            .affected_rows();
        assert_eq!(affected, 2);
        assert_eq!(a.last_insert_id().unwrap(), 2);
    }

    #[test]
    fn implicit_transaction_when_autocommit_off() {
        let mut a = adapter();
        a.execute_batch("create table t (id integer)").unwrap();
        a.set_autocommit(false).unwrap();
        a.execute("insert into t values (1)", &[]).unwrap();
        assert!(!a.conn().unwrap().is_autocommit());
        a.rollback().unwrap();
        a.set_autocommit(true).unwrap();
        let NativeOutcome::Rows(mut rows) = a.execute("select count(*) from t", &[]).unwrap()
        else {
            panic!("expected rows");
        };
        assert_eq!(rows.fetch_row().unwrap(), Some(vec![crate::types::RowValues::Int(0)]));
    }

    #[test]
    fn close_is_idempotent() {
        let mut a = adapter();
        a.close().unwrap();
        a.close().unwrap();
        assert!(matches!(a.last_insert_id(), Err(DbManagerError::NotConnected)));
    }
}
