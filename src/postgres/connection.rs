use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tokio_postgres::Client;
use tokio_postgres::types::ToSql;

use crate::adapter::{
    Capabilities, NativeAdapter, NativeOutcome, ServerIdentity, TransactionNesting,
};
use crate::error::DbManagerError;
use crate::placeholders::{PlaceholderStyle, rewrite_placeholders};
use crate::types::{Engine, PreparedParameter};

use super::query::{PostgresResult, statement_fields};
use super::transaction;

const CAPABILITIES: Capabilities = Capabilities {
    nesting: TransactionNesting::Flat,
    persistent_connections: false,
    buffered_results: false,
    placeholders: PlaceholderStyle::Dollar,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// `PostgreSQL` adapter. Owns the runtime, the client, and the task driving the
/// client's connection.
///
/// With autocommit off, the first statement outside a transaction issues `BEGIN`;
/// that transaction is adopted by a later `begin`.
pub struct PostgresAdapter {
    runtime: Runtime,
    client: Option<Client>,
    connection_task: Option<JoinHandle<()>>,
    server: String,
    autocommit: bool,
    in_transaction: bool,
    charset: String,
}

impl PostgresAdapter {
    #[must_use]
    pub fn new(
        runtime: Runtime,
        client: Client,
        connection_task: JoinHandle<()>,
        server: String,
    ) -> Self {
        Self {
            runtime,
            client: Some(client),
            connection_task: Some(connection_task),
            server,
            autocommit: true,
            in_transaction: false,
            charset: "UTF8".to_owned(),
        }
    }

    fn client(&self) -> Result<&Client, DbManagerError> {
        self.client.as_ref().ok_or(DbManagerError::NotConnected)
    }

    fn ensure_implicit_transaction(&mut self) -> Result<(), DbManagerError> {
        if !self.autocommit && !self.in_transaction {
            tracing::debug!("postgres: opening implicit transaction");
            transaction::begin(&self.runtime, self.client()?)?;
            self.in_transaction = true;
        }
        Ok(())
    }

    fn query_scalar<T>(&self, sql: &str) -> Result<T, DbManagerError>
    where
        T: for<'r> tokio_postgres::types::FromSql<'r>,
    {
        let client = self.client()?;
        let row = self.runtime.block_on(client.query_one(sql, &[]))?;
        Ok(row.try_get(0_usize)?)
    }
}

fn is_utf8(charset: &str) -> bool {
    let normalized: String = charset
        .chars()
        .filter(|c| !matches!(c, '-' | '_'))
        .collect::<String>()
        .to_ascii_lowercase();
    matches!(normalized.as_str(), "utf8" | "unicode")
}

impl NativeAdapter for PostgresAdapter {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    fn set_charset(&mut self, charset: &str) -> Result<(), DbManagerError> {
        // tokio-postgres decodes text as UTF-8 only
        if !is_utf8(charset) {
            return Err(DbManagerError::Unsupported(format!(
                "client encoding '{charset}' is not supported; the client requires UTF8"
            )));
        }
        let client = self.client()?;
        self.runtime
            .block_on(client.batch_execute("SET client_encoding TO 'UTF8'"))?;
        self.charset = self.query_scalar::<String>("SHOW client_encoding")?;
        Ok(())
    }

    fn charset(&self) -> String {
        self.charset.clone()
    }

    fn default_charset(&self) -> &'static str {
        "UTF8"
    }

    fn set_autocommit(&mut self, enabled: bool) -> Result<(), DbManagerError> {
        if enabled && self.in_transaction {
            transaction::commit(&self.runtime, self.client()?)?;
            self.in_transaction = false;
        }
        self.autocommit = enabled;
        Ok(())
    }

    fn describe(&mut self) -> Result<ServerIdentity, DbManagerError> {
        Ok(ServerIdentity {
            server: self.server.clone(),
            user: self.query_scalar::<String>("SELECT current_user::text")?,
            version: self.query_scalar::<String>("SHOW server_version")?,
        })
    }

    fn execute(
        &mut self,
        sql: &str,
        params: &[PreparedParameter],
    ) -> Result<NativeOutcome<'_>, DbManagerError> {
        self.ensure_implicit_transaction()?;
        let sql = if params.is_empty() {
            std::borrow::Cow::Borrowed(sql)
        } else {
            rewrite_placeholders(sql, PlaceholderStyle::Dollar)
        };
        let client = self.client()?;
        let stmt = self.runtime.block_on(client.prepare(&sql))?;
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        if stmt.columns().is_empty() {
            let affected = self.runtime.block_on(client.execute(&stmt, &refs))?;
            return Ok(NativeOutcome::Affected(affected));
        }

        let columns = statement_fields(&stmt);
        let stream = self
            .runtime
            .block_on(client.query_raw(&stmt, refs.iter().copied()))?;
        Ok(NativeOutcome::Rows(Box::new(PostgresResult::new(
            &self.runtime,
            stream,
            columns,
        ))))
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), DbManagerError> {
        self.ensure_implicit_transaction()?;
        let client = self.client()?;
        self.runtime.block_on(client.batch_execute(sql))?;
        Ok(())
    }

    fn begin(&mut self) -> Result<(), DbManagerError> {
        if !self.in_transaction {
            transaction::begin(&self.runtime, self.client()?)?;
            self.in_transaction = true;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbManagerError> {
        if self.in_transaction {
            transaction::commit(&self.runtime, self.client()?)?;
            self.in_transaction = false;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbManagerError> {
        if self.in_transaction {
            // the server ends the transaction even when ROLLBACK reports an error
            self.in_transaction = false;
            transaction::rollback(&self.runtime, self.client()?)?;
        }
        Ok(())
    }

    fn last_insert_id(&mut self) -> Result<i64, DbManagerError> {
        self.query_scalar::<i64>("SELECT lastval()")
    }

    fn close(&mut self) -> Result<(), DbManagerError> {
        // dropping the client ends the connection future
        if self.client.take().is_none() {
            return Ok(());
        }
        if let Some(task) = self.connection_task.take() {
            let finished = self
                .runtime
                .block_on(async { tokio::time::timeout(SHUTDOWN_GRACE, task).await });
            if finished.is_err() {
                tracing::warn!("postgres connection task did not finish within {SHUTDOWN_GRACE:?}");
            }
        }
        Ok(())
    }
}
