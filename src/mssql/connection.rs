use tiberius::Query;
use tokio::runtime::Runtime;

use crate::adapter::{
    Capabilities, NativeAdapter, NativeOutcome, ServerIdentity, TransactionNesting,
};
use crate::error::DbManagerError;
use crate::placeholders::{PlaceholderStyle, rewrite_placeholders};
use crate::types::{Engine, PreparedParameter};

use super::config::MssqlClient;
use super::params::bind_query_params;
use super::query::{
    MssqlResult, accepts_rowcount_probe, column_fields, is_rowcount_probe, use_database,
    with_rowcount_probe,
};
use super::transaction;

const CAPABILITIES: Capabilities = Capabilities {
    nesting: TransactionNesting::Emulated,
    persistent_connections: false,
    buffered_results: false,
    placeholders: PlaceholderStyle::AtP,
};

/// SQL Server adapter over one tiberius client.
///
/// Autocommit off maps to `IMPLICIT_TRANSACTIONS`, so the server opens the
/// transaction itself on the next statement.
pub struct MssqlAdapter {
    runtime: Runtime,
    client: Option<MssqlClient>,
    server: String,
    charset: String,
}

impl MssqlAdapter {
    #[must_use]
    pub fn new(runtime: Runtime, client: MssqlClient, server: String) -> Self {
        Self {
            runtime,
            client: Some(client),
            server,
            charset: "UTF-8".to_owned(),
        }
    }

    fn parts(&mut self) -> Result<(&Runtime, &mut MssqlClient), DbManagerError> {
        let client = self.client.as_mut().ok_or(DbManagerError::NotConnected)?;
        Ok((&self.runtime, client))
    }

    fn directive(&mut self, sql: &str) -> Result<(), DbManagerError> {
        let (runtime, client) = self.parts()?;
        transaction::run_directive(runtime, client, sql)
    }

    fn query_strings(&mut self, sql: &str) -> Result<Vec<String>, DbManagerError> {
        let (runtime, client) = self.parts()?;
        let row = runtime
            .block_on(async { Query::new(sql.to_owned()).query(client).await?.into_row().await })?
            .ok_or_else(|| DbManagerError::execution(format!("no row returned by {sql}")))?;
        Ok((0..row.len())
            .map(|idx| {
                row.try_get::<&str, _>(idx)
                    .ok()
                    .flatten()
                    .unwrap_or_default()
                    .to_owned()
            })
            .collect())
    }
}

fn is_utf8(charset: &str) -> bool {
    let normalized: String = charset
        .chars()
        .filter(|c| !matches!(c, '-' | '_'))
        .collect::<String>()
        .to_ascii_lowercase();
    matches!(normalized.as_str(), "utf8" | "utf8mb4" | "unicode")
}

impl NativeAdapter for MssqlAdapter {
    fn engine(&self) -> Engine {
        Engine::Mssql
    }

    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    fn set_charset(&mut self, charset: &str) -> Result<(), DbManagerError> {
        // TDS carries text as UCS-2/UTF-16; the client hands out UTF-8 strings
        if is_utf8(charset) {
            self.charset = "UTF-8".to_owned();
            Ok(())
        } else {
            Err(DbManagerError::Unsupported(format!(
                "charset '{charset}' is not supported; SQL Server text is exchanged as UTF-8"
            )))
        }
    }

    fn charset(&self) -> String {
        self.charset.clone()
    }

    fn set_autocommit(&mut self, enabled: bool) -> Result<(), DbManagerError> {
        let (runtime, client) = self.parts()?;
        if enabled {
            transaction::commit(runtime, client)?;
        }
        transaction::set_implicit_transactions(runtime, client, !enabled)
    }

    fn describe(&mut self) -> Result<ServerIdentity, DbManagerError> {
        let values =
            self.query_strings("SELECT CAST(@@SERVERNAME AS NVARCHAR(256)), SYSTEM_USER, @@VERSION")?;
        let mut values = values.into_iter();
        let reported = values.next().unwrap_or_default();
        Ok(ServerIdentity {
            server: if reported.is_empty() {
                self.server.clone()
            } else {
                reported
            },
            user: values.next().unwrap_or_default(),
            version: values.next().unwrap_or_default(),
        })
    }

    fn execute(
        &mut self,
        sql: &str,
        params: &[PreparedParameter],
    ) -> Result<NativeOutcome<'_>, DbManagerError> {
        let sql = if params.is_empty() {
            std::borrow::Cow::Borrowed(sql)
        } else {
            rewrite_placeholders(sql, PlaceholderStyle::AtP)
        };
        let (runtime, client) = self.parts()?;

        if !accepts_rowcount_probe(&sql) {
            let mut query = Query::new(sql.into_owned());
            bind_query_params(&mut query, params);
            let result = runtime.block_on(query.execute(client))?;
            return Ok(NativeOutcome::Affected(result.total()));
        }

        let mut query = Query::new(with_rowcount_probe(&sql));
        bind_query_params(&mut query, params);
        let mut stream = runtime.block_on(query.query(client))?;
        let columns = runtime.block_on(stream.columns())?.map(|cols| {
            if is_rowcount_probe(cols) {
                None
            } else {
                Some(column_fields(cols))
            }
        });

        match columns {
            Some(Some(fields)) => Ok(NativeOutcome::Rows(Box::new(MssqlResult::new(
                runtime,
                stream.into_row_stream(),
                fields,
            )))),
            Some(None) => {
                let row = runtime.block_on(stream.into_row())?;
                let affected = row
                    .and_then(|r| r.try_get::<i64, _>(0).ok().flatten())
                    .unwrap_or(0);
                Ok(NativeOutcome::Affected(u64::try_from(affected).unwrap_or(0)))
            }
            None => Ok(NativeOutcome::Affected(0)),
        }
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), DbManagerError> {
        let (runtime, client) = self.parts()?;
        runtime.block_on(async { client.simple_query(sql.to_owned()).await?.into_results().await })?;
        Ok(())
    }

    fn begin(&mut self) -> Result<(), DbManagerError> {
        let (runtime, client) = self.parts()?;
        transaction::begin(runtime, client)
    }

    fn commit(&mut self) -> Result<(), DbManagerError> {
        let (runtime, client) = self.parts()?;
        transaction::commit(runtime, client)
    }

    fn rollback(&mut self) -> Result<(), DbManagerError> {
        let (runtime, client) = self.parts()?;
        transaction::rollback(runtime, client)
    }

    fn begin_scope(&mut self, name: &str) -> Result<(), DbManagerError> {
        let (runtime, client) = self.parts()?;
        transaction::save(runtime, client, name)
    }

    fn commit_scope(&mut self, name: &str) -> Result<(), DbManagerError> {
        tracing::debug!(scope = name, "mssql: savepoints are not released");
        Ok(())
    }

    fn rollback_scope(&mut self, name: &str) -> Result<(), DbManagerError> {
        let (runtime, client) = self.parts()?;
        transaction::rollback_to(runtime, client, name)
    }

    fn last_insert_id(&mut self) -> Result<i64, DbManagerError> {
        let (runtime, client) = self.parts()?;
        let row = runtime.block_on(async {
            Query::new("SELECT CAST(@@IDENTITY AS BIGINT)")
                .query(client)
                .await?
                .into_row()
                .await
        })?;
        Ok(row
            .and_then(|r| r.try_get::<i64, _>(0).ok().flatten())
            .unwrap_or(0))
    }

    fn select_db(&mut self, database: &str) -> Result<(), DbManagerError> {
        self.directive(&use_database(database))
    }

    fn close(&mut self) -> Result<(), DbManagerError> {
        if let Some(client) = self.client.take() {
            self.runtime.block_on(client.close())?;
        }
        Ok(())
    }
}
