use std::future::Future;

use tiberius::{AuthMethod, Client, Config as TiberiusConfig, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::adapter::{Driver, NativeAdapter, blocking_runtime};
use crate::config::ConnectionOptions;
use crate::error::DbManagerError;
use crate::types::Engine;

use super::connection::MssqlAdapter;

/// Type alias for SQL Server client
pub type MssqlClient = Client<Compat<TcpStream>>;

/// Connects to SQL Server with SQL authentication. A host written as
/// `server\INSTANCE` is resolved through the SQL Browser service.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDriver;

impl Driver for MssqlDriver {
    fn engine(&self) -> Engine {
        Engine::Mssql
    }

    fn connect(
        &self,
        options: &ConnectionOptions,
    ) -> Result<Box<dyn NativeAdapter>, DbManagerError> {
        let runtime = blocking_runtime()?;
        let (host, instance) = split_instance(&options.host);
        let port = options.effective_port().unwrap_or(1433);
        let config = build_tiberius_config(options, host, instance, port);

        let client =
            runtime.block_on(with_timeout(options, open_client(config, instance.is_some())))?;
        let server = match instance {
            Some(name) => format!("{host}\\{name}"),
            None => format!("{host}:{port}"),
        };
        Ok(Box::new(MssqlAdapter::new(runtime, client, server)))
    }
}

/// `server\INSTANCE` into its host and instance parts.
#[must_use]
pub fn split_instance(host: &str) -> (&str, Option<&str>) {
    match host.split_once('\\') {
        Some((server, instance)) if !instance.is_empty() => (server, Some(instance)),
        Some((server, _)) => (server, None),
        None => (host, None),
    }
}

#[must_use]
pub fn build_tiberius_config(
    options: &ConnectionOptions,
    host: &str,
    instance: Option<&str>,
    port: u16,
) -> TiberiusConfig {
    let mut config = TiberiusConfig::new();
    config.host(host);
    config.port(port);
    if !options.database.is_empty() {
        config.database(&options.database);
    }
    config.authentication(AuthMethod::sql_server(&options.username, &options.password));
    if let Some(instance) = instance {
        config.instance_name(instance);
    }
    config.application_name("db-manager");
    config.trust_cert();
    config
}

async fn open_client(config: TiberiusConfig, named: bool) -> Result<MssqlClient, DbManagerError> {
    let tcp = if named {
        TcpStream::connect_named(&config).await?
    } else {
        TcpStream::connect(config.get_addr()).await?
    };
    tcp.set_nodelay(true)?;
    Ok(Client::connect(config, tcp.compat_write()).await?)
}

async fn with_timeout<T>(
    options: &ConnectionOptions,
    fut: impl Future<Output = Result<T, DbManagerError>>,
) -> Result<T, DbManagerError> {
    match options.timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            DbManagerError::ConnectFailed(format!(
                "timed out after {limit:?} connecting to {}",
                options.host
            ))
        })?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_instance_is_split_from_host() {
        assert_eq!(split_instance(r"db1\SQLEXPRESS"), ("db1", Some("SQLEXPRESS")));
        assert_eq!(split_instance("db1"), ("db1", None));
        assert_eq!(split_instance("db1\\"), ("db1", None));
    }

    #[test]
    fn config_targets_host_and_port() {
        let opts = ConnectionOptions::builder(Engine::Mssql, "db1", "sa", "pw", "app")
            .finish()
            .unwrap();
        let config = build_tiberius_config(&opts, "db1", None, 1444);
        assert_eq!(config.get_addr(), "db1:1444");
    }
}
