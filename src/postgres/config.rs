use tokio_postgres::NoTls;

use crate::adapter::{Driver, NativeAdapter, blocking_runtime};
use crate::config::ConnectionOptions;
use crate::error::DbManagerError;
use crate::types::Engine;

use super::connection::PostgresAdapter;

/// Connects to `PostgreSQL` without TLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver;

impl Driver for PostgresDriver {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    fn connect(
        &self,
        options: &ConnectionOptions,
    ) -> Result<Box<dyn NativeAdapter>, DbManagerError> {
        let runtime = blocking_runtime()?;
        let port = options.effective_port().unwrap_or(5432);
        let config = pg_config(options, port);

        let (client, connection) = runtime.block_on(config.connect(NoTls))?;
        let connection_task = runtime.spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!("postgres connection error: {err}");
            }
        });

        Ok(Box::new(PostgresAdapter::new(
            runtime,
            client,
            connection_task,
            format!("{}:{port}", options.host),
        )))
    }
}

/// Translate connection options into a `tokio_postgres::Config`.
#[must_use]
pub fn pg_config(options: &ConnectionOptions, port: u16) -> tokio_postgres::Config {
    let mut config = tokio_postgres::Config::new();
    config
        .host(&options.host)
        .port(port)
        .user(&options.username)
        .password(&options.password)
        .dbname(&options.database)
        .application_name("db-manager");
    if let Some(timeout) = options.timeout {
        config.connect_timeout(timeout);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn config_carries_options() {
        let opts = ConnectionOptions::builder(Engine::Postgres, "db1", "u", "p", "app")
            .timeout(Duration::from_secs(3))
            .finish()
            .unwrap();
        let config = pg_config(&opts, 5433);
        assert_eq!(config.get_user(), Some("u"));
        assert_eq!(config.get_dbname(), Some("app"));
        assert_eq!(config.get_ports(), &[5433]);
        assert_eq!(config.get_connect_timeout(), Some(&Duration::from_secs(3)));
    }
}
