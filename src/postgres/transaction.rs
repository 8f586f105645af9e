//! `PostgreSQL` transaction directives. Transactions are flat: one at a time.

use tokio::runtime::Runtime;
use tokio_postgres::Client;

use crate::error::DbManagerError;

pub(crate) fn begin(runtime: &Runtime, client: &Client) -> Result<(), DbManagerError> {
    runtime.block_on(client.batch_execute("BEGIN"))?;
    Ok(())
}

pub(crate) fn commit(runtime: &Runtime, client: &Client) -> Result<(), DbManagerError> {
    runtime.block_on(client.batch_execute("COMMIT"))?;
    Ok(())
}

pub(crate) fn rollback(runtime: &Runtime, client: &Client) -> Result<(), DbManagerError> {
    runtime.block_on(client.batch_execute("ROLLBACK"))?;
    Ok(())
}
