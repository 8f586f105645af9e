//! SQL Server transaction directives. Nested scopes are `SAVE TRANSACTION`
//! savepoints; SQL Server has no savepoint release, so committing a scope is a no-op.
//!
//! With `IMPLICIT_TRANSACTIONS ON`, `BEGIN TRANSACTION` opens the implicit transaction
//! as well as the explicit one and `@@TRANCOUNT` reaches 2, so the outer commit
//! drains every level.

use tiberius::Query;
use tokio::runtime::Runtime;

use super::config::MssqlClient;
use crate::error::DbManagerError;

pub(crate) fn run_directive(
    runtime: &Runtime,
    client: &mut MssqlClient,
    sql: &str,
) -> Result<(), DbManagerError> {
    tracing::debug!("mssql directive: {sql}");
    runtime.block_on(Query::new(sql.to_owned()).execute(client))?;
    Ok(())
}

pub(crate) fn set_implicit_transactions(
    runtime: &Runtime,
    client: &mut MssqlClient,
    on: bool,
) -> Result<(), DbManagerError> {
    let sql = if on {
        "SET IMPLICIT_TRANSACTIONS ON"
    } else {
        "SET IMPLICIT_TRANSACTIONS OFF"
    };
    run_directive(runtime, client, sql)
}

const BEGIN: &str = "IF @@TRANCOUNT = 0 BEGIN TRANSACTION";
const COMMIT: &str = "WHILE @@TRANCOUNT > 0 COMMIT TRANSACTION";
// an unnamed rollback always returns @@TRANCOUNT to 0
const ROLLBACK: &str = "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION";

/// Starts a transaction unless an implicit one is already open.
pub(crate) fn begin(runtime: &Runtime, client: &mut MssqlClient) -> Result<(), DbManagerError> {
    run_directive(runtime, client, BEGIN)
}

pub(crate) fn commit(runtime: &Runtime, client: &mut MssqlClient) -> Result<(), DbManagerError> {
    run_directive(runtime, client, COMMIT)
}

pub(crate) fn rollback(runtime: &Runtime, client: &mut MssqlClient) -> Result<(), DbManagerError> {
    run_directive(runtime, client, ROLLBACK)
}

pub(crate) fn save(
    runtime: &Runtime,
    client: &mut MssqlClient,
    name: &str,
) -> Result<(), DbManagerError> {
    run_directive(runtime, client, &format!("SAVE TRANSACTION {}", quote_ident(name)))
}

pub(crate) fn rollback_to(
    runtime: &Runtime,
    client: &mut MssqlClient,
    name: &str,
) -> Result<(), DbManagerError> {
    run_directive(
        runtime,
        client,
        &format!("ROLLBACK TRANSACTION {}", quote_ident(name)),
    )
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}
