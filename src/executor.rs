use crate::adapter::{NativeAdapter, NativeOutcome};
use crate::error::DbManagerError;
use crate::placeholders::{PlaceholderStyle, count_placeholders};
use crate::types::PreparedParameter;

/// Run one statement through `adapter`.
///
/// The `?` count is checked before anything reaches the backend. Failures come back with the statement attached.
pub(crate) fn run<'a>(
    adapter: &'a mut dyn NativeAdapter,
    sql: &str,
    params: &[PreparedParameter],
) -> Result<NativeOutcome<'a>, DbManagerError> {
    check_parameter_count(adapter, sql, params)?;
    tracing::debug!(engine = ?adapter.engine(), params = params.len(), "execute: {sql}");
    adapter.execute(sql, params).map_err(|e| e.with_sql(sql))
}

/// Run a parameterless script.
pub(crate) fn run_batch(adapter: &mut dyn NativeAdapter, sql: &str) -> Result<(), DbManagerError> {
    tracing::debug!(engine = ?adapter.engine(), "execute batch: {sql}");
    adapter.execute_batch(sql).map_err(|e| e.with_sql(sql))
}

fn check_parameter_count(
    adapter: &dyn NativeAdapter,
    sql: &str,
    params: &[PreparedParameter],
) -> Result<(), DbManagerError> {
    let style = adapter.capabilities().placeholders;
    // PostgreSQL spells JSON operators with `?`, so parameterless statements run verbatim
    if params.is_empty() && style == PlaceholderStyle::Dollar {
        return Ok(());
    }
    let expected = count_placeholders(sql, style);
    if expected == params.len() {
        Ok(())
    } else {
        Err(DbManagerError::ParameterError(format!(
            "statement has {expected} placeholder(s) but {} parameter(s) were given",
            params.len()
        ))
        .with_sql(sql))
    }
}
