use std::pin::Pin;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::runtime::Runtime;
use tokio_postgres::{Row, RowStream, Statement};

use crate::adapter::NativeResult;
use crate::error::DbManagerError;
use crate::results::FieldInfo;
use crate::types::RowValues;

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns `DbManagerError` if the column cannot be decoded.
pub fn postgres_extract_value(row: &Row, idx: usize) -> Result<RowValues, DbManagerError> {
    let type_name = row.columns()[idx].type_().name();
    let value = match type_name {
        "int2" => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| RowValues::Int(i64::from(v))),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| RowValues::Int(i64::from(v))),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.map(RowValues::Int),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| RowValues::Float(f64::from(v))),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.map(RowValues::Float),
        "bool" => row.try_get::<_, Option<bool>>(idx)?.map(RowValues::Bool),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(RowValues::Timestamp),
        "timestamptz" => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|v| RowValues::Timestamp(v.naive_utc())),
        "date" => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|v| RowValues::Text(v.format("%Y-%m-%d").to_string())),
        "json" | "jsonb" => row.try_get::<_, Option<Value>>(idx)?.map(RowValues::JSON),
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(RowValues::Blob),
        // text-like types; anything else must be cast to text in the query
        _ => row.try_get::<_, Option<String>>(idx)?.map(RowValues::Text),
    };
    Ok(value.unwrap_or(RowValues::Null))
}

/// Column metadata from a prepared statement.
#[must_use]
pub fn statement_fields(stmt: &Statement) -> Vec<FieldInfo> {
    stmt.columns()
        .iter()
        .enumerate()
        .map(|(ordinal, col)| {
            FieldInfo::new(col.name(), ordinal, Some(col.type_().name().to_owned()))
        })
        .collect()
}

/// Streaming result: rows are pulled from the server one at a time by blocking on
/// the adapter's runtime.
pub struct PostgresResult<'a> {
    runtime: &'a Runtime,
    stream: Pin<Box<RowStream>>,
    columns: Vec<FieldInfo>,
    finished: bool,
}

impl<'a> PostgresResult<'a> {
    #[must_use]
    pub fn new(runtime: &'a Runtime, stream: RowStream, columns: Vec<FieldInfo>) -> Self {
        Self {
            runtime,
            stream: Box::pin(stream),
            columns,
            finished: false,
        }
    }
}

impl NativeResult for PostgresResult<'_> {
    fn columns(&self) -> &[FieldInfo] {
        &self.columns
    }

    fn fetch_row(&mut self) -> Result<Option<Vec<RowValues>>, DbManagerError> {
        if self.finished {
            return Ok(None);
        }
        let Some(row) = self.runtime.block_on(self.stream.next()) else {
            self.finished = true;
            return Ok(None);
        };
        let row = row?;
        let mut values = Vec::with_capacity(self.columns.len());
        for idx in 0..self.columns.len() {
            values.push(postgres_extract_value(&row, idx)?);
        }
        Ok(Some(values))
    }
}
