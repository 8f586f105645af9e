use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures_util::TryStreamExt;
use futures_util::stream::BoxStream;
use regex::Regex;
use tiberius::numeric::Numeric;
use tiberius::{Column, Row, Uuid};
use tokio::runtime::Runtime;

use crate::adapter::NativeResult;
use crate::error::DbManagerError;
use crate::results::FieldInfo;
use crate::types::RowValues;

/// Column carrying the affected-row count appended after each statement.
pub const ROWCOUNT_COLUMN: &str = "__dbm_rowcount";

// Module definitions must be the only statement in their batch.
static MODULE_DEFINITION: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(create|alter|create\s+or\s+alter)\s+(proc|procedure|view|function|trigger)\b")
        .ok()
});

/// Whether `sql` can be followed by the row-count probe in the same batch.
#[must_use]
pub fn accepts_rowcount_probe(sql: &str) -> bool {
    !MODULE_DEFINITION
        .as_ref()
        .is_some_and(|re| re.is_match(sql))
}

/// `sql` followed by a select of `@@ROWCOUNT`, on its own line so a trailing
/// line comment cannot swallow it.
#[must_use]
pub fn with_rowcount_probe(sql: &str) -> String {
    format!("{sql}\n;SELECT CAST(@@ROWCOUNT AS BIGINT) AS [{ROWCOUNT_COLUMN}]")
}

/// Whether the first result set is the probe rather than rows from the statement.
#[must_use]
pub fn is_rowcount_probe(columns: &[Column]) -> bool {
    columns.len() == 1 && columns[0].name() == ROWCOUNT_COLUMN
}

#[must_use]
pub fn column_fields(columns: &[Column]) -> Vec<FieldInfo> {
    columns
        .iter()
        .enumerate()
        .map(|(ordinal, col)| {
            FieldInfo::new(col.name(), ordinal, Some(format!("{:?}", col.column_type())))
        })
        .collect()
}

macro_rules! try_column {
    ($row:expr, $idx:expr, $ty:ty, $map:expr) => {
        if let Ok(value) = $row.try_get::<$ty, _>($idx) {
            return value.map($map).unwrap_or(RowValues::Null);
        }
    };
}

/// Decode one column. A NULL decodes through whichever type matches the column
/// first; types with no `RowValues` counterpart come back as NULL.
#[must_use]
pub fn extract_value(row: &Row, idx: usize) -> RowValues {
    try_column!(row, idx, u8, |v| RowValues::Int(i64::from(v)));
    try_column!(row, idx, i16, |v| RowValues::Int(i64::from(v)));
    try_column!(row, idx, i32, |v| RowValues::Int(i64::from(v)));
    try_column!(row, idx, i64, RowValues::Int);
    try_column!(row, idx, f32, |v| RowValues::Float(f64::from(v)));
    try_column!(row, idx, f64, RowValues::Float);
    try_column!(row, idx, bool, RowValues::Bool);
    try_column!(row, idx, Numeric, |v| RowValues::Text(v.to_string()));
    try_column!(row, idx, NaiveDateTime, RowValues::Timestamp);
    try_column!(row, idx, DateTime<Utc>, |v| RowValues::Timestamp(
        v.naive_utc()
    ));
    try_column!(row, idx, NaiveDate, |v| RowValues::Text(
        v.format("%Y-%m-%d").to_string()
    ));
    try_column!(row, idx, Uuid, |v| RowValues::Text(v.to_string()));
    try_column!(row, idx, &str, |v| RowValues::Text(v.to_owned()));
    try_column!(row, idx, &[u8], |v| RowValues::Blob(v.to_vec()));
    tracing::debug!(idx, "mssql: column type has no value mapping; reading as NULL");
    RowValues::Null
}

/// Streaming result over the first result set of a batch.
pub struct MssqlResult<'a> {
    runtime: &'a Runtime,
    rows: BoxStream<'a, tiberius::Result<Row>>,
    columns: Vec<FieldInfo>,
    finished: bool,
}

impl<'a> MssqlResult<'a> {
    #[must_use]
    pub fn new(
        runtime: &'a Runtime,
        rows: BoxStream<'a, tiberius::Result<Row>>,
        columns: Vec<FieldInfo>,
    ) -> Self {
        Self {
            runtime,
            rows,
            columns,
            finished: false,
        }
    }
}

impl NativeResult for MssqlResult<'_> {
    fn columns(&self) -> &[FieldInfo] {
        &self.columns
    }

    fn fetch_row(&mut self) -> Result<Option<Vec<RowValues>>, DbManagerError> {
        if self.finished {
            return Ok(None);
        }
        let row = self.runtime.block_on(self.rows.try_next())?;
        // later result sets (the row-count probe) end this one
        let Some(row) = row.filter(|r| r.result_index() == 0) else {
            self.finished = true;
            return Ok(None);
        };
        Ok(Some(
            (0..self.columns.len())
                .map(|idx| extract_value(&row, idx))
                .collect(),
        ))
    }
}

/// `USE` statement for `database`, bracket-quoted.
#[must_use]
pub fn use_database(database: &str) -> String {
    format!("USE [{}]", database.replace(']', "]]"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_definitions_skip_the_probe() {
        assert!(!accepts_rowcount_probe("CREATE PROCEDURE p AS SELECT 1"));
        assert!(!accepts_rowcount_probe("  create or alter view v as select 1"));
        assert!(accepts_rowcount_probe("CREATE TABLE t (id int)"));
        assert!(accepts_rowcount_probe("UPDATE t SET a = 1"));
    }

    #[test]
    fn probe_survives_trailing_comment() {
        let sql = with_rowcount_probe("DELETE FROM t -- all of it");
        assert!(sql.contains("\n;SELECT CAST(@@ROWCOUNT"));
    }

    #[test]
    fn use_quotes_brackets() {
        assert_eq!(use_database("a]b"), "USE [a]]b]");
    }
}
