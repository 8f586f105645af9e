use std::collections::VecDeque;

use rusqlite::Statement;
use rusqlite::types::Value;

use crate::adapter::NativeResult;
use crate::error::DbManagerError;
use crate::results::FieldInfo;
use crate::types::RowValues;

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
/// Returns `DbManagerError::SqliteError` if the value cannot be read.
pub fn sqlite_extract_value(row: &rusqlite::Row, idx: usize) -> Result<RowValues, DbManagerError> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

/// A fully buffered `SQLite` result. rusqlite statements borrow the connection, so
/// rows are read out when the statement runs and the count is known up front.
#[derive(Debug)]
pub struct SqliteResult {
    columns: Vec<FieldInfo>,
    rows: VecDeque<Vec<RowValues>>,
    total: u64,
}

impl SqliteResult {
    /// Run a row-producing statement and buffer every row.
    ///
    /// # Errors
    /// Returns `DbManagerError::SqliteError` if execution or extraction fails.
    pub fn collect(stmt: &mut Statement<'_>, params: &[Value]) -> Result<Self, DbManagerError> {
        let columns: Vec<FieldInfo> = stmt
            .column_names()
            .iter()
            .enumerate()
            .map(|(ordinal, name)| FieldInfo::new(*name, ordinal, None))
            .collect();
        let col_count = columns.len();

        let mut rows_iter = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        let mut rows = VecDeque::new();
        while let Some(row) = rows_iter.next()? {
            let mut row_values = Vec::with_capacity(col_count);
            for i in 0..col_count {
                row_values.push(sqlite_extract_value(row, i)?);
            }
            rows.push_back(row_values);
        }

        let total = rows.len() as u64;
        Ok(Self {
            columns,
            rows,
            total,
        })
    }
}

impl NativeResult for SqliteResult {
    fn columns(&self) -> &[FieldInfo] {
        &self.columns
    }

    fn fetch_row(&mut self) -> Result<Option<Vec<RowValues>>, DbManagerError> {
        Ok(self.rows.pop_front())
    }

    fn row_count(&self) -> Option<u64> {
        Some(self.total)
    }
}
