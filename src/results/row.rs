use std::collections::HashMap;
use std::sync::Arc;

use crate::types::RowValues;

/// Row returned in the `object` fetch shape.
///
/// Column names and the name-to-index map are shared by every row of one cursor.
#[derive(Debug, Clone)]
pub struct ObjectRow {
    /// The column names for this row (shared across all rows of a cursor)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row
    pub values: Vec<RowValues>,
    column_index: Arc<HashMap<String, usize>>,
}

impl ObjectRow {
    /// Create a row, building its own column index.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<RowValues>) -> Self {
        let column_index = Arc::new(index_columns(&column_names));
        Self {
            column_names,
            values,
            column_index,
        }
    }

    pub(crate) fn with_index(
        column_names: Arc<Vec<String>>,
        column_index: Arc<HashMap<String, usize>>,
        values: Vec<RowValues>,
    ) -> Self {
        Self {
            column_names,
            values,
            column_index,
        }
    }

    /// Index of a column by name, or `None` if the row has no such column.
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index.get(column_name) {
            return Some(idx);
        }
        self.column_names.iter().position(|col| col == column_name)
    }

    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.get_column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.values.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One fetched row in the shape the caller asked for.
#[derive(Debug, Clone)]
pub enum FetchedRow {
    /// Column name to value. With duplicate column names the last one wins.
    Assoc(HashMap<String, RowValues>),
    /// Values in select-list order.
    Indexed(Vec<RowValues>),
    Object(ObjectRow),
}

impl FetchedRow {
    /// Value by column name; `None` for indexed rows or unknown columns.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        match self {
            FetchedRow::Assoc(map) => map.get(column_name),
            FetchedRow::Indexed(_) => None,
            FetchedRow::Object(row) => row.get(column_name),
        }
    }

    /// Value by position; `None` for associative rows.
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        match self {
            FetchedRow::Assoc(_) => None,
            FetchedRow::Indexed(values) => values.get(index),
            FetchedRow::Object(row) => row.get_by_index(index),
        }
    }

    #[must_use]
    pub fn into_assoc(self) -> Option<HashMap<String, RowValues>> {
        match self {
            FetchedRow::Assoc(map) => Some(map),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_indexed(self) -> Option<Vec<RowValues>> {
        match self {
            FetchedRow::Indexed(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_object(self) -> Option<ObjectRow> {
        match self {
            FetchedRow::Object(row) => Some(row),
            _ => None,
        }
    }
}

pub(crate) fn index_columns(column_names: &[String]) -> HashMap<String, usize> {
    // first occurrence wins for name lookups on object rows
    let mut index = HashMap::with_capacity(column_names.len());
    for (i, name) in column_names.iter().enumerate() {
        index.entry(name.clone()).or_insert(i);
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_row_lookups() {
        let cols = Arc::new(vec!["id".to_string(), "name".to_string()]);
        let row = ObjectRow::new(cols, vec![RowValues::Int(7), RowValues::Text("x".into())]);
        assert_eq!(row.get("name"), Some(&RowValues::Text("x".into())));
        assert_eq!(row.get_by_index(0), Some(&RowValues::Int(7)));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn fetched_row_accessors_follow_shape() {
        let row = FetchedRow::Indexed(vec![RowValues::Int(1)]);
        assert_eq!(row.get("id"), None);
        assert_eq!(row.get_by_index(0), Some(&RowValues::Int(1)));
        assert!(row.into_assoc().is_none());
    }
}
