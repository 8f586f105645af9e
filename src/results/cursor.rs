use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::field::FieldInfo;
use super::row::{FetchedRow, ObjectRow, index_columns};
use crate::adapter::{NativeOutcome, NativeResult};
use crate::diagnostics::Diagnostics;
use crate::error::{DbManagerError, ErrorReport};
use crate::policy::{ErrorMode, settle};
use crate::types::{FetchShape, MetadataKind, RowValues};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Open,
    /// The end-of-rows sentinel has been handed out and the handle released.
    Drained,
    Closed,
}

/// Forward-only, single-pass cursor over one statement's result.
///
/// The cursor borrows its connection, so the connection cannot run another
/// statement until the cursor is dropped. Exhaustion releases the native handle;
/// the first read past the end returns `Ok(None)`, any later read is a
/// [`DbManagerError::CursorError`], as is any read after [`ResultCursor::close`].
///
/// ```rust,no_run
/// use db_manager::prelude::*;
///
/// # fn run(conn: &mut Connection) -> Result<(), DbManagerError> {
/// let mut cursor = conn.execute("select id, name from users", &[])?;
/// while let Some(row) = cursor.next()? {
///     println!("{:?}", row.get("name"));
/// }
/// # Ok(())
/// # }
/// ```
pub struct ResultCursor<'c> {
    handle: Option<Box<dyn NativeResult + 'c>>,
    diagnostics: &'c mut Diagnostics,
    debug: bool,
    fields: Vec<FieldInfo>,
    column_names: Arc<Vec<String>>,
    column_index: Arc<HashMap<String, usize>>,
    prefetched: VecDeque<Vec<RowValues>>,
    delivered: u64,
    row_count: Option<u64>,
    affected_rows: u64,
    field_cursor: usize,
    state: CursorState,
}

impl<'c> ResultCursor<'c> {
    pub(crate) fn new(
        outcome: NativeOutcome<'c>,
        diagnostics: &'c mut Diagnostics,
        debug: bool,
    ) -> Self {
        let (handle, affected_rows) = match outcome {
            NativeOutcome::Rows(handle) => (Some(handle), 0),
            NativeOutcome::Affected(n) => (None, n),
        };
        let fields = handle
            .as_ref()
            .map(|h| h.columns().to_vec())
            .unwrap_or_default();
        let row_count = match &handle {
            Some(h) => h.row_count(),
            None => Some(0),
        };
        let column_names: Arc<Vec<String>> =
            Arc::new(fields.iter().map(|f| f.name.clone()).collect());
        let column_index = Arc::new(index_columns(&column_names));
        Self {
            handle,
            diagnostics,
            debug,
            fields,
            column_names,
            column_index,
            prefetched: VecDeque::new(),
            delivered: 0,
            row_count,
            affected_rows,
            field_cursor: 0,
            state: CursorState::Open,
        }
    }

    /// Next row in the default (associative) shape.
    ///
    /// # Errors
    /// See [`ResultCursor::next_as`].
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<FetchedRow>, DbManagerError> {
        self.next_as(FetchShape::default())
    }

    /// Next row in `shape`, or `Ok(None)` once, at the end of the result.
    ///
    /// # Errors
    /// `CursorError` after close or after the end was already reported; the backend
    /// error if reading the row fails. Under `debug` any error is fatal.
    pub fn next_as(&mut self, shape: FetchShape) -> Result<Option<FetchedRow>, DbManagerError> {
        let mode = ErrorMode::resolve(None, self.debug);
        self.next_with(shape, mode)
    }

    /// Next row with an explicit error mode. `Ok(None)` is returned both at the end
    /// of the result and, under [`ErrorMode::SilentFalse`], on failure.
    ///
    /// # Errors
    /// Only under [`ErrorMode::Propagate`].
    pub fn next_with(
        &mut self,
        shape: FetchShape,
        mode: ErrorMode,
    ) -> Result<Option<FetchedRow>, DbManagerError> {
        let result = self.read_row().map(|row| row.map(|values| self.shape(values, shape)));
        settle(result, mode, self.diagnostics, None).map(Option::flatten)
    }

    /// Silent-false read: failures return `None` and land in `error`.
    pub fn try_next(
        &mut self,
        shape: FetchShape,
        error: &mut Option<ErrorReport>,
    ) -> Option<FetchedRow> {
        let result = self.read_row().map(|row| row.map(|values| self.shape(values, shape)));
        settle(result, ErrorMode::SilentFalse, self.diagnostics, Some(error))
            .ok()
            .flatten()
            .flatten()
    }

    /// Drain the remaining rows.
    ///
    /// # Errors
    /// As for [`ResultCursor::next_as`].
    pub fn fetch_all(&mut self, shape: FetchShape) -> Result<Vec<FetchedRow>, DbManagerError> {
        let mode = ErrorMode::resolve(None, self.debug);
        Ok(self.fetch_all_with(shape, mode)?.unwrap_or_default())
    }

    /// `fetch_all` with an explicit error mode; `Ok(None)` when a failure was absorbed.
    /// Rows read before the failure are dropped.
    ///
    /// # Errors
    /// Only under [`ErrorMode::Propagate`].
    pub fn fetch_all_with(
        &mut self,
        shape: FetchShape,
        mode: ErrorMode,
    ) -> Result<Option<Vec<FetchedRow>>, DbManagerError> {
        let result = self.drain(shape);
        settle(result, mode, self.diagnostics, None)
    }

    /// Column metadata one field at a time; `None` after the last column.
    pub fn fetch_field(&mut self) -> Option<FieldInfo> {
        let field = self.fields.get(self.field_cursor).cloned();
        if field.is_some() {
            self.field_cursor += 1;
        }
        field
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Rows changed by the statement, captured when it ran. Row-producing statements
    /// report 0.
    #[must_use]
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// Total rows in the result. Backends that only count by draining have their
    /// remaining rows prefetched; they are still returned by later reads.
    ///
    /// # Errors
    /// `CursorError` if the count is unknown and the cursor is no longer open, or the
    /// backend error from prefetching. Under `debug` any error is fatal.
    pub fn row_count(&mut self) -> Result<u64, DbManagerError> {
        self.metadata(MetadataKind::RowCount)
    }

    /// # Errors
    /// Only under [`ErrorMode::Propagate`].
    pub fn row_count_with(&mut self, mode: ErrorMode) -> Result<Option<u64>, DbManagerError> {
        self.metadata_with(MetadataKind::RowCount, mode)
    }

    /// Metadata by kind.
    ///
    /// # Errors
    /// As for [`ResultCursor::row_count`].
    pub fn metadata(&mut self, kind: MetadataKind) -> Result<u64, DbManagerError> {
        let mode = ErrorMode::resolve(None, self.debug);
        Ok(self.metadata_with(kind, mode)?.unwrap_or_default())
    }

    /// Metadata with an explicit error mode; `Ok(None)` when a failure was absorbed.
    ///
    /// # Errors
    /// Only under [`ErrorMode::Propagate`].
    pub fn metadata_with(
        &mut self,
        kind: MetadataKind,
        mode: ErrorMode,
    ) -> Result<Option<u64>, DbManagerError> {
        let result = match kind {
            MetadataKind::RowCount => self.count_rows(),
            MetadataKind::FieldCount => Ok(self.field_count() as u64),
            MetadataKind::AffectedRows => Ok(self.affected_rows),
        };
        settle(result, mode, self.diagnostics, None)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == CursorState::Closed
    }

    /// Release the native handle and any prefetched rows. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.release();
        self.state = CursorState::Closed;
    }

    fn release(&mut self) {
        self.handle = None;
        self.prefetched.clear();
    }

    fn count_rows(&mut self) -> Result<u64, DbManagerError> {
        if let Some(count) = self.row_count {
            return Ok(count);
        }
        if self.state != CursorState::Open {
            return Err(DbManagerError::CursorError(
                "row count is unavailable once the cursor is released".into(),
            ));
        }
        if let Some(handle) = self.handle.as_mut() {
            while let Some(row) = handle.fetch_row()? {
                self.prefetched.push_back(row);
            }
        }
        let count = self.delivered + self.prefetched.len() as u64;
        self.row_count = Some(count);
        Ok(count)
    }

    fn drain(&mut self, shape: FetchShape) -> Result<Vec<FetchedRow>, DbManagerError> {
        let mut rows = Vec::new();
        while let Some(values) = self.read_row()? {
            rows.push(self.shape(values, shape));
        }
        Ok(rows)
    }

    fn read_row(&mut self) -> Result<Option<Vec<RowValues>>, DbManagerError> {
        match self.state {
            CursorState::Closed => {
                return Err(DbManagerError::CursorError("cursor is closed".into()));
            }
            CursorState::Drained => {
                return Err(DbManagerError::CursorError(
                    "result is exhausted and its handle released".into(),
                ));
            }
            CursorState::Open => {}
        }
        let next = match self.prefetched.pop_front() {
            Some(row) => Some(row),
            None => match self.handle.as_mut() {
                Some(handle) => handle.fetch_row()?,
                None => None,
            },
        };
        match next {
            Some(values) => {
                self.delivered += 1;
                Ok(Some(values))
            }
            None => {
                self.release();
                self.state = CursorState::Drained;
                if self.row_count.is_none() {
                    self.row_count = Some(self.delivered);
                }
                Ok(None)
            }
        }
    }

    fn shape(&self, values: Vec<RowValues>, shape: FetchShape) -> FetchedRow {
        match shape {
            FetchShape::Assoc => FetchedRow::Assoc(
                self.column_names
                    .iter()
                    .cloned()
                    .zip(values)
                    .collect::<HashMap<_, _>>(),
            ),
            FetchShape::Indexed => FetchedRow::Indexed(values),
            FetchShape::Object => FetchedRow::Object(ObjectRow::with_index(
                Arc::clone(&self.column_names),
                Arc::clone(&self.column_index),
                values,
            )),
        }
    }
}

impl std::fmt::Debug for ResultCursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCursor")
            .field("fields", &self.fields)
            .field("delivered", &self.delivered)
            .field("row_count", &self.row_count)
            .field("affected_rows", &self.affected_rows)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
