use crate::error::{DbManagerError, ErrorReport};

/// Per-connection counters and the most recent failure.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    query_count: u64,
    affected_rows: u64,
    error_count: u64,
    last_error: Option<ErrorReport>,
}

impl Diagnostics {
    /// Statements executed successfully since connect. Transaction directives are
    /// not counted.
    #[must_use]
    pub fn query_count(&self) -> u64 {
        self.query_count
    }

    /// Affected-row snapshot of the most recent execution (0 for row-producing
    /// statements).
    #[must_use]
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&ErrorReport> {
        self.last_error.as_ref()
    }

    pub(crate) fn record_query(&mut self, affected_rows: u64) {
        self.query_count += 1;
        self.affected_rows = affected_rows;
    }

    pub(crate) fn record_error(&mut self, err: &DbManagerError) -> ErrorReport {
        let report = err.report();
        tracing::warn!(kind = %report.kind, code = ?report.code, "{}", report.message);
        self.error_count += 1;
        self.last_error = Some(report.clone());
        report
    }
}
