//! Per-call error handling.
//!
//! Every fallible call resolves one [`ErrorMode`]. Whatever the mode, the failure is
//! recorded in the connection's [`Diagnostics`] first.

use std::fmt::Write as _;
use std::io::{IsTerminal, Write as _};

use crate::diagnostics::Diagnostics;
use crate::error::{DbManagerError, ErrorReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Print the failure to stderr and exit the process with status 1.
    Fatal,
    /// Return an empty/false result; the report is left in the caller's out-slot
    /// and in [`Diagnostics::last_error`].
    SilentFalse,
    /// Return the error.
    #[default]
    Propagate,
}

impl ErrorMode {
    /// Mode for a call: the explicit one if given, otherwise `Propagate`, or `Fatal`
    /// when the connection was opened with `debug`.
    #[must_use]
    pub fn resolve(explicit: Option<ErrorMode>, debug: bool) -> ErrorMode {
        match explicit {
            Some(mode) => mode,
            None if debug => ErrorMode::Fatal,
            None => ErrorMode::Propagate,
        }
    }
}

/// Apply `mode` to `result`. `Ok(None)` means the failure was absorbed (silent-false).
pub(crate) fn settle<T>(
    result: Result<T, DbManagerError>,
    mode: ErrorMode,
    diagnostics: &mut Diagnostics,
    out: Option<&mut Option<ErrorReport>>,
) -> Result<Option<T>, DbManagerError> {
    let err = match result {
        Ok(value) => return Ok(Some(value)),
        Err(err) => err,
    };
    let report = diagnostics.record_error(&err);
    match mode {
        ErrorMode::Fatal => halt(&report),
        ErrorMode::SilentFalse => {
            if let Some(slot) = out {
                *slot = Some(report);
            }
            Ok(None)
        }
        ErrorMode::Propagate => Err(err),
    }
}

/// Render a fatal report: multi-line text for a person, a single JSON line otherwise.
#[must_use]
pub fn render_fatal(report: &ErrorReport, human: bool) -> String {
    if !human {
        return serde_json::to_string(report).unwrap_or_else(|_| report.message.clone());
    }
    let mut text = format!("db-manager: {}\n  {}", report.kind, report.message);
    if let Some(sql) = &report.sql {
        let _ = write!(text, "\n  SQL: {sql}");
    }
    if let Some(code) = &report.code {
        let _ = write!(text, "\n  code: {code}");
    }
    text
}

/// Write the report to stderr and terminate the process with status 1.
pub fn halt(report: &ErrorReport) -> ! {
    tracing::error!(kind = %report.kind, code = ?report.code, "fatal: {}", report.message);
    let stderr = std::io::stderr();
    let human = stderr.is_terminal();
    let mut handle = stderr.lock();
    let _ = writeln!(handle, "{}", render_fatal(report, human));
    let _ = handle.flush();
    std::process::exit(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn report() -> ErrorReport {
        ErrorReport {
            kind: ErrorKind::Execution,
            message: "no such table: missing".into(),
            sql: Some("select * from missing".into()),
            code: Some("1".into()),
        }
    }

    #[test]
    fn omitted_mode_depends_on_debug() {
        assert_eq!(ErrorMode::resolve(None, false), ErrorMode::Propagate);
        assert_eq!(ErrorMode::resolve(None, true), ErrorMode::Fatal);
        assert_eq!(
            ErrorMode::resolve(Some(ErrorMode::SilentFalse), true),
            ErrorMode::SilentFalse
        );
    }

    #[test]
    fn silent_false_fills_out_slot_and_diagnostics() {
        let mut diagnostics = Diagnostics::default();
        let mut out = None;
        let res: Result<Option<u8>, _> = settle(
            Err(DbManagerError::execution("boom")),
            ErrorMode::SilentFalse,
            &mut diagnostics,
            Some(&mut out),
        );
        assert!(matches!(res, Ok(None)));
        assert_eq!(out.unwrap().kind, ErrorKind::Execution);
        assert_eq!(diagnostics.error_count(), 1);
        assert!(diagnostics.last_error().is_some());
    }

    #[test]
    fn propagate_records_then_returns() {
        let mut diagnostics = Diagnostics::default();
        let res: Result<Option<u8>, _> = settle(
            Err(DbManagerError::TransactionError("x".into())),
            ErrorMode::Propagate,
            &mut diagnostics,
            None,
        );
        assert!(matches!(res, Err(DbManagerError::TransactionError(_))));
        assert_eq!(diagnostics.error_count(), 1);
    }

    #[test]
    fn fatal_rendering() {
        let human = render_fatal(&report(), true);
        assert!(human.starts_with("db-manager: ExecutionError"));
        assert!(human.contains("SQL: select * from missing"));

        let line = render_fatal(&report(), false);
        assert!(!line.contains('\n'));
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["kind"], "execution");
        assert_eq!(parsed["code"], "1");
    }
}
