use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::adapter::{
    Capabilities, Driver, NativeAdapter, NativeOutcome, NativeResult, ServerIdentity,
    TransactionNesting,
};
use crate::config::ConnectionOptions;
use crate::error::DbManagerError;
use crate::placeholders::PlaceholderStyle;
use crate::results::FieldInfo;
use crate::types::{Engine, PreparedParameter, RowValues};

/// One native call as seen by a [`ScriptedAdapter`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetCharset(String),
    SetAutocommit(bool),
    Describe,
    /// Statement text and number of bound parameters.
    Execute(String, usize),
    ExecuteBatch(String),
    Begin,
    Commit,
    Rollback,
    BeginScope(String),
    CommitScope(String),
    RollbackScope(String),
    LastInsertId,
    SelectDb(String),
    Close,
}

enum Scripted {
    /// Columns, rows, and an optional failure raised once the rows run out.
    Rows(Vec<FieldInfo>, Vec<Vec<RowValues>>, Option<String>),
    Affected(u64),
    Fail(String),
}

#[derive(Default)]
struct Faults {
    batch: usize,
    begin: usize,
    commit: usize,
    rollback: usize,
    rollback_scope: usize,
    rejected_charsets: Vec<String>,
}

struct Shared {
    calls: Vec<Call>,
    script: VecDeque<Scripted>,
    faults: Faults,
    charset: String,
    last_insert_id: i64,
}

/// Adapter double. Clones share one call log and one script, so a clone handed to
/// a connection can still be inspected from the test.
#[derive(Clone)]
pub struct ScriptedAdapter {
    engine: Engine,
    capabilities: Capabilities,
    shared: Arc<Mutex<Shared>>,
}

impl ScriptedAdapter {
    /// Savepoint-style nesting with buffered results.
    #[must_use]
    pub fn emulated() -> Self {
        Self::with_capabilities(
            Engine::Sqlite,
            Capabilities {
                nesting: TransactionNesting::Emulated,
                persistent_connections: false,
                buffered_results: true,
                placeholders: PlaceholderStyle::Question,
            },
        )
    }

    /// One transaction at a time with streamed results.
    #[must_use]
    pub fn flat() -> Self {
        Self::with_capabilities(
            Engine::Postgres,
            Capabilities {
                nesting: TransactionNesting::Flat,
                persistent_connections: false,
                buffered_results: false,
                placeholders: PlaceholderStyle::Question,
            },
        )
    }

    #[must_use]
    pub fn with_capabilities(engine: Engine, capabilities: Capabilities) -> Self {
        Self {
            engine,
            capabilities,
            shared: Arc::new(Mutex::new(Shared {
                calls: Vec::new(),
                script: VecDeque::new(),
                faults: Faults::default(),
                charset: "UTF-8".to_owned(),
                last_insert_id: 0,
            })),
        }
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: Call) {
        self.shared().calls.push(call);
    }

    /// Every call recorded so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.shared().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.shared().calls.clear();
    }

    /// Queue a result set for the next `execute`.
    pub fn push_rows(&self, columns: &[&str], rows: Vec<Vec<RowValues>>) {
        self.shared()
            .script
            .push_back(Scripted::Rows(fields_for(columns), rows, None));
    }

    /// Queue a result set whose stream breaks with `message` after `rows`.
    pub fn push_rows_then_fail(
        &self,
        columns: &[&str],
        rows: Vec<Vec<RowValues>>,
        message: impl Into<String>,
    ) {
        self.shared().script.push_back(Scripted::Rows(
            fields_for(columns),
            rows,
            Some(message.into()),
        ));
    }

    /// Queue an affected-row count for the next `execute`.
    pub fn push_affected(&self, affected: u64) {
        self.shared().script.push_back(Scripted::Affected(affected));
    }

    /// Queue a backend rejection for the next `execute`.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.shared().script.push_back(Scripted::Fail(message.into()));
    }

    pub fn fail_next_batch(&self) {
        self.shared().faults.batch += 1;
    }

    pub fn fail_next_begin(&self) {
        self.shared().faults.begin += 1;
    }

    pub fn fail_next_commit(&self) {
        self.shared().faults.commit += 1;
    }

    pub fn fail_next_rollback(&self) {
        self.shared().faults.rollback += 1;
    }

    pub fn fail_next_rollback_scope(&self) {
        self.shared().faults.rollback_scope += 1;
    }

    pub fn reject_charset(&self, charset: impl Into<String>) {
        self.shared().faults.rejected_charsets.push(charset.into());
    }

    pub fn set_last_insert_id(&self, id: i64) {
        self.shared().last_insert_id = id;
    }

    fn directive(
        &self,
        call: Call,
        fault: fn(&mut Faults) -> &mut usize,
    ) -> Result<(), DbManagerError> {
        let mut shared = self.shared();
        let label = format!("{call:?}");
        shared.calls.push(call);
        let pending = fault(&mut shared.faults);
        if *pending > 0 {
            *pending -= 1;
            return Err(DbManagerError::execution(format!("scripted failure: {label}")));
        }
        Ok(())
    }
}

fn fields_for(columns: &[&str]) -> Vec<FieldInfo> {
    columns
        .iter()
        .enumerate()
        .map(|(ordinal, name)| FieldInfo::new(*name, ordinal, None))
        .collect()
}

impl std::fmt::Debug for ScriptedAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedAdapter")
            .field("engine", &self.engine)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Result handle replaying scripted rows.
#[derive(Debug)]
pub struct ScriptedResult {
    columns: Vec<FieldInfo>,
    rows: VecDeque<Vec<RowValues>>,
    total: Option<u64>,
    failure: Option<String>,
}

impl ScriptedResult {
    #[must_use]
    pub fn new(columns: Vec<FieldInfo>, rows: Vec<Vec<RowValues>>, buffered: bool) -> Self {
        let total = buffered.then_some(rows.len() as u64);
        Self {
            columns,
            rows: rows.into(),
            total,
            failure: None,
        }
    }

    /// Fail the first read after the rows run out.
    #[must_use]
    pub fn failing_with(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }
}

impl NativeResult for ScriptedResult {
    fn columns(&self) -> &[FieldInfo] {
        &self.columns
    }

    fn fetch_row(&mut self) -> Result<Option<Vec<RowValues>>, DbManagerError> {
        if let Some(row) = self.rows.pop_front() {
            return Ok(Some(row));
        }
        match self.failure.take() {
            Some(message) => Err(DbManagerError::ExecutionError {
                message,
                sql: None,
                code: Some("08S01".to_owned()),
            }),
            None => Ok(None),
        }
    }

    fn row_count(&self) -> Option<u64> {
        self.total
    }
}

impl NativeAdapter for ScriptedAdapter {
    fn engine(&self) -> Engine {
        self.engine
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn set_charset(&mut self, charset: &str) -> Result<(), DbManagerError> {
        let mut shared = self.shared();
        shared.calls.push(Call::SetCharset(charset.to_owned()));
        if shared
            .faults
            .rejected_charsets
            .iter()
            .any(|c| c.eq_ignore_ascii_case(charset))
        {
            return Err(DbManagerError::Unsupported(format!(
                "charset '{charset}' rejected"
            )));
        }
        charset.clone_into(&mut shared.charset);
        Ok(())
    }

    fn charset(&self) -> String {
        self.shared().charset.clone()
    }

    fn set_autocommit(&mut self, enabled: bool) -> Result<(), DbManagerError> {
        self.record(Call::SetAutocommit(enabled));
        Ok(())
    }

    fn describe(&mut self) -> Result<ServerIdentity, DbManagerError> {
        self.record(Call::Describe);
        Ok(ServerIdentity {
            server: "scripted".to_owned(),
            user: "tester".to_owned(),
            version: "1.0".to_owned(),
        })
    }

    fn execute(
        &mut self,
        sql: &str,
        params: &[PreparedParameter],
    ) -> Result<NativeOutcome<'_>, DbManagerError> {
        let next = {
            let mut shared = self.shared();
            shared.calls.push(Call::Execute(sql.to_owned(), params.len()));
            shared.script.pop_front()
        };
        match next {
            Some(Scripted::Rows(columns, rows, failure)) => {
                let mut result =
                    ScriptedResult::new(columns, rows, self.capabilities.buffered_results);
                if let Some(message) = failure {
                    result = result.failing_with(message);
                }
                Ok(NativeOutcome::Rows(Box::new(result)))
            }
            Some(Scripted::Affected(n)) => Ok(NativeOutcome::Affected(n)),
            Some(Scripted::Fail(message)) => Err(DbManagerError::ExecutionError {
                message,
                sql: None,
                code: Some("42000".to_owned()),
            }),
            None => Ok(NativeOutcome::Affected(0)),
        }
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), DbManagerError> {
        self.directive(Call::ExecuteBatch(sql.to_owned()), |f| &mut f.batch)
    }

    fn begin(&mut self) -> Result<(), DbManagerError> {
        self.directive(Call::Begin, |f| &mut f.begin)
    }

    fn commit(&mut self) -> Result<(), DbManagerError> {
        self.directive(Call::Commit, |f| &mut f.commit)
    }

    fn rollback(&mut self) -> Result<(), DbManagerError> {
        self.directive(Call::Rollback, |f| &mut f.rollback)
    }

    fn begin_scope(&mut self, name: &str) -> Result<(), DbManagerError> {
        if self.capabilities.nesting == TransactionNesting::Flat {
            return Err(DbManagerError::Unsupported(format!("scope '{name}'")));
        }
        self.record(Call::BeginScope(name.to_owned()));
        Ok(())
    }

    fn commit_scope(&mut self, name: &str) -> Result<(), DbManagerError> {
        self.record(Call::CommitScope(name.to_owned()));
        Ok(())
    }

    fn rollback_scope(&mut self, name: &str) -> Result<(), DbManagerError> {
        self.directive(Call::RollbackScope(name.to_owned()), |f| &mut f.rollback_scope)
    }

    fn last_insert_id(&mut self) -> Result<i64, DbManagerError> {
        let mut shared = self.shared();
        shared.calls.push(Call::LastInsertId);
        Ok(shared.last_insert_id)
    }

    fn select_db(&mut self, database: &str) -> Result<(), DbManagerError> {
        self.record(Call::SelectDb(database.to_owned()));
        Ok(())
    }

    fn close(&mut self) -> Result<(), DbManagerError> {
        self.record(Call::Close);
        Ok(())
    }
}

/// Driver double: fails the first `failures` attempts, then connects clones of
/// its adapter.
#[derive(Debug)]
pub struct ScriptedDriver {
    adapter: ScriptedAdapter,
    failures: u32,
    attempts: Mutex<Vec<Instant>>,
}

impl ScriptedDriver {
    #[must_use]
    pub fn new(adapter: ScriptedAdapter) -> Self {
        Self {
            adapter,
            failures: 0,
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Fail this many attempts before succeeding; `u32::MAX` never succeeds.
    #[must_use]
    pub fn failing_first(mut self, failures: u32) -> Self {
        self.failures = failures;
        self
    }

    #[must_use]
    pub fn adapter(&self) -> &ScriptedAdapter {
        &self.adapter
    }

    /// Start time of every attempt made so far.
    #[must_use]
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempt_times().len()
    }
}

impl Driver for ScriptedDriver {
    fn engine(&self) -> Engine {
        self.adapter.engine
    }

    fn connect(
        &self,
        options: &ConnectionOptions,
    ) -> Result<Box<dyn NativeAdapter>, DbManagerError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
            attempts.push(Instant::now());
            attempts.len()
        };
        if u32::try_from(attempt).unwrap_or(u32::MAX) <= self.failures {
            return Err(DbManagerError::ConnectFailed(format!(
                "scripted refusal of attempt {attempt} to {}",
                options.host
            )));
        }
        Ok(Box::new(self.adapter.clone()))
    }
}
