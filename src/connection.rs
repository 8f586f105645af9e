use serde::Serialize;

use crate::adapter::{Capabilities, NativeAdapter};
use crate::config::ConnectionOptions;
use crate::diagnostics::Diagnostics;
use crate::error::{DbManagerError, ErrorReport};
use crate::executor;
use crate::policy::{ErrorMode, settle};
use crate::results::ResultCursor;
use crate::transaction::{TransactionCoordinator, TransactionState};
use crate::types::{Engine, PreparedParameter};

/// What was connected to, captured once right after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub engine: Engine,
    pub server: String,
    pub user: String,
    pub version: String,
    pub charset: String,
    pub database: String,
    /// Whether the connection is actually persistent.
    pub persistent: bool,
    /// Whether the options asked for a persistent connection.
    pub persistent_requested: bool,
}

/// One live backend connection: the adapter plus its diagnostics and
/// transaction stack.
///
/// Not thread-safe; one caller drives a connection at a time. Statements run
/// one after another: a [`ResultCursor`] borrows the connection until it is dropped.
pub struct Connection {
    adapter: Box<dyn NativeAdapter>,
    info: ConnectionInfo,
    diagnostics: Diagnostics,
    transactions: TransactionCoordinator,
    debug: bool,
    closed: bool,
}

impl Connection {
    /// Finish setting up a freshly connected adapter: charset (falling back to the
    /// backend default when rejected), autocommit mode, then identity.
    pub(crate) fn establish(
        mut adapter: Box<dyn NativeAdapter>,
        options: &ConnectionOptions,
    ) -> Result<Self, DbManagerError> {
        if let Err(err) = adapter.set_charset(&options.charset) {
            let fallback = adapter.default_charset();
            tracing::warn!(
                requested = %options.charset,
                fallback,
                "charset rejected, using fallback: {err}"
            );
            adapter.set_charset(fallback)?;
        }
        adapter.set_autocommit(options.autocommit)?;
        let identity = adapter.describe()?;

        let engine = adapter.engine();
        let persistent = options.persistent && adapter.capabilities().persistent_connections;
        if options.persistent && !persistent {
            tracing::info!(
                ?engine,
                "persistent connection requested but not supported; using a standard connection"
            );
        }

        let info = ConnectionInfo {
            engine,
            server: identity.server,
            user: identity.user,
            version: identity.version,
            charset: adapter.charset(),
            database: options.database.clone(),
            persistent,
            persistent_requested: options.persistent,
        };
        tracing::info!(
            ?engine,
            server = %info.server,
            user = %info.user,
            version = %info.version,
            "connected"
        );

        Ok(Self {
            adapter,
            info,
            diagnostics: Diagnostics::default(),
            transactions: TransactionCoordinator::new(options.autocommit),
            debug: options.debug,
            closed: false,
        })
    }

    /// Execute a statement with `?` placeholders bound positionally from `params`.
    ///
    /// An empty `params` runs `sql` verbatim.
    ///
    /// # Errors
    /// `ExecutionError` for a placeholder/parameter count mismatch (detected before the
    /// backend is contacted) or a backend rejection; `NotConnected` after close.
    /// Under `debug` any error is fatal.
    pub fn execute(
        &mut self,
        sql: &str,
        params: &[PreparedParameter],
    ) -> Result<ResultCursor<'_>, DbManagerError> {
        let mode = ErrorMode::resolve(None, self.debug);
        self.execute_inner(sql, params, mode, None)?
            .ok_or_else(|| DbManagerError::execution("statement produced no result"))
    }

    /// Execute with an explicit error mode. `Ok(None)` means the failure was absorbed
    /// under [`ErrorMode::SilentFalse`]; see [`Connection::last_error`].
    ///
    /// # Errors
    /// Only under [`ErrorMode::Propagate`].
    pub fn execute_with(
        &mut self,
        sql: &str,
        params: &[PreparedParameter],
        mode: ErrorMode,
    ) -> Result<Option<ResultCursor<'_>>, DbManagerError> {
        self.execute_inner(sql, params, mode, None)
    }

    /// Silent-false execution: on failure returns `None` and fills `error`.
    pub fn try_execute(
        &mut self,
        sql: &str,
        params: &[PreparedParameter],
        error: &mut Option<ErrorReport>,
    ) -> Option<ResultCursor<'_>> {
        self.execute_inner(sql, params, ErrorMode::SilentFalse, Some(error))
            .ok()
            .flatten()
    }

    fn execute_inner(
        &mut self,
        sql: &str,
        params: &[PreparedParameter],
        mode: ErrorMode,
        out: Option<&mut Option<ErrorReport>>,
    ) -> Result<Option<ResultCursor<'_>>, DbManagerError> {
        if self.closed {
            return settle(Err(DbManagerError::NotConnected), mode, &mut self.diagnostics, out);
        }
        let outcome = match executor::run(self.adapter.as_mut(), sql, params) {
            Ok(outcome) => outcome,
            Err(err) => return settle(Err(err), mode, &mut self.diagnostics, out),
        };
        self.diagnostics.record_query(outcome.affected_rows());
        Ok(Some(ResultCursor::new(
            outcome,
            &mut self.diagnostics,
            self.debug,
        )))
    }

    /// Run a parameterless, possibly multi-statement script. Counts as one query.
    ///
    /// # Errors
    /// The backend error, with the script attached.
    pub fn execute_batch(&mut self, sql: &str) -> Result<(), DbManagerError> {
        let mode = ErrorMode::resolve(None, self.debug);
        self.execute_batch_with(sql, mode).map(|_| ())
    }

    /// `execute_batch` with an explicit error mode; `Ok(false)` when a failure was
    /// absorbed.
    ///
    /// # Errors
    /// Only under [`ErrorMode::Propagate`].
    pub fn execute_batch_with(
        &mut self,
        sql: &str,
        mode: ErrorMode,
    ) -> Result<bool, DbManagerError> {
        let result = self
            .ensure_open()
            .and_then(|()| executor::run_batch(self.adapter.as_mut(), sql));
        let ran = settle(result, mode, &mut self.diagnostics, None)?.is_some();
        if ran {
            self.diagnostics.record_query(0);
        }
        Ok(ran)
    }

    /// Begin a transaction, or a nested scope when one is already open.
    ///
    /// # Errors
    /// `UnsupportedOperation` for nesting on a flat backend; the backend error if the
    /// directive fails.
    pub fn begin(&mut self) -> Result<(), DbManagerError> {
        let mode = ErrorMode::resolve(None, self.debug);
        self.begin_with(mode).map(|_| ())
    }

    /// `begin` with an explicit error mode; `Ok(false)` when a failure was absorbed.
    ///
    /// # Errors
    /// Only under [`ErrorMode::Propagate`].
    pub fn begin_with(&mut self, mode: ErrorMode) -> Result<bool, DbManagerError> {
        let result = self
            .ensure_open()
            .and_then(|()| self.transactions.begin(self.adapter.as_mut()));
        Ok(settle(result, mode, &mut self.diagnostics, None)?.is_some())
    }

    /// Commit the innermost scope. `Ok(false)` when no transaction is open.
    ///
    /// # Errors
    /// The backend error if the directive fails.
    pub fn commit(&mut self) -> Result<bool, DbManagerError> {
        let mode = ErrorMode::resolve(None, self.debug);
        self.commit_with(mode)
    }

    /// # Errors
    /// Only under [`ErrorMode::Propagate`].
    pub fn commit_with(&mut self, mode: ErrorMode) -> Result<bool, DbManagerError> {
        let result = self
            .ensure_open()
            .and_then(|()| self.transactions.commit(self.adapter.as_mut()));
        Ok(settle(result, mode, &mut self.diagnostics, None)?.unwrap_or(false))
    }

    /// Roll back every open scope. `Ok(false)` when no transaction is open.
    ///
    /// # Errors
    /// `TransactionError` if any scope failed to roll back; the state is `Idle` anyway.
    pub fn rollback(&mut self) -> Result<bool, DbManagerError> {
        let mode = ErrorMode::resolve(None, self.debug);
        self.rollback_with(mode)
    }

    /// # Errors
    /// Only under [`ErrorMode::Propagate`].
    pub fn rollback_with(&mut self, mode: ErrorMode) -> Result<bool, DbManagerError> {
        let result = self
            .ensure_open()
            .and_then(|()| self.transactions.rollback(self.adapter.as_mut()));
        Ok(settle(result, mode, &mut self.diagnostics, None)?.unwrap_or(false))
    }

    #[must_use]
    pub fn transaction_state(&self) -> TransactionState {
        self.transactions.state()
    }

    /// # Errors
    /// The backend error if the id cannot be read.
    pub fn last_insert_id(&mut self) -> Result<i64, DbManagerError> {
        let mode = ErrorMode::resolve(None, self.debug);
        Ok(self.last_insert_id_with(mode)?.unwrap_or_default())
    }

    /// # Errors
    /// Only under [`ErrorMode::Propagate`].
    pub fn last_insert_id_with(
        &mut self,
        mode: ErrorMode,
    ) -> Result<Option<i64>, DbManagerError> {
        let result = self
            .ensure_open()
            .and_then(|()| self.adapter.last_insert_id());
        settle(result, mode, &mut self.diagnostics, None)
    }

    /// Switch the current database.
    ///
    /// # Errors
    /// `UnsupportedOperation` on backends that cannot switch on an open connection.
    pub fn select_db(&mut self, database: &str) -> Result<(), DbManagerError> {
        let mode = ErrorMode::resolve(None, self.debug);
        self.select_db_with(database, mode).map(|_| ())
    }

    /// `select_db` with an explicit error mode; `Ok(false)` when a failure was absorbed.
    ///
    /// # Errors
    /// Only under [`ErrorMode::Propagate`].
    pub fn select_db_with(
        &mut self,
        database: &str,
        mode: ErrorMode,
    ) -> Result<bool, DbManagerError> {
        let result = self
            .ensure_open()
            .and_then(|()| self.adapter.select_db(database));
        let switched = settle(result, mode, &mut self.diagnostics, None)?.is_some();
        if switched {
            self.info.database = database.to_owned();
        }
        Ok(switched)
    }

    /// Escape `text` for inclusion in a quoted SQL literal. Prefer parameters.
    #[must_use]
    pub fn escape_string(&self, text: &str) -> String {
        self.adapter.escape_string(text)
    }

    #[must_use]
    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.info
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.info.version
    }

    #[must_use]
    pub fn engine(&self) -> Engine {
        self.info.engine
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.adapter.capabilities()
    }

    #[must_use]
    pub fn query_count(&self) -> u64 {
        self.diagnostics.query_count()
    }

    /// Affected-row snapshot of the most recent execution.
    #[must_use]
    pub fn affected_rows(&self) -> u64 {
        self.diagnostics.affected_rows()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&ErrorReport> {
        self.diagnostics.last_error()
    }

    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Roll back any open transaction and release the native handle. Idempotent.
    ///
    /// # Errors
    /// The first failure from the rollback or the close; the connection counts as
    /// closed either way.
    pub fn close(&mut self) -> Result<(), DbManagerError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let rolled_back = if self.transactions.depth() > 0 {
            tracing::warn!(
                depth = self.transactions.depth(),
                "closing with an open transaction; rolling back"
            );
            self.transactions.rollback(self.adapter.as_mut()).map(|_| ())
        } else {
            Ok(())
        };
        let released = self.adapter.close();
        tracing::info!(
            engine = ?self.info.engine,
            queries = self.diagnostics.query_count(),
            "connection closed"
        );
        rolled_back.and(released)
    }

    fn ensure_open(&self) -> Result<(), DbManagerError> {
        if self.closed {
            Err(DbManagerError::NotConnected)
        } else {
            Ok(())
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!("error while closing connection: {err}");
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("info", &self.info)
            .field("diagnostics", &self.diagnostics)
            .field("transactions", &self.transactions)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
