//! Transaction state machine with a scope stack.
//!
//! The outermost scope maps to the backend's own begin/commit/rollback; inner scopes
//! map to named savepoints on backends that emulate nesting. Rolling back unwinds
//! the whole stack.

use crate::adapter::{NativeAdapter, TransactionNesting};
use crate::error::DbManagerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    /// Number of open scopes, at least 1.
    InTransaction(usize),
}

#[derive(Debug)]
pub struct TransactionCoordinator {
    /// Whether the outermost transaction is open.
    open: bool,
    /// Savepoint names of the nested scopes, outermost first.
    scopes: Vec<String>,
    next_scope_id: u64,
    /// Autocommit mode captured at connect time, restored when the stack empties.
    restore_autocommit: bool,
}

impl TransactionCoordinator {
    #[must_use]
    pub fn new(restore_autocommit: bool) -> Self {
        Self {
            open: false,
            scopes: Vec::new(),
            next_scope_id: 1,
            restore_autocommit,
        }
    }

    #[must_use]
    pub fn state(&self) -> TransactionState {
        match self.depth() {
            0 => TransactionState::Idle,
            depth => TransactionState::InTransaction(depth),
        }
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        usize::from(self.open) + self.scopes.len()
    }

    /// Savepoint names of the nested scopes, outermost first.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Open a transaction, or a nested scope if one is already open.
    ///
    /// # Errors
    /// `Unsupported` for a nested begin on a flat backend; the backend error if a
    /// directive fails (the state is left unchanged).
    pub fn begin(&mut self, adapter: &mut dyn NativeAdapter) -> Result<(), DbManagerError> {
        if !self.open {
            adapter.set_autocommit(false)?;
            if let Err(err) = adapter.begin() {
                if let Err(restore) = adapter.set_autocommit(self.restore_autocommit) {
                    tracing::warn!("could not restore autocommit after failed begin: {restore}");
                }
                return Err(err);
            }
            self.open = true;
            tracing::debug!(depth = 1, "transaction begin");
            return Ok(());
        }
        match adapter.capabilities().nesting {
            TransactionNesting::Flat => Err(DbManagerError::Unsupported(format!(
                "{:?} does not support nested transactions",
                adapter.engine()
            ))),
            TransactionNesting::Emulated => {
                let name = format!("dbm_sp_{}", self.next_scope_id);
                adapter.begin_scope(&name)?;
                self.next_scope_id += 1;
                tracing::debug!(scope = %name, depth = self.depth() + 1, "transaction begin");
                self.scopes.push(name);
                Ok(())
            }
        }
    }

    /// Close the innermost scope. Returns `false` without touching the backend when
    /// no transaction is open.
    ///
    /// # Errors
    /// The backend error if the directive fails; the scope stays open.
    pub fn commit(&mut self, adapter: &mut dyn NativeAdapter) -> Result<bool, DbManagerError> {
        if let Some(name) = self.scopes.last() {
            adapter.commit_scope(name)?;
            tracing::debug!(scope = %name, depth = self.depth() - 1, "transaction commit");
            self.scopes.pop();
            return Ok(true);
        }
        if !self.open {
            return Ok(false);
        }
        adapter.commit()?;
        self.open = false;
        tracing::debug!(depth = 0, "transaction commit");
        adapter.set_autocommit(self.restore_autocommit)?;
        Ok(true)
    }

    /// Roll back every open scope, most recent first, and return to `Idle`.
    /// Returns `false` when no transaction is open.
    ///
    /// # Errors
    /// `TransactionError` carrying the first failure; the remaining scopes are still
    /// rolled back and the state is `Idle` regardless.
    pub fn rollback(&mut self, adapter: &mut dyn NativeAdapter) -> Result<bool, DbManagerError> {
        if !self.open {
            return Ok(false);
        }
        let mut first_error: Option<DbManagerError> = None;
        while let Some(name) = self.scopes.pop() {
            match adapter.rollback_scope(&name) {
                Ok(()) => tracing::debug!(scope = %name, "transaction rollback"),
                Err(err) => {
                    tracing::warn!(scope = %name, "rollback failed: {err}");
                    first_error.get_or_insert(err);
                }
            }
        }
        self.open = false;
        match adapter.rollback() {
            Ok(()) => tracing::debug!(depth = 0, "transaction rollback"),
            Err(err) => {
                tracing::warn!("rollback failed: {err}");
                first_error.get_or_insert(err);
            }
        }
        if let Err(err) = adapter.set_autocommit(self.restore_autocommit) {
            first_error.get_or_insert(err);
        }
        match first_error {
            Some(err) => Err(DbManagerError::TransactionError(format!(
                "rollback did not complete cleanly: {err}"
            ))),
            None => Ok(true),
        }
    }
}
