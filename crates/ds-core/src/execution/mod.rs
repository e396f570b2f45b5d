//! Cell execution lifecycle
//!
//! `idle -> executing -> (success | error)`, and back to `executing` on a
//! re-run. The state lives on the cell itself (`executing`, `result`,
//! `error`); [`ExecutionState`] is the typed view of those fields.

use std::fmt;

use async_trait::async_trait;
use chrono::Utc;

use crate::cells::{CellId, CellKind, NotebookCell};
use crate::NotebookError;

/// Typed view of a cell's execution fields
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionState {
    Idle,
    Executing,
    Success(serde_json::Value),
    Error(String),
}

impl ExecutionState {
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionState::Idle => "idle",
            ExecutionState::Executing => "executing",
            ExecutionState::Success(_) => "success",
            ExecutionState::Error(_) => "error",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl NotebookCell {
    /// Current execution state derived from the cell fields
    pub fn execution_state(&self) -> ExecutionState {
        if self.executing {
            ExecutionState::Executing
        } else if let Some(error) = &self.error {
            ExecutionState::Error(error.clone())
        } else if let Some(result) = &self.result {
            ExecutionState::Success(result.clone())
        } else {
            ExecutionState::Idle
        }
    }

    /// Enter `executing`, dropping any stale output
    pub fn start_execution(&mut self) -> Result<(), NotebookError> {
        if self.executing {
            return Err(self.invalid_transition("executing"));
        }
        self.executing = true;
        self.result = None;
        self.error = None;
        self.modified_at = Utc::now();
        Ok(())
    }

    pub fn complete_success(&mut self, result: serde_json::Value) -> Result<(), NotebookError> {
        if !self.executing {
            return Err(self.invalid_transition("success"));
        }
        self.executing = false;
        self.result = Some(result);
        self.error = None;
        self.modified_at = Utc::now();
        Ok(())
    }

    pub fn complete_error(&mut self, error: impl Into<String>) -> Result<(), NotebookError> {
        if !self.executing {
            return Err(self.invalid_transition("error"));
        }
        self.executing = false;
        self.error = Some(error.into());
        self.result = None;
        self.modified_at = Utc::now();
        Ok(())
    }

    fn invalid_transition(&self, to: &'static str) -> NotebookError {
        NotebookError::InvalidTransition {
            cell: self.id,
            from: self.execution_state().name(),
            to,
        }
    }
}

/// Handle for one run of one cell
///
/// A response is only recorded if its ticket is still the latest run of a
/// cell that still exists. Anything else is an abandoned run and is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionTicket {
    pub cell_id: CellId,
    pub run: u64,
}

/// Backend that runs query cells
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute `query` for a cell of `kind`
    ///
    /// `label` is the node label selected on Cypher cells.
    async fn execute(
        &self,
        kind: &CellKind,
        query: &str,
        label: Option<&str>,
    ) -> anyhow::Result<serde_json::Value>;

    /// Name of the backend, for logs
    fn backend_name(&self) -> &str;
}
