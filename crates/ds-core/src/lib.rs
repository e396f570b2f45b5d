//! Core notebook model for DataStudio
//!
//! This crate owns the ordered cell collection, cell groups and the
//! per-cell execution lifecycle. Query execution itself is delegated to a
//! [`QueryExecutor`] supplied by the surrounding application.

pub mod cells;
pub mod events;
pub mod execution;
pub mod groups;
pub mod notebook;

use thiserror::Error;

// Re-export commonly used types
pub use cells::{CellId, CellKind, NotebookCell};
pub use execution::{ExecutionState, ExecutionTicket, QueryExecutor};
pub use groups::{CellGroup, GroupId};
pub use notebook::Notebook;

/// Errors that can occur in notebook operations
#[derive(Error, Debug)]
pub enum NotebookError {
    #[error("Cell not found: {0}")]
    CellNotFound(CellId),

    #[error("Duplicate cell id: {0}")]
    DuplicateCell(CellId),

    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("Duplicate group id: {0}")]
    DuplicateGroup(GroupId),

    #[error("Invalid execution transition for cell {cell}: {from} -> {to}")]
    InvalidTransition {
        cell: CellId,
        from: &'static str,
        to: &'static str,
    },

    #[error("Notebook document error: {0}")]
    Document(#[from] serde_json::Error),

    #[error("Notebook must contain at least one cell")]
    EmptyNotebook,
}
