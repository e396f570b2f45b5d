//! Notebook session wiring for the DataStudio binary

pub mod session;

pub use session::{NotebookSession, OpenFile, RunOutcome};
