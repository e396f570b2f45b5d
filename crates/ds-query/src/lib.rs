//! Query editing support for notebook cells
//!
//! Pre-flight gates that block obviously broken SQL and Cypher before it
//! reaches a backend, and the autocomplete engine used by the SQL editor.

pub mod autocomplete;
pub mod validate;

// Re-exports
pub use autocomplete::{
    apply_completion, filter_suggestions, get_current_word, get_suggestions, suggestions_for,
    Completion, Dialect, KeyOutcome, PopupKey, SuggestionPopup, TableSchema,
};
pub use validate::{
    validate_cell, validate_cypher, validate_sql, CypherGate, PreflightGate, SqlGate,
    ValidationError,
};
