//! Pre-flight gates for query cells
//!
//! These are keyword checks, not parsers. Passing a gate only means the
//! text is not obviously incomplete; the backend stays the authority on
//! whether a query is valid.

use ahash::AHashSet;
use ds_core::{CellKind, NotebookCell};
use once_cell::sync::Lazy;
use thiserror::Error;

/// Why a query was held back
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Query is empty")]
    EmptyQuery,

    #[error("Query must contain a SELECT, INSERT, UPDATE, DELETE, CREATE or DROP statement")]
    MissingClause,

    #[error("Select a node label before running the query")]
    MissingLabel,

    #[error("Cypher query must contain a {0} clause")]
    MissingCypherClause(&'static str),
}

/// Words that open an SQL statement
static SQL_STATEMENTS: Lazy<AHashSet<&'static str>> = Lazy::new(|| {
    ["SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP"]
        .into_iter()
        .collect()
});

/// Cheap syntactic check run before a query is submitted
pub trait PreflightGate {
    fn check(&self, text: &str, label: Option<&str>) -> Result<(), ValidationError>;
}

/// Gate for SQL cells
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlGate;

impl PreflightGate for SqlGate {
    fn check(&self, text: &str, _label: Option<&str>) -> Result<(), ValidationError> {
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyQuery);
        }

        let words = keyword_tokens(text);
        if words.is_empty() {
            return Err(ValidationError::EmptyQuery);
        }
        if !words.iter().any(|w| SQL_STATEMENTS.contains(w.as_str())) {
            return Err(ValidationError::MissingClause);
        }
        Ok(())
    }
}

/// Gate for Cypher cells; the cell's node label must be selected
#[derive(Debug, Clone, Copy, Default)]
pub struct CypherGate;

impl PreflightGate for CypherGate {
    fn check(&self, text: &str, label: Option<&str>) -> Result<(), ValidationError> {
        if label.map_or(true, |l| l.trim().is_empty()) {
            return Err(ValidationError::MissingLabel);
        }
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyQuery);
        }

        let words = keyword_tokens(text);
        for clause in ["MATCH", "RETURN"] {
            if !words.iter().any(|w| w == clause) {
                return Err(ValidationError::MissingCypherClause(clause));
            }
        }
        Ok(())
    }
}

/// `None` when `text` passes the SQL gate
pub fn validate_sql(text: &str) -> Option<ValidationError> {
    SqlGate.check(text, None).err()
}

/// `None` when `text` passes the Cypher gate with `label` selected
pub fn validate_cypher(text: &str, label: &str) -> Option<ValidationError> {
    CypherGate.check(text, Some(label)).err()
}

/// Run the gate matching the cell's kind; kinds without a gate pass
pub fn validate_cell(cell: &NotebookCell) -> Option<ValidationError> {
    let result = match cell.kind {
        CellKind::Sql => SqlGate.check(&cell.value, None),
        CellKind::Cypher => CypherGate.check(&cell.value, cell.label.as_deref()),
        _ => Ok(()),
    };

    if let Err(e) = &result {
        tracing::debug!("Cell {} held back: {}", cell.id, e);
    }
    result.err()
}

/// Upper-cased identifier words outside of quotes and comments
fn keyword_tokens(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                flush(&mut current, &mut words);
                // skip to the closing quote; doubled quotes stay inside
                while let Some(inner) = chars.next() {
                    if inner == c {
                        if chars.peek() == Some(&c) {
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                flush(&mut current, &mut words);
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'/') || chars.peek() == Some(&'*') => {
                flush(&mut current, &mut words);
                let block = chars.next() == Some('*');
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    if (!block && inner == '\n') || (block && prev == '*' && inner == '/') {
                        break;
                    }
                    prev = inner;
                }
            }
            c if c.is_ascii_alphanumeric() || c == '_' => current.push(c.to_ascii_uppercase()),
            _ => flush(&mut current, &mut words),
        }
    }
    flush(&mut current, &mut words);
    words
}

fn flush(current: &mut String, words: &mut Vec<String>) {
    if !current.is_empty() {
        words.push(std::mem::take(current));
    }
}
