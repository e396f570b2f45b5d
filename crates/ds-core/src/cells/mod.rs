//! Notebook cells and the pure operations over an ordered cell sequence
//!
//! Every operation in this module takes the current sequence by reference
//! and returns a new one. The input is never mutated, so callers can keep
//! the previous sequence around (undo stacks, change detection).
//!
//! Indices are not trusted: out-of-range indices are clamped into the
//! sequence (or turn the operation into a no-op) so that the result is
//! always a renderable notebook.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a cell
pub type CellId = Uuid;

/// What a cell contains and how it is executed
///
/// Only `sql`, `cypher` and `file-preview` have behavior in the core.
/// Every other kind is carried through untouched for the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CellKind {
    Sql,
    Cypher,
    FilePreview,
    Markdown,
    Other(String),
}

impl CellKind {
    pub fn as_str(&self) -> &str {
        match self {
            CellKind::Sql => "sql",
            CellKind::Cypher => "cypher",
            CellKind::FilePreview => "file-preview",
            CellKind::Markdown => "markdown",
            CellKind::Other(kind) => kind,
        }
    }

    /// Whether cells of this kind are sent to a query executor
    pub fn is_query(&self) -> bool {
        matches!(self, CellKind::Sql | CellKind::Cypher)
    }
}

impl From<String> for CellKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "sql" => CellKind::Sql,
            "cypher" => CellKind::Cypher,
            "file-preview" => CellKind::FilePreview,
            "markdown" => CellKind::Markdown,
            _ => CellKind::Other(value),
        }
    }
}

impl From<CellKind> for String {
    fn from(kind: CellKind) -> Self {
        kind.as_str().to_string()
    }
}

impl FromStr for CellKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CellKind::from(s.to_string()))
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of notebook content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookCell {
    /// Unique identifier, stable for the lifetime of the cell
    pub id: CellId,

    /// Cell kind
    #[serde(rename = "type")]
    pub kind: CellKind,

    /// Editor contents (query text, markdown source, ...)
    pub value: String,

    /// Optional title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Whether the cell body is collapsed in the notebook
    #[serde(default)]
    pub collapsed: bool,

    /// Set while a run is in flight
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub executing: bool,

    /// Result of the last successful run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Error of the last failed run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Node label selected for Cypher cells
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// File shown by file-preview cells
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl NotebookCell {
    /// Create an empty, idle cell with a fresh id
    pub fn new(kind: CellKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            value: String::new(),
            title: None,
            collapsed: false,
            executing: false,
            result: None,
            error: None,
            label: None,
            file_id: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_file(mut self, file_id: impl Into<String>) -> Self {
        self.file_id = Some(file_id.into());
        self
    }

    /// Copy of this cell under a new identity with execution output cleared
    pub fn duplicate(&self) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: self.title.as_ref().map(|t| format!("{} (Copy)", t)),
            executing: false,
            result: None,
            error: None,
            created_at: now,
            modified_at: now,
            ..self.clone()
        }
    }
}

/// Insert a new empty cell of `kind`
///
/// The cell goes right after `after_index` when given, otherwise at the end.
pub fn add_cell(
    cells: &[NotebookCell],
    kind: CellKind,
    after_index: Option<usize>,
) -> Vec<NotebookCell> {
    insert_cell(cells, NotebookCell::new(kind), after_index)
}

/// Insert an already built cell, same placement rules as [`add_cell`]
pub fn insert_cell(
    cells: &[NotebookCell],
    cell: NotebookCell,
    after_index: Option<usize>,
) -> Vec<NotebookCell> {
    let position = match after_index {
        Some(index) => index.saturating_add(1).min(cells.len()),
        None => cells.len(),
    };

    let mut next = cells.to_vec();
    next.insert(position, cell);
    next
}

/// Move the cell at `from_index` so that it ends up at `to_index`
///
/// `to_index` addresses the shortened sequence, i.e. after removal.
pub fn move_cell(cells: &[NotebookCell], from_index: usize, to_index: usize) -> Vec<NotebookCell> {
    let mut next = cells.to_vec();
    if next.is_empty() {
        return next;
    }

    let from = from_index.min(next.len() - 1);
    let cell = next.remove(from);
    let to = to_index.min(next.len());
    next.insert(to, cell);
    next
}

/// Clone the cell at `index` and insert the copy right after it
pub fn duplicate_cell(cells: &[NotebookCell], index: usize) -> Vec<NotebookCell> {
    if cells.is_empty() {
        return Vec::new();
    }

    let index = index.min(cells.len() - 1);
    let copy = cells[index].duplicate();
    let mut next = cells.to_vec();
    next.insert(index + 1, copy);
    next
}

/// Remove the cell at `index`
///
/// A notebook always keeps at least one cell, so deleting from a
/// single-cell sequence returns it unchanged. Out-of-range indices are a
/// no-op as well.
pub fn delete_cell(cells: &[NotebookCell], index: usize) -> Vec<NotebookCell> {
    let mut next = cells.to_vec();
    if next.len() <= 1 || index >= next.len() {
        return next;
    }
    next.remove(index);
    next
}

/// Replace the editor contents of the cell at `index`
pub fn update_cell_value(
    cells: &[NotebookCell],
    index: usize,
    value: impl Into<String>,
) -> Vec<NotebookCell> {
    let mut next = cells.to_vec();
    if let Some(cell) = next.get_mut(index) {
        cell.value = value.into();
        cell.modified_at = Utc::now();
    }
    next
}

/// Flip the collapsed flag of the cell at `index`
pub fn toggle_collapsed(cells: &[NotebookCell], index: usize) -> Vec<NotebookCell> {
    let mut next = cells.to_vec();
    if let Some(cell) = next.get_mut(index) {
        cell.collapsed = !cell.collapsed;
    }
    next
}

/// Position of the cell with `id`
pub fn find_cell_index(cells: &[NotebookCell], id: CellId) -> Option<usize> {
    cells.iter().position(|cell| cell.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn notebook_of(n: usize) -> Vec<NotebookCell> {
        (0..n)
            .map(|i| NotebookCell::new(CellKind::Sql).with_value(format!("SELECT {}", i)))
            .collect()
    }

    fn ids(cells: &[NotebookCell]) -> Vec<CellId> {
        cells.iter().map(|c| c.id).collect()
    }

    #[test]
    fn test_add_cell_appends_by_default() {
        let cells = notebook_of(2);
        let next = add_cell(&cells, CellKind::Cypher, None);

        assert_eq!(next.len(), 3);
        assert_eq!(next[2].kind, CellKind::Cypher);
        assert!(next[2].value.is_empty());
        assert!(!next[2].collapsed);
        // input untouched
        assert_eq!(cells.len(), 2);
    }

    #[test]
    fn test_add_cell_after_index() {
        let cells = notebook_of(3);
        let next = add_cell(&cells, CellKind::Markdown, Some(0));

        assert_eq!(next[0].id, cells[0].id);
        assert_eq!(next[1].kind, CellKind::Markdown);
        assert_eq!(next[2].id, cells[1].id);
    }

    #[test]
    fn test_add_cell_after_out_of_range_appends() {
        let cells = notebook_of(2);
        let next = add_cell(&cells, CellKind::Sql, Some(99));
        assert_eq!(next.len(), 3);
        assert_eq!(ids(&next[..2]), ids(&cells));
    }

    #[test]
    fn test_move_cell() {
        let cells = notebook_of(4);
        let next = move_cell(&cells, 0, 2);
        assert_eq!(ids(&next), vec![cells[1].id, cells[2].id, cells[0].id, cells[3].id]);

        let back = move_cell(&next, 2, 0);
        assert_eq!(ids(&back), ids(&cells));
    }

    #[test]
    fn test_duplicate_cell() {
        let mut cells = notebook_of(2);
        cells[0].title = Some("Revenue".to_string());
        cells[0].result = Some(serde_json::json!({"rows": []}));
        cells[0].error = Some("old".to_string());
        cells[0].executing = true;

        let next = duplicate_cell(&cells, 0);
        assert_eq!(next.len(), 3);

        let copy = &next[1];
        assert_ne!(copy.id, cells[0].id);
        assert_eq!(copy.title.as_deref(), Some("Revenue (Copy)"));
        assert_eq!(copy.value, cells[0].value);
        assert!(!copy.executing);
        assert!(copy.result.is_none());
        assert!(copy.error.is_none());
        assert_eq!(next[2].id, cells[1].id);
    }

    #[test]
    fn test_duplicate_untitled_cell_stays_untitled() {
        let cells = notebook_of(1);
        let next = duplicate_cell(&cells, 0);
        assert!(next[1].title.is_none());
    }

    #[test]
    fn test_delete_cell() {
        let cells = notebook_of(3);
        let next = delete_cell(&cells, 1);
        assert_eq!(ids(&next), vec![cells[0].id, cells[2].id]);
    }

    #[test]
    fn test_delete_last_remaining_cell_is_noop() {
        let cells = notebook_of(1);
        let next = delete_cell(&cells, 0);
        assert_eq!(next, cells);
    }

    #[test]
    fn test_cell_kind_wire_names() {
        let cell = NotebookCell::new(CellKind::FilePreview).with_file("sales.csv");
        let json = serde_json::to_value(&cell).unwrap();
        assert_eq!(json["type"], "file-preview");
        assert_eq!(json["fileId"], "sales.csv");
        assert!(json.get("result").is_none());
        assert!(json.get("executing").is_none());

        let kind: CellKind = serde_json::from_str("\"chart\"").unwrap();
        assert_eq!(kind, CellKind::Other("chart".to_string()));
        assert_eq!(kind.to_string(), "chart");
    }

    proptest! {
        #[test]
        fn prop_move_preserves_ids(n in 1usize..12, from in 0usize..40, to in 0usize..40) {
            let cells = notebook_of(n);
            let next = move_cell(&cells, from, to);

            prop_assert_eq!(next.len(), cells.len());
            let before: HashSet<_> = ids(&cells).into_iter().collect();
            let after: HashSet<_> = ids(&next).into_iter().collect();
            prop_assert_eq!(before, after);
        }

        #[test]
        fn prop_delete_never_empties(n in 1usize..12, index in 0usize..40) {
            let cells = notebook_of(n);
            let next = delete_cell(&cells, index);
            prop_assert!(!next.is_empty());
            if n == 1 {
                prop_assert_eq!(&next, &cells);
            }
        }

        #[test]
        fn prop_duplicate_mints_fresh_id(n in 1usize..12, index in 0usize..40) {
            let cells = notebook_of(n);
            let next = duplicate_cell(&cells, index);

            prop_assert_eq!(next.len(), cells.len() + 1);
            let existing: HashSet<_> = ids(&cells).into_iter().collect();
            let fresh: Vec<_> = next.iter().filter(|c| !existing.contains(&c.id)).collect();
            prop_assert_eq!(fresh.len(), 1);
            prop_assert!(!fresh[0].executing);
            prop_assert!(fresh[0].result.is_none() && fresh[0].error.is_none());
        }
    }
}
