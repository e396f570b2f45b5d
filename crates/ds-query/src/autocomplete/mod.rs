//! Autocomplete for the query editor
//!
//! The candidate pool is built from the confirmed file schemas (table and
//! column names) plus a fixed keyword list. The editor filters the pool by
//! the word under the cursor and drives a [`SuggestionPopup`].
//!
//! Cursor positions are character offsets into the editor text.

use ds_data::ColumnSchema;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Keywords offered while editing SQL
pub const SQL_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP BY", "ORDER BY", "HAVING", "LIMIT", "OFFSET", "JOIN",
    "LEFT JOIN", "INNER JOIN", "ON", "AS", "AND", "OR", "NOT", "IN", "IS NULL", "LIKE",
    "DISTINCT", "COUNT", "SUM", "AVG", "MIN", "MAX", "INSERT", "UPDATE", "DELETE", "CREATE",
    "DROP", "WITH", "CASE", "WHEN", "THEN", "ELSE", "END",
];

/// Keywords offered while editing Cypher
pub const CYPHER_KEYWORDS: &[&str] = &[
    "MATCH", "OPTIONAL MATCH", "WHERE", "RETURN", "WITH", "ORDER BY", "SKIP", "LIMIT",
    "DISTINCT", "AS", "AND", "OR", "NOT", "COUNT", "COLLECT", "UNWIND", "CONTAINS",
    "STARTS WITH", "ENDS WITH",
];

/// Query language being edited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Sql,
    Cypher,
}

impl Dialect {
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Dialect::Sql => SQL_KEYWORDS,
            Dialect::Cypher => CYPHER_KEYWORDS,
        }
    }
}

/// A queryable table and its confirmed columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Identifier characters immediately before `cursor`
pub fn get_current_word(text: &str, cursor: usize) -> String {
    let before: Vec<char> = text.chars().take(cursor).collect();
    let start = before
        .iter()
        .rposition(|c| !is_word_char(*c))
        .map_or(0, |idx| idx + 1);
    before[start..].iter().collect()
}

/// SQL candidate pool: table names, then column names, then keywords
pub fn get_suggestions(tables: &[TableSchema]) -> Vec<String> {
    suggestions_for(tables, Dialect::Sql)
}

/// Candidate pool for `dialect`, deduplicated in insertion order
pub fn suggestions_for(tables: &[TableSchema], dialect: Dialect) -> Vec<String> {
    let mut pool: IndexSet<String> = IndexSet::new();
    for table in tables {
        pool.insert(table.name.clone());
    }
    for table in tables {
        for column in &table.columns {
            pool.insert(column.name.clone());
        }
    }
    for keyword in dialect.keywords() {
        pool.insert(keyword.to_string());
    }
    pool.into_iter().collect()
}

/// Candidates containing `word`, ignoring case
///
/// An empty word matches nothing so the popup stays closed between words.
pub fn filter_suggestions(pool: &[String], word: &str) -> Vec<String> {
    if word.is_empty() {
        return Vec::new();
    }
    let needle = word.to_lowercase();
    pool.iter()
        .filter(|candidate| candidate.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// Editor text and cursor after accepting a suggestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub cursor: usize,
}

/// Replace the word ending at `cursor` with `candidate` and a space
pub fn apply_completion(text: &str, cursor: usize, candidate: &str) -> Completion {
    let chars: Vec<char> = text.chars().collect();
    let cursor = cursor.min(chars.len());
    let word_len = get_current_word(text, cursor).chars().count();
    let start = cursor - word_len;

    let mut next: String = chars[..start].iter().collect();
    next.push_str(candidate);
    next.push(' ');
    next.extend(&chars[cursor..]);

    Completion {
        text: next,
        cursor: start + candidate.chars().count() + 1,
    }
}

/// Keys the popup reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupKey {
    Up,
    Down,
    Enter,
    Escape,
}

/// What the editor should do after a key press
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// The popup is closed; the editor handles the key itself
    Ignored,
    /// The popup consumed the key
    Handled,
    /// A suggestion was accepted
    Completed(Completion),
}

/// Suggestion list shown under the cursor
#[derive(Debug, Clone, Default)]
pub struct SuggestionPopup {
    items: Vec<String>,
    active: usize,
    visible: bool,
}

impl SuggestionPopup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute the list for the word under the cursor
    pub fn refresh(&mut self, pool: &[String], text: &str, cursor: usize) {
        self.items = filter_suggestions(pool, &get_current_word(text, cursor));
        self.active = 0;
        self.visible = !self.items.is_empty();
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_item(&self) -> Option<&str> {
        self.items.get(self.active).map(String::as_str)
    }

    pub fn move_down(&mut self) {
        if !self.items.is_empty() {
            self.active = (self.active + 1).min(self.items.len() - 1);
        }
    }

    pub fn move_up(&mut self) {
        self.active = self.active.saturating_sub(1);
    }

    /// Close the list without touching the text
    pub fn dismiss(&mut self) {
        self.visible = false;
    }

    /// Insert the highlighted suggestion
    pub fn accept(&mut self, text: &str, cursor: usize) -> Option<Completion> {
        self.accept_index(self.active, text, cursor)
    }

    /// Insert the suggestion at `index`, e.g. after a click
    pub fn accept_index(&mut self, index: usize, text: &str, cursor: usize) -> Option<Completion> {
        if !self.visible {
            return None;
        }
        let candidate = self.items.get(index)?.clone();
        self.visible = false;
        Some(apply_completion(text, cursor, &candidate))
    }

    pub fn handle_key(&mut self, key: PopupKey, text: &str, cursor: usize) -> KeyOutcome {
        if !self.visible {
            return KeyOutcome::Ignored;
        }
        match key {
            PopupKey::Up => {
                self.move_up();
                KeyOutcome::Handled
            }
            PopupKey::Down => {
                self.move_down();
                KeyOutcome::Handled
            }
            PopupKey::Enter => match self.accept(text, cursor) {
                Some(completion) => KeyOutcome::Completed(completion),
                None => KeyOutcome::Ignored,
            },
            PopupKey::Escape => {
                self.dismiss();
                KeyOutcome::Handled
            }
        }
    }
}
