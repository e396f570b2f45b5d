//! Null-like value detection for type inference

use serde::{Deserialize, Serialize};

/// Cell values that count as "no value" when sampling a column or loading
/// rows into a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NullConfig {
    pub markers: Vec<String>,

    /// Compare with surrounding whitespace removed
    pub trim: bool,

    /// Compare ASCII letters case-insensitively
    pub ignore_case: bool,
}

impl Default for NullConfig {
    fn default() -> Self {
        Self {
            markers: ["", "-", "n/a", "null", "none"].into_iter().map(String::from).collect(),
            trim: true,
            ignore_case: true,
        }
    }
}

impl NullConfig {
    pub fn is_null(&self, value: &str) -> bool {
        let value = if self.trim { value.trim() } else { value };
        let same: fn(&str, &str) -> bool = if self.ignore_case {
            str::eq_ignore_ascii_case
        } else {
            |a, b| a == b
        };
        self.markers.iter().any(|marker| same(value, marker))
    }

    /// Also treat `marker` as null
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        let marker = marker.into();
        if !self.markers.contains(&marker) {
            self.markers.push(marker);
        }
        self
    }
}
