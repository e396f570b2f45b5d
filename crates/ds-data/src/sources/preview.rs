//! File previews
//!
//! CSV arrives as raw text and is parsed here; JSON and XML arrive already
//! parsed into records by the preview backend.

use std::path::Path;

use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::schema::{json_to_cell, ColumnSchema, SchemaDetector};
use crate::DataError;

/// Supported upload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Json,
    Xml,
}

impl FileFormat {
    /// Format from the file extension
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => Ok(FileFormat::Csv),
            "json" => Ok(FileFormat::Json),
            "xml" => Ok(FileFormat::Xml),
            _ => Err(DataError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Rows parsed by the preview backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewPayload {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Map<String, JsonValue>>,
}

impl PreviewPayload {
    /// Build a payload from a JSON array of objects
    ///
    /// Columns are listed in the order they are first seen.
    pub fn from_records(value: JsonValue) -> Result<Self, DataError> {
        let JsonValue::Array(items) = value else {
            return Err(DataError::SchemaDetection("expected a JSON array of records".to_string()));
        };

        let mut columns: Vec<String> = Vec::new();
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            let JsonValue::Object(record) = item else {
                return Err(DataError::SchemaDetection(
                    "expected every record to be an object".to_string(),
                ));
            };
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
            rows.push(record);
        }

        Ok(Self { columns, rows })
    }
}

/// What a file fetch returns
#[derive(Debug, Clone, PartialEq)]
pub enum FileContent {
    /// Raw CSV text
    Text(String),
    /// Records parsed by the backend
    Parsed(PreviewPayload),
}

/// Column names plus the first rows of a file, as strings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilePreview {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Rows in the whole file, not just the preview
    pub total_rows: usize,
}

impl FilePreview {
    /// Parse CSV text keeping at most `max_rows` rows
    pub fn from_csv(text: &str, max_rows: usize) -> Result<Self, DataError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(text.as_bytes());

        let headers = reader.headers()?.iter().map(|h| h.to_string()).collect::<Vec<_>>();
        let columns = unique_headers(headers);

        let mut rows = Vec::new();
        let mut total_rows = 0;
        for result in reader.records() {
            let record = result?;
            total_rows += 1;
            if rows.len() < max_rows {
                rows.push(record.iter().map(|s| s.to_string()).collect());
            }
        }

        Ok(Self {
            columns,
            rows,
            total_rows,
        })
    }

    /// Flatten backend records into string rows
    pub fn from_payload(payload: &PreviewPayload, max_rows: usize) -> Self {
        let rows = payload
            .rows
            .iter()
            .take(max_rows)
            .map(|record| {
                payload
                    .columns
                    .iter()
                    .map(|name| record.get(name).map(json_to_cell).unwrap_or_default())
                    .collect()
            })
            .collect();

        Self {
            columns: unique_headers(payload.columns.clone()),
            rows,
            total_rows: payload.rows.len(),
        }
    }

    pub fn from_content(content: &FileContent, max_rows: usize) -> Result<Self, DataError> {
        match content {
            FileContent::Text(text) => Self::from_csv(text, max_rows),
            FileContent::Parsed(payload) => Ok(Self::from_payload(payload, max_rows)),
        }
    }

    /// Default schema for this preview
    pub fn infer_schema(&self, detector: &SchemaDetector) -> Vec<ColumnSchema> {
        detector.infer_schema(&self.rows, &self.columns)
    }
}

/// Make header names unique by suffixing repeats (`a`, `a_2`, ...) and
/// naming blank headers after their position
fn unique_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(headers.len());
    for (idx, header) in headers.into_iter().enumerate() {
        let base = if header.trim().is_empty() {
            format!("column_{}", idx + 1)
        } else {
            header
        };

        let mut name = base.clone();
        let mut n = 2;
        while seen.contains(&name) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        seen.push(name);
    }
    seen
}
