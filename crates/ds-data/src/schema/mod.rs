//! Column type inference
//!
//! Types are guessed from the first usable sample of each column. The
//! rules are applied in order and the first match wins:
//!
//! 1. empty or null-like -> `string`
//! 2. a finite number -> `float` with a decimal point, `int` otherwise
//! 3. `true` / `false` (any case) -> `boolean`
//! 4. starts with `YYYY-MM-DD` -> `date`
//! 5. anything else -> `string`

pub mod editor;
pub mod override_store;

use std::fmt;
use std::str::FromStr;

use arrow::datatypes::{DataType, Field, Schema};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::config::NullConfig;
use crate::DataError;

/// Default number of rows sampled per column
pub const DEFAULT_SAMPLE_SIZE: usize = 100;

/// Column type as shown to and edited by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Int,
    Float,
    Boolean,
    Date,
}

impl ColumnType {
    pub const ALL: [ColumnType; 5] = [
        ColumnType::String,
        ColumnType::Int,
        ColumnType::Float,
        ColumnType::Boolean,
        ColumnType::Date,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ColumnType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DataError::SchemaDetection(format!("unknown column type '{}'", s)))
    }
}

impl From<ColumnType> for DataType {
    fn from(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::String => DataType::Utf8,
            ColumnType::Int => DataType::Int64,
            ColumnType::Float => DataType::Float64,
            ColumnType::Boolean => DataType::Boolean,
            ColumnType::Date => DataType::Date32,
        }
    }
}

impl From<&DataType> for ColumnType {
    fn from(data_type: &DataType) -> Self {
        match data_type {
            DataType::Boolean => ColumnType::Boolean,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => ColumnType::Int,
            DataType::Float16 | DataType::Float32 | DataType::Float64 => ColumnType::Float,
            DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => ColumnType::Date,
            _ => ColumnType::String, // Default to string for unsupported types
        }
    }
}

/// One column of a file schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Schema detector for sampling rows and picking column types
#[derive(Debug, Clone)]
pub struct SchemaDetector {
    sample_size: usize,
    null_config: NullConfig,
}

impl SchemaDetector {
    /// Create a new schema detector
    pub fn new() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            null_config: NullConfig::default(),
        }
    }

    /// Set the number of rows sampled per column
    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size.max(1);
        self
    }

    /// Set which values count as null
    pub fn with_null_config(mut self, null_config: NullConfig) -> Self {
        self.null_config = null_config;
        self
    }

    /// Infer the type of a single value
    pub fn infer_type(&self, value: &str) -> ColumnType {
        if self.null_config.is_null(value) {
            return ColumnType::String;
        }

        let trimmed = value.trim();
        if let Ok(number) = trimmed.parse::<f64>() {
            if number.is_finite() {
                return if trimmed.contains('.') {
                    ColumnType::Float
                } else {
                    ColumnType::Int
                };
            }
        }

        if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
            return ColumnType::Boolean;
        }

        if has_iso_date_prefix(trimmed) {
            return ColumnType::Date;
        }

        ColumnType::String
    }

    /// Infer one column entry per name from string rows
    ///
    /// Row cells are positional: `rows[r][c]` belongs to `column_names[c]`.
    pub fn infer_schema(&self, rows: &[Vec<String>], column_names: &[String]) -> Vec<ColumnSchema> {
        column_names
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let sample = rows
                    .iter()
                    .take(self.sample_size)
                    .filter_map(|row| row.get(idx))
                    .find(|value| !self.null_config.is_null(value));

                let column_type = sample
                    .map(|value| self.infer_type(value))
                    .unwrap_or(ColumnType::String);

                ColumnSchema::new(name.clone(), column_type)
            })
            .collect()
    }

    /// Infer a schema from backend-parsed records (JSON/XML previews)
    pub fn infer_schema_from_records(
        &self,
        records: &[serde_json::Map<String, JsonValue>],
        column_names: &[String],
    ) -> Vec<ColumnSchema> {
        let rows: Vec<Vec<String>> = records
            .iter()
            .take(self.sample_size)
            .map(|record| {
                column_names
                    .iter()
                    .map(|name| record.get(name).map(json_to_cell).unwrap_or_default())
                    .collect()
            })
            .collect();

        self.infer_schema(&rows, column_names)
    }
}

impl Default for SchemaDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Infer the type of a single value with default settings
pub fn infer_type(value: &str) -> ColumnType {
    SchemaDetector::new().infer_type(value)
}

/// Infer a schema from string rows with default settings
pub fn infer_schema(rows: &[Vec<String>], column_names: &[String]) -> Vec<ColumnSchema> {
    SchemaDetector::new().infer_schema(rows, column_names)
}

/// Render a parsed JSON value the way it would appear in a CSV cell
pub fn json_to_cell(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Check column names are unique, reporting the first repeat
pub fn validate_unique_names(schema: &[ColumnSchema]) -> Result<(), DataError> {
    let mut seen = ahash::AHashSet::new();
    for column in schema {
        if !seen.insert(column.name.as_str()) {
            return Err(DataError::DuplicateColumn(column.name.clone()));
        }
    }
    Ok(())
}

/// Arrow view of a file schema; every column is nullable
pub fn to_arrow_schema(schema: &[ColumnSchema]) -> Schema {
    let fields = schema
        .iter()
        .map(|column| Field::new(&column.name, column.column_type.into(), true))
        .collect::<Vec<_>>();
    Schema::new(fields)
}

/// File schema from an Arrow schema
pub fn from_arrow_schema(schema: &Schema) -> Vec<ColumnSchema> {
    schema
        .fields()
        .iter()
        .map(|field| ColumnSchema::new(field.name().clone(), ColumnType::from(field.data_type())))
        .collect()
}

fn has_iso_date_prefix(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() < 10 {
        return false;
    }
    bytes[..10].iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        _ => b.is_ascii_digit(),
    })
}
