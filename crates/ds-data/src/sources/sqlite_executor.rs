//! SQLite query backend
//!
//! Loads file previews into an in-memory SQLite database, one table per
//! file, and runs SQL cells against it.

use std::sync::Arc;

use async_trait::async_trait;
use ds_core::{CellKind, QueryExecutor};
use parking_lot::Mutex;
use rusqlite::{types::Value as SqlValue, types::ValueRef, Connection};
use serde_json::{json, Value as JsonValue};

use crate::config::NullConfig;
use crate::schema::{ColumnSchema, ColumnType};
use crate::DataError;

/// Upper bound on rows returned for one query
const MAX_RESULT_ROWS: usize = 10_000;

/// Sink for tables built from opened files
pub trait TableRegistry: Send + Sync {
    fn register_table(
        &self,
        table: &str,
        schema: &[ColumnSchema],
        rows: &[Vec<String>],
    ) -> Result<(), DataError>;
}

/// In-memory SQLite database acting as the query backend
pub struct SqliteExecutor {
    conn: Arc<Mutex<Connection>>,
    null_config: NullConfig,
}

impl SqliteExecutor {
    /// Open an empty in-memory database
    pub fn in_memory() -> Result<Self, DataError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            null_config: NullConfig::default(),
        })
    }

    pub fn with_null_config(mut self, null_config: NullConfig) -> Self {
        self.null_config = null_config;
        self
    }

    /// (Re)create `table` from `schema` and fill it with `rows`
    ///
    /// Values that do not fit their column type are stored as text;
    /// null-like values become SQL NULL.
    pub fn register_table(
        &self,
        table: &str,
        schema: &[ColumnSchema],
        rows: &[Vec<String>],
    ) -> Result<(), DataError> {
        if schema.is_empty() {
            return Err(DataError::SchemaDetection(format!("Table '{}' has no columns", table)));
        }

        let columns = schema
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), affinity(c.column_type)))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; schema.len()].join(", ");

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({columns});",
            table = quote_ident(table),
            columns = columns
        ))?;

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} VALUES ({})",
                quote_ident(table),
                placeholders
            ))?;
            for row in rows {
                let values = schema
                    .iter()
                    .enumerate()
                    .map(|(idx, column)| {
                        self.to_sql_value(row.get(idx).map(String::as_str), column.column_type)
                    })
                    .collect::<Vec<_>>();
                stmt.execute(rusqlite::params_from_iter(values))?;
            }
        }

        tx.commit()?;
        tracing::info!("Registered table '{}' ({} rows)", table, rows.len());
        Ok(())
    }

    /// Run one SQL statement
    ///
    /// Returns `{columns, rows, truncated}` for queries and
    /// `{rowsAffected}` for statements without a result set.
    pub fn query(&self, sql: &str) -> Result<JsonValue, DataError> {
        query_blocking(&self.conn, sql)
    }

    fn to_sql_value(&self, raw: Option<&str>, column_type: ColumnType) -> SqlValue {
        let Some(raw) = raw.filter(|v| !self.null_config.is_null(v)) else {
            return SqlValue::Null;
        };
        let trimmed = raw.trim();

        match column_type {
            ColumnType::Int => trimmed
                .parse::<i64>()
                .map(SqlValue::Integer)
                .unwrap_or_else(|_| SqlValue::Text(raw.to_string())),
            ColumnType::Float => trimmed
                .parse::<f64>()
                .map(SqlValue::Real)
                .unwrap_or_else(|_| SqlValue::Text(raw.to_string())),
            ColumnType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" => SqlValue::Integer(1),
                "false" | "0" => SqlValue::Integer(0),
                _ => SqlValue::Text(raw.to_string()),
            },
            ColumnType::String | ColumnType::Date => SqlValue::Text(raw.to_string()),
        }
    }
}

fn query_blocking(conn: &Mutex<Connection>, sql: &str) -> Result<JsonValue, DataError> {
    let conn = conn.lock();
    let mut stmt = conn.prepare(sql)?;

    if stmt.column_count() == 0 {
        let affected = stmt.execute([])?;
        return Ok(json!({ "rowsAffected": affected }));
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();
    let mut rows = Vec::new();
    let mut truncated = false;

    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        if rows.len() == MAX_RESULT_ROWS {
            truncated = true;
            break;
        }
        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            values.push(to_json(row.get_ref(idx)?));
        }
        rows.push(JsonValue::Array(values));
    }

    Ok(json!({
        "columns": columns,
        "rows": rows,
        "truncated": truncated,
    }))
}

fn to_json(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ValueRef::Text(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => JsonValue::String(format!("<blob {} bytes>", bytes.len())),
    }
}

fn affinity(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Int | ColumnType::Boolean => "INTEGER",
        ColumnType::Float => "REAL",
        ColumnType::String | ColumnType::Date => "TEXT",
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Table name used for a file: its stem with non-identifier characters
/// replaced by `_`
pub fn table_name_for(file_id: &str) -> String {
    let file_name = file_id.rsplit(['/', '\\']).next().unwrap_or(file_id);
    let stem = match file_name.rfind('.') {
        Some(dot) if dot > 0 => &file_name[..dot],
        _ => file_name,
    };

    let mut name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, 't');
    }
    name
}

impl TableRegistry for SqliteExecutor {
    fn register_table(
        &self,
        table: &str,
        schema: &[ColumnSchema],
        rows: &[Vec<String>],
    ) -> Result<(), DataError> {
        SqliteExecutor::register_table(self, table, schema, rows)
    }
}

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    async fn execute(
        &self,
        kind: &CellKind,
        query: &str,
        _label: Option<&str>,
    ) -> anyhow::Result<JsonValue> {
        match kind {
            CellKind::Sql => {
                let conn = self.conn.clone();
                let sql = query.to_string();
                let result =
                    tokio::task::spawn_blocking(move || query_blocking(&conn, &sql)).await??;
                Ok(result)
            }
            CellKind::Cypher => anyhow::bail!("The SQLite backend cannot run Cypher queries"),
            other => anyhow::bail!("Cells of type '{}' are not executable", other),
        }
    }

    fn backend_name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> (Vec<ColumnSchema>, Vec<Vec<String>>) {
        let schema = vec![
            ColumnSchema::new("id", ColumnType::Int),
            ColumnSchema::new("name", ColumnType::String),
            ColumnSchema::new("score", ColumnType::Float),
            ColumnSchema::new("active", ColumnType::Boolean),
        ];
        let rows = vec![
            vec!["1".into(), "Ada".into(), "9.5".into(), "true".into()],
            vec!["2".into(), "Alan".into(), "N/A".into(), "false".into()],
        ];
        (schema, rows)
    }

    #[test]
    fn test_register_and_query() {
        let executor = SqliteExecutor::in_memory().unwrap();
        let (schema, rows) = people();
        executor.register_table("people", &schema, &rows).unwrap();

        let result = executor
            .query("SELECT name, score, active FROM people ORDER BY id")
            .unwrap();
        assert_eq!(result["columns"], json!(["name", "score", "active"]));
        assert_eq!(result["rows"][0], json!(["Ada", 9.5, 1]));
        assert_eq!(result["rows"][1], json!(["Alan", null, 0]));
        assert_eq!(result["truncated"], json!(false));
    }

    #[test]
    fn test_register_replaces_table() {
        let executor = SqliteExecutor::in_memory().unwrap();
        let (schema, rows) = people();
        executor.register_table("people", &schema, &rows).unwrap();
        executor.register_table("people", &schema, &rows[..1]).unwrap();

        let result = executor.query("SELECT COUNT(*) AS n FROM people").unwrap();
        assert_eq!(result["rows"][0], json!([1]));
    }

    #[test]
    fn test_statement_without_result_set() {
        let executor = SqliteExecutor::in_memory().unwrap();
        let (schema, rows) = people();
        executor.register_table("people", &schema, &rows).unwrap();

        let result = executor.query("DELETE FROM people WHERE id = 2").unwrap();
        assert_eq!(result["rowsAffected"], json!(1));
    }

    #[test]
    fn test_table_names() {
        assert_eq!(table_name_for("uploads/sales-2024.csv"), "sales_2024");
        assert_eq!(table_name_for("2024.csv"), "t2024");
        assert_eq!(table_name_for("people"), "people");
    }

    #[tokio::test]
    async fn test_executor_trait() {
        let executor = SqliteExecutor::in_memory().unwrap();
        let value = executor.execute(&CellKind::Sql, "SELECT 1 AS one", None).await.unwrap();
        assert_eq!(value["rows"][0], json!([1]));

        let err = executor
            .execute(&CellKind::Cypher, "MATCH (n) RETURN n", Some("Person"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Cypher"));

        assert!(executor.execute(&CellKind::Sql, "SELEC nonsense", None).await.is_err());
    }
}
