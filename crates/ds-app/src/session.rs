//! Notebook session
//!
//! Wires the notebook to its collaborators: the file fetcher, the schema
//! override store, the query backend and the event bus. Runs of different
//! cells are independent and may overlap; the notebook lock is never held
//! across an await.

use std::sync::Arc;

use anyhow::Context;
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use ds_core::events::events::{
    CellAdded, CellMoved, CellRemoved, ExecutionFinished, ExecutionStarted,
};
use ds_core::events::EventBus;
use ds_core::{
    CellId, CellKind, ExecutionState, Notebook, NotebookCell, NotebookError, QueryExecutor,
};
use ds_data::schema::editor::SchemaEditor;
use ds_data::sources::table_name_for;
use ds_data::{
    ColumnSchema, FileFetcher, FilePreview, KeyValueBackend, SchemaOverrideStore, SchemaStatus,
    StudioConfig,
    TableRegistry,
};
use ds_query::{get_suggestions, validate_cell, TableSchema, ValidationError};

/// A file loaded into the session
#[derive(Debug, Clone)]
pub struct OpenFile {
    pub file_id: String,
    /// Table the file is queryable as
    pub table: String,
    /// First rows, bounded by `preview_rows`
    pub preview: FilePreview,
    /// Every row of the file
    pub rows: Vec<Vec<String>>,
    /// Schema inferred from the sampled rows
    pub inferred: Vec<ColumnSchema>,
}

/// What happened when a cell was run
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The pre-flight gate rejected the query; nothing was sent
    Blocked(ValidationError),
    /// The cell kind has no backend
    NotExecutable,
    /// The backend answered and the cell now holds this state
    Recorded(ExecutionState),
    /// The answer arrived for an abandoned run and was dropped
    Discarded,
}

pub struct NotebookSession<B: KeyValueBackend> {
    notebook: RwLock<Notebook>,
    store: Arc<SchemaOverrideStore<B>>,
    fetcher: Arc<dyn FileFetcher>,
    executor: Arc<dyn QueryExecutor>,
    registry: Option<Arc<dyn TableRegistry>>,
    files: RwLock<IndexMap<String, OpenFile>>,
    events: EventBus,
    config: StudioConfig,
}

impl<B: KeyValueBackend> NotebookSession<B> {
    pub fn new(
        config: StudioConfig,
        store: Arc<SchemaOverrideStore<B>>,
        fetcher: Arc<dyn FileFetcher>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self {
            notebook: RwLock::new(Notebook::new()),
            store,
            fetcher,
            executor,
            registry: None,
            files: RwLock::new(IndexMap::new()),
            events: EventBus::new(),
            config,
        }
    }

    /// Register opened files as tables in `registry`
    pub fn with_table_registry(mut self, registry: Arc<dyn TableRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_notebook(self, notebook: Notebook) -> Self {
        *self.notebook.write() = notebook;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &SchemaOverrideStore<B> {
        &self.store
    }

    /// Copy of the current notebook
    pub fn notebook(&self) -> Notebook {
        self.notebook.read().clone()
    }

    pub fn cell(&self, id: CellId) -> Option<NotebookCell> {
        self.notebook.read().cell(id).cloned()
    }

    pub fn add_cell(&self, cell: NotebookCell, after_index: Option<usize>) -> CellId {
        let kind = cell.kind.clone();
        let (id, index) = {
            let mut notebook = self.notebook.write();
            let id = notebook.insert_cell(cell, after_index);
            (id, notebook.index_of(id).unwrap_or_default())
        };
        self.events.publish(CellAdded { cell_id: id, kind, index });
        id
    }

    pub fn move_cell(&self, from_index: usize, to_index: usize) {
        let moved = {
            let mut notebook = self.notebook.write();
            let from = from_index.min(notebook.len().saturating_sub(1));
            let id = notebook.cells().get(from).map(|c| c.id);
            notebook.move_cell(from_index, to_index);
            id.and_then(|id| notebook.index_of(id).map(|to| (id, from, to)))
        };
        if let Some((cell_id, from, to)) = moved {
            self.events.publish(CellMoved { cell_id, from, to });
        }
    }

    pub fn delete_cell(&self, index: usize) -> Option<NotebookCell> {
        let removed = self.notebook.write().delete_cell(index);
        if let Some(cell) = &removed {
            self.events.publish(CellRemoved { cell_id: cell.id });
        }
        removed
    }

    /// Apply any other change to the notebook
    pub fn edit<R>(&self, f: impl FnOnce(&mut Notebook) -> R) -> R {
        f(&mut self.notebook.write())
    }

    /// Fetch a file, infer its schema and make it queryable
    pub async fn open_file(&self, file_id: &str) -> anyhow::Result<OpenFile> {
        let content = self
            .fetcher
            .fetch(file_id)
            .await
            .with_context(|| format!("failed to fetch '{}'", file_id))?;

        let full = FilePreview::from_content(&content, usize::MAX)?;
        let preview = FilePreview {
            columns: full.columns.clone(),
            rows: full.rows.iter().take(self.config.preview_rows).cloned().collect(),
            total_rows: full.total_rows,
        };

        let inferred = full.infer_schema(&self.config.inference.detector());
        let status = self.store.register_file(file_id)?;
        info!(
            "Opened '{}': {} columns, {} rows, schema {}",
            file_id,
            inferred.len(),
            full.total_rows,
            status
        );

        let file = OpenFile {
            file_id: file_id.to_string(),
            table: table_name_for(file_id),
            preview,
            rows: full.rows,
            inferred,
        };
        self.files.write().insert(file_id.to_string(), file.clone());
        self.sync_table(&file)?;
        Ok(file)
    }

    pub fn open_files(&self) -> Vec<String> {
        self.files.read().keys().cloned().collect()
    }

    /// Override if confirmed, inferred otherwise
    pub fn effective_schema(&self, file_id: &str) -> Option<Vec<ColumnSchema>> {
        let files = self.files.read();
        let file = files.get(file_id)?;
        Some(self.store.effective_schema(file_id, &file.inferred))
    }

    pub fn schema_status(&self, file_id: &str) -> SchemaStatus {
        self.store.status(file_id)
    }

    /// Editor over the schema of an opened file
    pub fn schema_editor(&self, file_id: &str) -> anyhow::Result<SchemaEditor<'_, B>> {
        let inferred = self
            .files
            .read()
            .get(file_id)
            .map(|f| f.inferred.clone())
            .with_context(|| format!("'{}' is not open", file_id))?;
        Ok(SchemaEditor::new(&self.store, file_id, inferred))
    }

    /// Save `schema` as confirmed and rebuild the file's table
    pub fn confirm_schema(&self, file_id: &str, schema: &[ColumnSchema]) -> anyhow::Result<()> {
        self.store.save_override(file_id, schema)?;
        self.refresh_table(file_id)
    }

    /// Rebuild the table of an opened file from its effective schema
    pub fn refresh_table(&self, file_id: &str) -> anyhow::Result<()> {
        let file = self
            .files
            .read()
            .get(file_id)
            .cloned()
            .with_context(|| format!("'{}' is not open", file_id))?;
        self.sync_table(&file)
    }

    fn sync_table(&self, file: &OpenFile) -> anyhow::Result<()> {
        let Some(registry) = &self.registry else {
            return Ok(());
        };
        if file.preview.columns.is_empty() {
            warn!("'{}' has no columns, not registering a table", file.file_id);
            return Ok(());
        }
        let schema = self.store.effective_schema(&file.file_id, &file.inferred);
        registry.register_table(&file.table, &schema, &file.rows)?;
        Ok(())
    }

    /// Tables for autocomplete, one per opened file
    pub fn tables(&self) -> Vec<TableSchema> {
        self.files
            .read()
            .values()
            .map(|file| {
                TableSchema::new(
                    file.table.clone(),
                    self.store.effective_schema(&file.file_id, &file.inferred),
                )
            })
            .collect()
    }

    /// SQL autocomplete candidates for the opened files
    pub fn suggestions(&self) -> Vec<String> {
        get_suggestions(&self.tables())
    }

    /// Gate, execute and record one cell
    pub async fn run_cell(&self, id: CellId) -> Result<RunOutcome, NotebookError> {
        let cell = self.cell(id).ok_or(NotebookError::CellNotFound(id))?;

        if let Some(error) = validate_cell(&cell) {
            info!("Cell {} blocked: {}", id, error);
            return Ok(RunOutcome::Blocked(error));
        }
        if !cell.kind.is_query() {
            return Ok(RunOutcome::NotExecutable);
        }

        let ticket = self.notebook.write().begin_execution(id)?;
        self.events.publish(ExecutionStarted { cell_id: id, run: ticket.run });
        debug!("Running cell {} on {} (run {})", id, self.executor.backend_name(), ticket.run);

        let outcome = self
            .executor
            .execute(&cell.kind, &cell.value, cell.label.as_deref())
            .await
            .map_err(|e| format!("{:#}", e));

        if let Err(error) = &outcome {
            warn!("Cell {} failed: {}", id, error);
        }

        let recorded = self.notebook.write().finish_execution(ticket, outcome.clone());
        if !recorded {
            return Ok(RunOutcome::Discarded);
        }

        self.events.publish(ExecutionFinished {
            cell_id: id,
            run: ticket.run,
            error: outcome.as_ref().err().cloned(),
        });

        let state = self
            .cell(id)
            .map(|c| c.execution_state())
            .unwrap_or(ExecutionState::Idle);
        Ok(RunOutcome::Recorded(state))
    }

    /// Convenience for a new SQL cell holding `sql`
    pub fn add_sql_cell(&self, sql: &str) -> CellId {
        self.add_cell(NotebookCell::new(CellKind::Sql).with_value(sql), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ds_data::{ColumnType, FileContent, MemoryBackend, PreviewPayload, SqliteExecutor};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct MapFetcher {
        files: HashMap<String, FileContent>,
    }

    #[async_trait::async_trait]
    impl FileFetcher for MapFetcher {
        async fn fetch(&self, file_id: &str) -> anyhow::Result<FileContent> {
            self.files
                .get(file_id)
                .cloned()
                .with_context(|| format!("no such file {}", file_id))
        }
    }

    /// Answers after a delay taken from the query text (`sleep:<ms>`)
    struct ScriptedExecutor;

    #[async_trait::async_trait]
    impl QueryExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            _kind: &CellKind,
            query: &str,
            _label: Option<&str>,
        ) -> anyhow::Result<serde_json::Value> {
            let delay = query
                .split_whitespace()
                .find_map(|w| w.strip_prefix("sleep:"))
                .and_then(|ms| ms.parse::<u64>().ok())
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if query.contains("fail") {
                anyhow::bail!("backend rejected query");
            }
            Ok(json!({ "echo": query }))
        }

        fn backend_name(&self) -> &str {
            "scripted"
        }
    }

    fn fetcher() -> Arc<dyn FileFetcher> {
        let mut files = HashMap::new();
        files.insert(
            "signups.csv".to_string(),
            FileContent::Text(
                "id,amount,joined\n1,19.99,2024-03-01\n2,5.50,2024-03-02\n".to_string(),
            ),
        );
        files.insert(
            "people.json".to_string(),
            FileContent::Parsed(
                PreviewPayload::from_records(json!([{"name": "Ada", "age": 36}])).unwrap(),
            ),
        );
        Arc::new(MapFetcher { files })
    }

    fn sqlite_session() -> NotebookSession<MemoryBackend> {
        let executor = Arc::new(SqliteExecutor::in_memory().unwrap());
        NotebookSession::new(
            StudioConfig::default(),
            Arc::new(SchemaOverrideStore::in_memory()),
            fetcher(),
            executor.clone(),
        )
        .with_table_registry(executor)
    }

    fn scripted_session() -> NotebookSession<MemoryBackend> {
        NotebookSession::new(
            StudioConfig::default(),
            Arc::new(SchemaOverrideStore::in_memory()),
            fetcher(),
            Arc::new(ScriptedExecutor),
        )
    }

    #[tokio::test]
    async fn test_upload_edit_confirm_and_query() {
        let session = sqlite_session();
        let file = session.open_file("signups.csv").await.unwrap();

        assert_eq!(
            file.inferred,
            vec![
                ColumnSchema::new("id", ColumnType::Int),
                ColumnSchema::new("amount", ColumnType::Float),
                ColumnSchema::new("joined", ColumnType::Date),
            ]
        );
        assert_eq!(session.schema_status("signups.csv"), SchemaStatus::Unconfirmed);

        {
            let mut editor = session.schema_editor("signups.csv").unwrap();
            editor.set_column_type("amount", ColumnType::String).unwrap();
            assert_eq!(session.schema_status("signups.csv"), SchemaStatus::Editing);
            editor.save().unwrap();
        }
        session.refresh_table("signups.csv").unwrap();

        assert_eq!(session.schema_status("signups.csv"), SchemaStatus::Confirmed);
        let saved = session.store().load_override("signups.csv").unwrap();
        assert_eq!(saved[1], ColumnSchema::new("amount", ColumnType::String));

        let cell = session.add_sql_cell("SELECT typeof(amount) AS t FROM signups ORDER BY id");
        let outcome = session.run_cell(cell).await.unwrap();
        match outcome {
            RunOutcome::Recorded(ExecutionState::Success(result)) => {
                assert_eq!(result["rows"][0], json!(["text"]));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_autocomplete_uses_opened_files() {
        let session = sqlite_session();
        session.open_file("signups.csv").await.unwrap();
        session.open_file("people.json").await.unwrap();

        let pool = session.suggestions();
        assert_eq!(&pool[..2], &["signups", "people"]);
        assert!(pool.contains(&"joined".to_string()));
        assert!(pool.contains(&"age".to_string()));
    }

    #[tokio::test]
    async fn test_blocked_query_is_not_sent() {
        let session = scripted_session();
        let cell = session.add_sql_cell("garbage text");

        let outcome = session.run_cell(cell).await.unwrap();
        assert_eq!(outcome, RunOutcome::Blocked(ValidationError::MissingClause));
        assert_eq!(session.cell(cell).unwrap().execution_state(), ExecutionState::Idle);
    }

    #[tokio::test]
    async fn test_execution_error_is_recorded_on_the_cell() {
        let session = scripted_session();
        let cell = session.add_sql_cell("SELECT fail");

        let outcome = session.run_cell(cell).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Recorded(ExecutionState::Error("backend rejected query".to_string()))
        );

        // still editable and re-runnable
        session.edit(|nb| nb.update_cell_value(cell, "SELECT ok")).unwrap();
        let outcome = session.run_cell(cell).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Recorded(ExecutionState::Success(_))));
    }

    #[tokio::test]
    async fn test_cells_run_independently() {
        let session = scripted_session();
        let slow = session.add_sql_cell("SELECT sleep:40");
        let fast = session.add_sql_cell("SELECT fail sleep:0");

        let finished = Arc::new(AtomicUsize::new(0));
        let counter = finished.clone();
        session.events().subscribe(move |_: &ExecutionFinished| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (a, b) = tokio::join!(session.run_cell(slow), session.run_cell(fast));
        assert!(matches!(a.unwrap(), RunOutcome::Recorded(ExecutionState::Success(_))));
        assert!(matches!(b.unwrap(), RunOutcome::Recorded(ExecutionState::Error(_))));
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_response_for_deleted_cell_is_discarded() {
        let session = Arc::new(scripted_session());
        let cell = session.add_sql_cell("SELECT sleep:50");

        let runner = {
            let session = session.clone();
            tokio::spawn(async move { session.run_cell(cell).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(session.cell(cell).unwrap().executing);
        assert!(session.delete_cell(1).is_some());

        assert_eq!(runner.await.unwrap().unwrap(), RunOutcome::Discarded);
    }

    #[tokio::test]
    async fn test_cypher_cells_need_a_label() {
        let session = sqlite_session();
        let cell = session.add_cell(
            NotebookCell::new(CellKind::Cypher).with_value("MATCH (n) RETURN n"),
            None,
        );
        assert_eq!(
            session.run_cell(cell).await.unwrap(),
            RunOutcome::Blocked(ValidationError::MissingLabel)
        );

        session.edit(|nb| nb.set_cell_label(cell, Some("Person".to_string()))).unwrap();
        // passes the gate, the SQLite backend then refuses it
        assert!(matches!(
            session.run_cell(cell).await.unwrap(),
            RunOutcome::Recorded(ExecutionState::Error(_))
        ));
    }

    #[tokio::test]
    async fn test_confirmed_schema_survives_restart() {
        use ds_data::{JsonFileBackend, LocalFileFetcher};

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scores.csv"), "player,score\nada,10\nalan,7\n").unwrap();
        let store_path = dir.path().join("overrides.json");

        let open_session = || {
            let executor = Arc::new(SqliteExecutor::in_memory().unwrap());
            NotebookSession::new(
                StudioConfig::default(),
                Arc::new(SchemaOverrideStore::new(JsonFileBackend::open(&store_path).unwrap())),
                Arc::new(LocalFileFetcher::new(dir.path())),
                executor.clone(),
            )
            .with_table_registry(executor)
        };

        {
            let session = open_session();
            session.open_file("scores.csv").await.unwrap();
            session
                .confirm_schema(
                    "scores.csv",
                    &[
                        ColumnSchema::new("player", ColumnType::String),
                        ColumnSchema::new("points", ColumnType::Float),
                    ],
                )
                .unwrap();
        }

        let session = open_session();
        session.open_file("scores.csv").await.unwrap();
        assert_eq!(session.schema_status("scores.csv"), SchemaStatus::Confirmed);
        assert_eq!(
            session.effective_schema("scores.csv").unwrap()[1],
            ColumnSchema::new("points", ColumnType::Float)
        );

        let cell = session.add_sql_cell("SELECT SUM(points) FROM scores");
        match session.run_cell(cell).await.unwrap() {
            RunOutcome::Recorded(ExecutionState::Success(result)) => {
                assert_eq!(result["rows"][0], json!([17.0]));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_move_event_reports_clamped_positions() {
        let session = scripted_session();
        let last = session.add_sql_cell("SELECT 2");

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        session.events().subscribe(move |moved: &CellMoved| {
            sink.lock().push((moved.cell_id, moved.from, moved.to));
        });

        session.move_cell(99, 0);
        assert_eq!(*seen.lock(), vec![(last, 1, 0)]);
        assert_eq!(session.notebook().cells()[0].id, last);
    }

    #[tokio::test]
    async fn test_cell_events() {
        let session = scripted_session();
        let events = Arc::new(AtomicUsize::new(0));
        let added = events.clone();
        session.events().subscribe(move |_: &CellAdded| {
            added.fetch_add(1, Ordering::SeqCst);
        });
        let moved = events.clone();
        session.events().subscribe(move |_: &CellMoved| {
            moved.fetch_add(10, Ordering::SeqCst);
        });
        let removed = events.clone();
        session.events().subscribe(move |_: &CellRemoved| {
            removed.fetch_add(100, Ordering::SeqCst);
        });

        session.add_sql_cell("SELECT 1");
        session.move_cell(1, 0);
        session.delete_cell(0);
        // deleting the last remaining cell publishes nothing
        session.delete_cell(0);
        assert_eq!(events.load(Ordering::SeqCst), 111);
        assert_eq!(session.notebook().len(), 1);
    }
}
