//! DataStudio headless entry point
//!
//! Opens uploaded files from a data directory, walks their schema through
//! confirmation and runs SQL cells against them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ds_core::ExecutionState;
use ds_data::{
    ColumnType, DataError, JsonFileBackend, KeyValueBackend, LocalFileFetcher, SchemaEditor,
    SchemaOverrideStore, SqliteExecutor, StudioConfig,
};
use ds_query::SuggestionPopup;

use ds_app::{NotebookSession, RunOutcome};

/// Schema confirmation and query cells for uploaded data files
#[derive(Parser)]
#[command(name = "datastudio", version)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long, global = true, default_value = "datastudio.json")]
    config: PathBuf,

    /// Directory holding uploaded files
    #[arg(long, global = true, default_value = ".")]
    data_dir: PathBuf,

    /// Override store location, defaults to <data-dir>/.schema-overrides.json
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Rows sampled for type inference
    #[arg(long, global = true)]
    sample_size: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the inferred and effective schema of a file
    Schema { file: String },

    /// Edit a file's schema and save it as confirmed
    Confirm {
        file: String,

        /// Change a column type, e.g. `amount=float`
        #[arg(long = "set", value_name = "COLUMN=TYPE")]
        set: Vec<String>,

        /// Rename a column, e.g. `amt=amount`
        #[arg(long = "rename", value_name = "OLD=NEW")]
        rename: Vec<String>,
    },

    /// Run a SQL cell against one or more files
    Query {
        /// SQL text of the cell
        sql: String,

        /// Files to load as tables
        #[arg(long = "file", required = true)]
        files: Vec<String>,
    },

    /// List autocomplete suggestions for the word under the cursor
    Suggest {
        file: String,
        text: String,

        /// Cursor position in characters, end of text by default
        #[arg(long)]
        cursor: Option<usize>,
    },
}

fn split_pair(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .with_context(|| format!("expected KEY=VALUE, got '{}'", raw))
}

/// Column edits requested on the command line
#[derive(Debug, Default, PartialEq)]
struct SchemaEdits {
    types: Vec<(String, ColumnType)>,
    renames: Vec<(String, String)>,
}

impl SchemaEdits {
    /// Parse every `--set` and `--rename` pair up front
    fn parse(set: &[String], rename: &[String]) -> Result<Self> {
        let mut edits = SchemaEdits::default();
        for raw in set {
            let (column, type_name) = split_pair(raw)?;
            let column_type: ColumnType = type_name.parse()?;
            edits.types.push((column.to_string(), column_type));
        }
        for raw in rename {
            let (old, new) = split_pair(raw)?;
            edits.renames.push((old.to_string(), new.to_string()));
        }
        Ok(edits)
    }

    fn apply<B: KeyValueBackend>(&self, editor: &mut SchemaEditor<'_, B>) -> Result<(), DataError> {
        for (column, column_type) in &self.types {
            editor.set_column_type(column, *column_type)?;
        }
        for (old, new) in &self.renames {
            editor.rename_column(old, new)?;
        }
        Ok(())
    }
}

/// Override store file: configured path, else one inside the data directory
fn override_store_path(config: &StudioConfig, data_dir: &Path) -> PathBuf {
    config
        .override_store_path
        .clone()
        .unwrap_or_else(|| data_dir.join(".schema-overrides.json"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = StudioConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    if let Some(sample_size) = cli.sample_size {
        config.inference.sample_size = sample_size;
    }
    if let Some(store) = &cli.store {
        config.override_store_path = Some(store.clone());
    }

    let store_path = override_store_path(&config, &cli.data_dir);
    let store = Arc::new(SchemaOverrideStore::new(JsonFileBackend::open(&store_path)?));
    let executor = Arc::new(
        SqliteExecutor::in_memory()?.with_null_config(config.inference.null_config.clone()),
    );
    let fetcher = Arc::new(LocalFileFetcher::new(&cli.data_dir));

    info!("Using data directory {}", cli.data_dir.display());
    let session = NotebookSession::new(config, store, fetcher, executor.clone())
        .with_table_registry(executor);

    match cli.command {
        Command::Schema { file } => {
            let opened = session.open_file(&file).await?;
            println!("{} ({} rows) as table {}", file, opened.preview.total_rows, opened.table);
            println!("status: {}", session.schema_status(&file));
            println!("inferred: {}", serde_json::to_string_pretty(&opened.inferred)?);
            if session.store().has_override(&file) {
                let effective = session.effective_schema(&file).unwrap_or_default();
                println!("confirmed: {}", serde_json::to_string_pretty(&effective)?);
            }
        }

        Command::Confirm { file, set, rename } => {
            let edits = SchemaEdits::parse(&set, &rename)?;
            session.open_file(&file).await?;
            {
                let mut editor = session.schema_editor(&file)?;
                let applied = edits.apply(&mut editor).and_then(|_| editor.save());
                if let Err(e) = applied {
                    editor.cancel()?;
                    return Err(e).with_context(|| format!("schema of '{}' left unchanged", file));
                }
            }
            session.refresh_table(&file)?;
            let effective = session.effective_schema(&file).unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(&effective)?);
        }

        Command::Query { sql, files } => {
            for file in &files {
                session.open_file(file).await?;
            }
            let cell = session.add_sql_cell(&sql);
            match session.run_cell(cell).await? {
                RunOutcome::Recorded(ExecutionState::Success(result)) => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
                RunOutcome::Recorded(ExecutionState::Error(error)) => {
                    bail!("query failed: {}", error)
                }
                RunOutcome::Blocked(reason) => bail!("query not sent: {}", reason),
                other => bail!("query did not complete: {:?}", other),
            }
        }

        Command::Suggest { file, text, cursor } => {
            session.open_file(&file).await?;
            let cursor = cursor.unwrap_or_else(|| text.chars().count());
            let mut popup = SuggestionPopup::new();
            popup.refresh(&session.suggestions(), &text, cursor);
            for item in popup.items() {
                println!("{}", item);
            }
        }
    }

    Ok(())
}
