//! File previews, file fetching and the SQLite query backend

pub mod fetcher;
pub mod preview;
pub mod sqlite_executor;

pub use fetcher::{FileFetcher, LocalFileFetcher};
pub use preview::{FileContent, FileFormat, FilePreview, PreviewPayload};
pub use sqlite_executor::{table_name_for, SqliteExecutor, TableRegistry};
