//! File content fetching

use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;

use super::preview::{FileContent, FileFormat, PreviewPayload};
use crate::DataError;

/// Source of uploaded file contents
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Fetch the contents of `file_id`
    async fn fetch(&self, file_id: &str) -> anyhow::Result<FileContent>;
}

/// Fetcher serving files from a local directory
///
/// CSV files are returned as text. JSON files must hold an array of
/// records and are returned parsed. XML needs the preview backend.
pub struct LocalFileFetcher {
    root: PathBuf,
}

impl LocalFileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, file_id: &str) -> Result<PathBuf, DataError> {
        let relative = Path::new(file_id);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(DataError::Other(format!(
                "file id '{}' leaves the upload directory",
                file_id
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileFetcher for LocalFileFetcher {
    async fn fetch(&self, file_id: &str) -> anyhow::Result<FileContent> {
        let path = self.resolve(file_id)?;
        let format = FileFormat::from_path(&path)?;

        match format {
            FileFormat::Csv => {
                let text = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Ok(FileContent::Text(text))
            }
            FileFormat::Json => {
                let text = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let value: serde_json::Value = serde_json::from_str(&text)
                    .with_context(|| format!("invalid JSON in {}", path.display()))?;
                Ok(FileContent::Parsed(PreviewPayload::from_records(value)?))
            }
            FileFormat::Xml => Err(DataError::UnsupportedFormat(format!(
                "{} (XML previews are parsed by the preview service)",
                file_id
            ))
            .into()),
        }
    }
}
