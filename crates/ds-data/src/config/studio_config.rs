//! Studio-wide settings loaded from a JSON file

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::null_handling::NullConfig;
use crate::schema::{SchemaDetector, DEFAULT_SAMPLE_SIZE};
use crate::DataError;

/// Settings for column type inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Rows sampled per column
    pub sample_size: usize,

    /// Values treated as null while sampling
    pub null_config: NullConfig,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            null_config: NullConfig::default(),
        }
    }
}

impl InferenceConfig {
    /// Schema detector configured from these settings
    pub fn detector(&self) -> SchemaDetector {
        SchemaDetector::new()
            .with_sample_size(self.sample_size)
            .with_null_config(self.null_config.clone())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub inference: InferenceConfig,

    /// Rows kept in a file preview
    pub preview_rows: usize,

    /// Where confirmed schemas are persisted; in memory when unset
    pub override_store_path: Option<PathBuf>,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            inference: InferenceConfig::default(),
            preview_rows: 50,
            override_store_path: None,
        }
    }
}

impl StudioConfig {
    /// Load configuration, falling back to defaults when the file is missing
    pub fn load(path: &Path) -> Result<Self, DataError> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let config: StudioConfig = serde_json::from_str(&text)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), DataError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
