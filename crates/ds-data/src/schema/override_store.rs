//! Schema override store
//!
//! Keeps the user-confirmed schema of each file and the confirmation
//! status (`unconfirmed -> editing -> confirmed`). Values live in an opaque
//! key/value backend so the same store works in memory, on disk, or in
//! front of a remote service. Writes are last-write-wins.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{validate_unique_names, ColumnSchema};
use crate::DataError;

const OVERRIDE_PREFIX: &str = "schema-override:";
const STATUS_PREFIX: &str = "schema-status:";

/// Where a file's schema is in the confirmation workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaStatus {
    Unconfirmed,
    Editing,
    Confirmed,
}

impl fmt::Display for SchemaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaStatus::Unconfirmed => "unconfirmed",
            SchemaStatus::Editing => "editing",
            SchemaStatus::Confirmed => "confirmed",
        };
        f.write_str(name)
    }
}

/// Opaque string key/value storage
pub trait KeyValueBackend: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: String) -> Result<(), DataError>;
    fn remove(&self, key: &str) -> Result<(), DataError>;
}

/// Process-local backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<AHashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn put(&self, key: &str, value: String) -> Result<(), DataError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), DataError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Backend persisted as a single JSON object on disk
///
/// The whole document is rewritten on every change.
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl JsonFileBackend {
    /// Open the document at `path`, starting empty if it does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            if text.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&text)?
            }
        } else {
            BTreeMap::new()
        };

        debug!("Opened override store at {} ({} entries)", path.display(), entries.len());
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `entries` next to the document, then rename it into place
    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), DataError> {
        let mut staged = self.path.clone().into_os_string();
        staged.push(".tmp");
        let staged = PathBuf::from(staged);

        std::fs::write(&staged, serde_json::to_string_pretty(entries)?)?;
        if let Err(e) = std::fs::rename(&staged, &self.path) {
            let _ = std::fs::remove_file(&staged);
            return Err(e.into());
        }
        Ok(())
    }

    /// Apply `change` to a copy of the entries, keeping it only once on disk
    fn update<F>(&self, change: F) -> Result<(), DataError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let mut entries = self.entries.write();
        let mut next = entries.clone();
        if change(&mut next) {
            self.flush(&next)?;
            *entries = next;
        }
        Ok(())
    }
}

impl KeyValueBackend for JsonFileBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn put(&self, key: &str, value: String) -> Result<(), DataError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value);
            true
        })
    }

    fn remove(&self, key: &str) -> Result<(), DataError> {
        self.update(|entries| entries.remove(key).is_some())
    }
}

/// Per-file schema overrides and confirmation status
pub struct SchemaOverrideStore<B: KeyValueBackend = MemoryBackend> {
    backend: B,
}

impl SchemaOverrideStore<MemoryBackend> {
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }
}

impl<B: KeyValueBackend> SchemaOverrideStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Note that a file exists, recording `unconfirmed` for unseen files
    ///
    /// Files that already have a status or an override are left alone.
    pub fn register_file(&self, file_id: &str) -> Result<SchemaStatus, DataError> {
        if self.backend.get(&status_key(file_id)).is_none() && !self.has_override(file_id) {
            self.backend.put(&status_key(file_id), status_value(SchemaStatus::Unconfirmed)?)?;
            info!("Registered file '{}'", file_id);
        }
        Ok(self.status(file_id))
    }

    /// Previously saved schema, or `None`
    pub fn load_override(&self, file_id: &str) -> Option<Vec<ColumnSchema>> {
        let raw = self.backend.get(&override_key(file_id))?;
        match serde_json::from_str(&raw) {
            Ok(schema) => Some(schema),
            Err(e) => {
                warn!("Ignoring unreadable schema override for '{}': {}", file_id, e);
                None
            }
        }
    }

    /// Persist `schema` as the confirmed schema of `file_id`
    pub fn save_override(&self, file_id: &str, schema: &[ColumnSchema]) -> Result<(), DataError> {
        validate_unique_names(schema)?;

        let payload = serde_json::to_string(schema)?;

        // status goes first and is put back if the override write fails
        let previous = self.backend.get(&status_key(file_id));
        self.backend.put(&status_key(file_id), status_value(SchemaStatus::Confirmed)?)?;
        if let Err(e) = self.backend.put(&override_key(file_id), payload) {
            let restored = match previous {
                Some(raw) => self.backend.put(&status_key(file_id), raw),
                None => self.backend.remove(&status_key(file_id)),
            };
            if let Err(restore) = restored {
                warn!("Could not restore schema status of '{}': {}", file_id, restore);
            }
            return Err(e);
        }
        info!("Saved schema override for '{}' ({} columns)", file_id, schema.len());
        Ok(())
    }

    pub fn has_override(&self, file_id: &str) -> bool {
        self.load_override(file_id).is_some()
    }

    /// Status of a file; `unconfirmed` for files never seen
    pub fn status(&self, file_id: &str) -> SchemaStatus {
        let stored = self
            .backend
            .get(&status_key(file_id))
            .and_then(|raw| serde_json::from_str::<SchemaStatus>(&raw).ok());

        match stored {
            Some(status) => status,
            None if self.has_override(file_id) => SchemaStatus::Confirmed,
            None => SchemaStatus::Unconfirmed,
        }
    }

    /// Record workflow state without touching the saved schema
    ///
    /// A file with a saved override can not go back to `unconfirmed`; only
    /// [`Self::remove_file`] clears it.
    pub fn set_status(&self, file_id: &str, status: SchemaStatus) -> Result<(), DataError> {
        if status == SchemaStatus::Unconfirmed && self.has_override(file_id) {
            return Err(DataError::StatusRegression(file_id.to_string()));
        }

        self.backend.put(&status_key(file_id), status_value(status)?)?;
        debug!("Schema status of '{}' is now {}", file_id, status);
        Ok(())
    }

    /// Forget a file: override and status both go
    pub fn remove_file(&self, file_id: &str) -> Result<(), DataError> {
        self.backend.remove(&override_key(file_id))?;
        self.backend.remove(&status_key(file_id))?;
        info!("Removed schema state for '{}'", file_id);
        Ok(())
    }

    /// The override when one exists, otherwise `inferred`
    pub fn effective_schema(
        &self,
        file_id: &str,
        inferred: &[ColumnSchema],
    ) -> Vec<ColumnSchema> {
        self.load_override(file_id).unwrap_or_else(|| inferred.to_vec())
    }
}

fn override_key(file_id: &str) -> String {
    format!("{}{}", OVERRIDE_PREFIX, file_id)
}

fn status_key(file_id: &str) -> String {
    format!("{}{}", STATUS_PREFIX, file_id)
}

fn status_value(status: SchemaStatus) -> Result<String, DataError> {
    Ok(serde_json::to_string(&status)?)
}
