//! Durable storage for the character collection.
//!
//! The collection is saved as one versioned JSON document under
//! [`STORAGE_KEY`] in a key-value [`Storage`]. Two backends are provided:
//! [`FileStorage`] (one file per key) and [`MemoryStorage`] (tests, scratch
//! sessions).

use crate::character::Character;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio::fs;
use tracing::warn;

/// Key the character collection is stored under.
pub const STORAGE_KEY: &str = "affinity_characters";

/// Current document version.
const SAVE_VERSION: u32 = 1;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// A string key-value store.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read the value under `key`, or `None` if nothing was stored.
    async fn read(&self, key: &str) -> Result<Option<String>, PersistError>;

    /// Replace the value under `key`.
    async fn write(&self, key: &str, value: &str) -> Result<(), PersistError>;
}

// ============================================================================
// Document
// ============================================================================

/// The persisted form of the collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRoster {
    /// Format version for compatibility checking.
    pub version: u32,

    pub saved_at: DateTime<Utc>,

    pub characters: Vec<Character>,
}

impl SavedRoster {
    /// Wrap a collection for saving, stamped now.
    pub fn new(characters: Vec<Character>) -> Self {
        Self {
            version: SAVE_VERSION,
            saved_at: Utc::now(),
            characters,
        }
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a saved document, rejecting other format versions.
    pub fn from_json(content: &str) -> Result<Self, PersistError> {
        // Check the version before trusting the rest of the layout.
        #[derive(Deserialize)]
        struct Partial {
            version: u32,
        }

        let partial: Partial = serde_json::from_str(content)?;
        if partial.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: partial.version,
            });
        }

        Ok(serde_json::from_str(content)?)
    }
}

/// Load the stored collection. Nothing stored yields an empty collection.
///
/// Scores outside `[FAVORABILITY_MIN, FAVORABILITY_MAX]` are clamped and
/// histories cut to `MAX_HISTORY`.
pub async fn load_characters(storage: &dyn Storage) -> Result<Vec<Character>, PersistError> {
    let Some(content) = storage.read(STORAGE_KEY).await? else {
        return Ok(Vec::new());
    };

    let characters = SavedRoster::from_json(&content)?
        .characters
        .into_iter()
        .map(|character| {
            let stored = character.favorability;
            let character = character.normalized();
            if character.favorability != stored {
                warn!(
                    character = %character.id,
                    stored,
                    clamped = character.favorability,
                    "Stored favorability out of range"
                );
            }
            character
        })
        .collect();

    Ok(characters)
}

/// Save `characters` under [`STORAGE_KEY`].
pub async fn save_characters(
    storage: &dyn Storage,
    characters: &[Character],
) -> Result<(), PersistError> {
    let content = SavedRoster::new(characters.to_vec()).to_json()?;
    storage.write(STORAGE_KEY, &content).await
}

// ============================================================================
// File storage
// ============================================================================

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Store files under `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(key)))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, PersistError> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), PersistError> {
        fs::create_dir_all(&self.dir).await?;

        // Write then rename so readers never see a half-written file.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

// ============================================================================
// Memory storage
// ============================================================================

/// In-process storage, lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `value` already stored under `key`.
    pub fn with_entry(key: impl Into<String>, value: impl Into<String>) -> Self {
        let storage = Self::new();
        storage
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
        storage
    }

    /// Make every subsequent write fail with an IO error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// The raw value under `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.get(key))
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), PersistError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistError::Io(io::Error::other("storage is read-only")));
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
