//! Tracker - the primary public API for recording interactions.
//!
//! Pairs a [`CharacterStore`] with an [`Evaluate`] implementation and runs
//! the record flow: snapshot the character, evaluate outside any lock, then
//! fold the verdict into the store.

use crate::character::{Character, CharacterDraft};
use crate::evaluator::{EvaluateError, Evaluate, Evaluator, EvaluatorConfig, Verdict};
use crate::id::CharacterId;
use crate::persist::FileStorage;
use crate::store::CharacterStore;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Directory used when `AFFINITY_DATA_DIR` is not set.
pub const DEFAULT_DATA_DIR: &str = ".affinity";

/// Errors from tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("No character with id {0}")]
    NotFound(CharacterId),

    #[error("Interaction text is empty")]
    EmptyInput,

    #[error(transparent)]
    Evaluate(#[from] EvaluateError),
}

impl TrackerError {
    /// Short message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            TrackerError::NotFound(_) => "That character no longer exists.".to_string(),
            TrackerError::EmptyInput => "Describe what happened first.".to_string(),
            TrackerError::Evaluate(e) => e.user_message(),
        }
    }
}

/// Configuration for opening a file-backed [`Tracker`].
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Directory holding the saved collection.
    pub data_dir: PathBuf,

    /// Evaluator settings.
    pub evaluator: EvaluatorConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            evaluator: EvaluatorConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Read `AFFINITY_DATA_DIR` plus the evaluator variables.
    pub fn from_env() -> Result<Self, TrackerError> {
        let mut config = Self {
            evaluator: EvaluatorConfig::from_env()?,
            ..Default::default()
        };

        if let Ok(dir) = std::env::var("AFFINITY_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }

        Ok(config)
    }

    /// Set the data directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the evaluator configuration.
    pub fn with_evaluator(mut self, evaluator: EvaluatorConfig) -> Self {
        self.evaluator = evaluator;
        self
    }
}

/// The outcome of recording one interaction.
#[derive(Debug, Clone)]
pub struct Recorded {
    /// What the evaluator said.
    pub verdict: Verdict,

    /// The character after the update, or `None` if it was removed while
    /// the evaluation was running.
    pub character: Option<Character>,
}

/// A store plus an evaluator.
pub struct Tracker<E> {
    store: CharacterStore,
    evaluator: E,
}

impl Tracker<Evaluator> {
    /// Open a tracker backed by files in `config.data_dir`.
    pub async fn open(config: TrackerConfig) -> Self {
        let storage = Arc::new(FileStorage::new(&config.data_dir));
        let store = CharacterStore::open(storage).await;
        Self::new(store, Evaluator::new(config.evaluator))
    }
}

impl<E: Evaluate> Tracker<E> {
    pub fn new(store: CharacterStore, evaluator: E) -> Self {
        Self { store, evaluator }
    }

    pub fn store(&self) -> &CharacterStore {
        &self.store
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub async fn add_character(&self, draft: CharacterDraft) -> Character {
        self.store.add_character(draft).await
    }

    pub async fn remove_character(&self, id: CharacterId) -> bool {
        self.store.remove_character(id).await
    }

    pub async fn characters(&self) -> Arc<Vec<Character>> {
        self.store.characters().await
    }

    pub async fn character(&self, id: CharacterId) -> Option<Character> {
        self.store.get(id).await
    }

    /// Evaluate `text` for the character with `id` and record the result.
    ///
    /// On any evaluation failure the store is left untouched.
    pub async fn record_interaction(
        &self,
        id: CharacterId,
        text: &str,
    ) -> Result<Recorded, TrackerError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TrackerError::EmptyInput);
        }

        let snapshot = self.store.get(id).await.ok_or(TrackerError::NotFound(id))?;
        let verdict = self.evaluator.evaluate(&snapshot, text).await?;

        let characters = self.store.apply_verdict(id, text, &verdict).await;
        let character = characters.iter().find(|c| c.id == id).cloned();

        if let Some(ref c) = character {
            info!(
                character = %id,
                favorability = c.favorability,
                status = %c.status,
                "Recorded interaction"
            );
        }

        Ok(Recorded { verdict, character })
    }
}

impl<E> std::fmt::Debug for Tracker<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
