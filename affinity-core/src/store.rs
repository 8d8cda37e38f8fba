//! The character store.
//!
//! [`CharacterStore`] owns the authoritative collection for a session. Reads
//! hand out a cheap snapshot (`Arc<Vec<Character>>`). Every mutation builds a
//! whole new collection from the current one while holding the store lock,
//! swaps it in, and persists it before releasing the lock, so concurrent
//! mutations are applied and written in order.

use crate::character::{Character, CharacterDraft};
use crate::evaluator::Verdict;
use crate::id::CharacterId;
use crate::persist::{load_characters, save_characters, MemoryStorage, Storage};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Owns the character collection and its storage.
pub struct CharacterStore {
    characters: Mutex<Arc<Vec<Character>>>,
    storage: Arc<dyn Storage>,
}

impl CharacterStore {
    /// Create an empty store without reading `storage`.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_characters(storage, Vec::new())
    }

    /// Create a store holding `characters`.
    pub fn with_characters(storage: Arc<dyn Storage>, characters: Vec<Character>) -> Self {
        Self {
            characters: Mutex::new(Arc::new(characters)),
            storage,
        }
    }

    /// A store backed by fresh [`MemoryStorage`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Open a store, loading whatever `storage` holds.
    ///
    /// Missing, unreadable or incompatible data starts an empty collection.
    pub async fn open(storage: Arc<dyn Storage>) -> Self {
        let characters = match load_characters(storage.as_ref()).await {
            Ok(characters) => {
                info!(count = characters.len(), "Loaded characters");
                characters
            }
            Err(e) => {
                warn!(error = %e, "Discarding stored characters");
                Vec::new()
            }
        };
        Self::with_characters(storage, characters)
    }

    /// Snapshot of the current collection, in insertion order.
    pub async fn characters(&self) -> Arc<Vec<Character>> {
        self.characters.lock().await.clone()
    }

    /// Copy of the character with `id`.
    pub async fn get(&self, id: CharacterId) -> Option<Character> {
        self.characters
            .lock()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.characters.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.characters.lock().await.is_empty()
    }

    /// Add a new character built from `draft` at the end of the collection.
    ///
    /// No validation or de-duplication is performed.
    pub async fn add_character(&self, draft: CharacterDraft) -> Character {
        let character = Character::new(draft);

        let mut current = self.characters.lock().await;
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(character.clone());
        self.commit(&mut current, next).await;

        info!(character = %character.id, name = %character.name, "Added character");
        character
    }

    /// Fold a verdict into the character with `id`.
    ///
    /// Returns the resulting collection. An unknown id (for example a
    /// character removed while its evaluation was in flight) changes nothing.
    pub async fn apply_verdict(
        &self,
        id: CharacterId,
        user_input: &str,
        verdict: &Verdict,
    ) -> Arc<Vec<Character>> {
        let mut current = self.characters.lock().await;

        if !current.iter().any(|c| c.id == id) {
            debug!(character = %id, "Ignoring verdict for unknown character");
            return current.clone();
        }

        let next = current
            .iter()
            .map(|c| {
                if c.id == id {
                    c.clone().with_verdict(user_input, verdict)
                } else {
                    c.clone()
                }
            })
            .collect();

        self.commit(&mut current, next).await
    }

    /// Remove the character with `id`. Returns whether it existed.
    pub async fn remove_character(&self, id: CharacterId) -> bool {
        let mut current = self.characters.lock().await;

        let next: Vec<Character> = current.iter().filter(|c| c.id != id).cloned().collect();
        if next.len() == current.len() {
            debug!(character = %id, "Nothing to remove");
            return false;
        }

        self.commit(&mut current, next).await;
        info!(character = %id, "Removed character");
        true
    }

    /// Swap in `next` and persist it. Storage failures are logged; memory stays
    /// authoritative.
    async fn commit(
        &self,
        current: &mut Arc<Vec<Character>>,
        next: Vec<Character>,
    ) -> Arc<Vec<Character>> {
        let next = Arc::new(next);
        *current = next.clone();

        if let Err(e) = save_characters(self.storage.as_ref(), &next).await {
            error!(error = %e, "Failed to persist characters");
        }

        next
    }
}

impl std::fmt::Debug for CharacterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharacterStore").finish_non_exhaustive()
    }
}
