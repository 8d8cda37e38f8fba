//! Testing utilities.
//!
//! This module provides tools for integration testing:
//! - `MockEvaluator` for deterministic testing without API calls
//! - `TestHarness` for scripted tracking scenarios
//! - Assertion helpers for verifying character state

use crate::character::{Character, CharacterDraft};
use crate::evaluator::{build_prompt, parse_verdict, Evaluate, EvaluateError, Verdict};
use crate::id::CharacterId;
use crate::persist::MemoryStorage;
use crate::store::CharacterStore;
use crate::tracker::{Recorded, Tracker, TrackerError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A scripted reply from the mock evaluator.
#[derive(Debug)]
pub enum MockReply {
    /// Raw model text, run through the real response parser.
    Text(String),
    /// Fail with this error.
    Error(EvaluateError),
}

impl MockReply {
    /// A well-formed reply carrying `verdict`.
    pub fn verdict(verdict: &Verdict) -> Self {
        let mut fields = serde_json::json!({
            "favorabilityChange": verdict.favorability_change,
            "newStatus": verdict.new_status,
            "characterResponse": verdict.character_response,
        });
        if let Some(ref reasoning) = verdict.reasoning {
            fields["reasoning"] = reasoning.clone().into();
        }
        MockReply::Text(fields.to_string())
    }
}

/// One call the mock evaluator received.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub character_id: CharacterId,
    pub user_input: String,
    /// The prompt the real evaluator would have sent.
    pub prompt: String,
}

/// An evaluator that returns scripted replies in order.
///
/// Use this for deterministic tests without API calls. When the script runs
/// out every call fails with [`EvaluateError::EmptyResponse`].
#[derive(Debug, Default)]
pub struct MockEvaluator {
    replies: Mutex<VecDeque<MockReply>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock with replies already queued.
    pub fn with_replies(replies: impl IntoIterator<Item = MockReply>) -> Self {
        let mock = Self::new();
        for reply in replies {
            mock.queue(reply);
        }
        mock
    }

    pub fn queue(&self, reply: MockReply) {
        lock(&self.replies).push_back(reply);
    }

    pub fn queue_verdict(&self, verdict: &Verdict) {
        self.queue(MockReply::verdict(verdict));
    }

    pub fn queue_text(&self, text: impl Into<String>) {
        self.queue(MockReply::Text(text.into()));
    }

    pub fn queue_error(&self, error: EvaluateError) {
        self.queue(MockReply::Error(error));
    }

    /// Every call received so far, oldest first.
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Replies not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

#[async_trait]
impl Evaluate for MockEvaluator {
    async fn evaluate(
        &self,
        character: &Character,
        user_input: &str,
    ) -> Result<Verdict, EvaluateError> {
        lock(&self.calls).push(MockCall {
            character_id: character.id,
            user_input: user_input.to_string(),
            prompt: build_prompt(character, user_input),
        });

        let reply = lock(&self.replies).pop_front();
        match reply {
            Some(MockReply::Text(text)) => parse_verdict(&text),
            Some(MockReply::Error(e)) => Err(e),
            None => Err(EvaluateError::EmptyResponse(
                "no scripted reply left".to_string(),
            )),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Test harness for running tracking scenarios against in-memory storage.
pub struct TestHarness {
    /// The tracker under test.
    pub tracker: Tracker<MockEvaluator>,
    storage: Arc<MemoryStorage>,
}

impl TestHarness {
    /// Create a harness with an empty collection.
    pub fn new() -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let store = CharacterStore::new(storage.clone());
        Self {
            tracker: Tracker::new(store, MockEvaluator::new()),
            storage,
        }
    }

    /// Add a character with just a name and personality.
    pub async fn add(&self, name: &str, personality: &str) -> CharacterId {
        self.tracker
            .add_character(CharacterDraft::new(name, personality))
            .await
            .id
    }

    /// Queue a well-formed verdict.
    pub fn expect_verdict(&self, change: i32, status: &str, response: &str) -> &Self {
        self.evaluator().queue_verdict(&Verdict::new(change, status, response));
        self
    }

    /// Queue raw model text.
    pub fn expect_text(&self, text: impl Into<String>) -> &Self {
        self.evaluator().queue_text(text);
        self
    }

    /// Queue an evaluation failure.
    pub fn expect_error(&self, error: EvaluateError) -> &Self {
        self.evaluator().queue_error(error);
        self
    }

    /// Record an interaction through the tracker.
    pub async fn record(&self, id: CharacterId, text: &str) -> Result<Recorded, TrackerError> {
        self.tracker.record_interaction(id, text).await
    }

    pub async fn character(&self, id: CharacterId) -> Option<Character> {
        self.tracker.character(id).await
    }

    pub fn evaluator(&self) -> &MockEvaluator {
        self.tracker.evaluator()
    }

    /// The backing storage, for inspecting what was persisted.
    pub fn storage(&self) -> &MemoryStorage {
        &self.storage
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert a character's favorability.
#[track_caller]
pub fn assert_favorability(character: &Character, expected: i32) {
    assert_eq!(
        character.favorability, expected,
        "Expected {} to have favorability {expected}, got {}",
        character.name, character.favorability
    );
}

/// Assert a character's status.
#[track_caller]
pub fn assert_status(character: &Character, expected: &str) {
    assert_eq!(
        character.status, expected,
        "Expected {} to have status '{expected}', got '{}'",
        character.name, character.status
    );
}

/// Assert how many interactions a character's history holds.
#[track_caller]
pub fn assert_history_len(character: &Character, expected: usize) {
    assert_eq!(
        character.history.len(),
        expected,
        "Expected {} history entries for {}, got {}",
        expected,
        character.name,
        character.history.len()
    );
}

/// Assert the most recent interaction's input text.
#[track_caller]
pub fn assert_latest_input(character: &Character, expected: &str) {
    let latest = character.latest().map(|i| i.user_input.as_str());
    assert_eq!(
        latest,
        Some(expected),
        "Expected latest interaction for {} to be '{expected}'",
        character.name
    );
}
