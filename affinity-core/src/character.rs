//! Characters, their interaction history, and the favorability policy.
//!
//! A [`Character`] is a tracked real-world contact. Its score and status only
//! change by folding an evaluator [`Verdict`] into it with
//! [`Character::with_verdict`], which is a pure function: the old value is
//! consumed and a new one returned.

use crate::evaluator::Verdict;
use crate::id::{CharacterId, InteractionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest possible favorability.
pub const FAVORABILITY_MIN: i32 = -100;

/// Highest possible favorability.
pub const FAVORABILITY_MAX: i32 = 100;

/// Lower end of the delta range the model is asked to stay within.
pub const SUGGESTED_DELTA_MIN: i32 = -15;

/// Upper end of the delta range the model is asked to stay within.
pub const SUGGESTED_DELTA_MAX: i32 = 20;

/// Maximum interactions kept per character.
pub const MAX_HISTORY: usize = 50;

/// Status given to a freshly added character.
pub const INITIAL_STATUS: &str = "Stranger";

/// Add `delta` to `current` and clamp into `[FAVORABILITY_MIN, FAVORABILITY_MAX]`.
pub fn clamp_favorability(current: i32, delta: i32) -> i32 {
    current
        .saturating_add(delta)
        .clamp(FAVORABILITY_MIN, FAVORABILITY_MAX)
}

// ============================================================================
// Character
// ============================================================================

/// A tracked contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    /// Real-life relationship label, e.g. "coworker" or "sister".
    #[serde(default)]
    pub relationship_type: String,
    /// Personality tags, fed into every evaluation prompt.
    pub personality: String,
    /// Background notes, fed into every evaluation prompt.
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub avatar_url: String,
    pub favorability: i32,
    pub status: String,
    /// Newest first, at most [`MAX_HISTORY`] entries.
    #[serde(default)]
    pub history: Vec<Interaction>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Character {
    /// Create a new character from a draft.
    ///
    /// The character starts at zero favorability with [`INITIAL_STATUS`] and
    /// no history.
    pub fn new(draft: CharacterDraft) -> Self {
        Self {
            id: CharacterId::new(),
            name: draft.name,
            relationship_type: draft.relationship_type,
            personality: draft.personality,
            description: draft.description,
            avatar_url: draft.avatar_url,
            favorability: 0,
            status: INITIAL_STATUS.to_string(),
            history: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Fold an evaluation into this character.
    ///
    /// The score is clamped, the status replaced, and a new interaction is
    /// prepended to the history, dropping the oldest entries past
    /// [`MAX_HISTORY`].
    pub fn with_verdict(mut self, user_input: impl Into<String>, verdict: &Verdict) -> Self {
        self.favorability = clamp_favorability(self.favorability, verdict.favorability_change);
        self.status = verdict.new_status.clone();
        self.history.insert(0, Interaction::new(user_input, verdict));
        self.history.truncate(MAX_HISTORY);
        self
    }

    /// Pull a character read from storage back within the score range and
    /// the history cap.
    pub fn normalized(mut self) -> Self {
        self.favorability = clamp_favorability(self.favorability, 0);
        self.history.truncate(MAX_HISTORY);
        self
    }

    /// The most recent interaction, if any.
    pub fn latest(&self) -> Option<&Interaction> {
        self.history.first()
    }

    /// Coarse band the current score falls into.
    pub fn tier(&self) -> RelationshipTier {
        RelationshipTier::from_favorability(self.favorability)
    }
}

/// Input for adding a character.
///
/// Only `name` and `personality` are expected to be non-empty; the store
/// accepts anything and leaves that check to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterDraft {
    pub name: String,
    pub relationship_type: String,
    pub personality: String,
    pub description: String,
    pub avatar_url: String,
}

impl CharacterDraft {
    /// Create a draft with the two required fields.
    pub fn new(name: impl Into<String>, personality: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            personality: personality.into(),
            ..Default::default()
        }
    }

    /// Set the relationship label.
    pub fn with_relationship(mut self, relationship_type: impl Into<String>) -> Self {
        self.relationship_type = relationship_type.into();
        self
    }

    /// Set the background description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the avatar URL.
    pub fn with_avatar_url(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = avatar_url.into();
        self
    }

    /// List the required fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.personality.trim().is_empty() {
            missing.push("personality");
        }
        missing
    }

    /// Whether the draft has everything a form would require.
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

// ============================================================================
// Interaction
// ============================================================================

/// One logged event and the model's reading of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub id: InteractionId,
    pub user_input: String,
    pub character_response: String,
    /// The delta as reported, before clamping.
    pub favorability_change: i32,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Interaction {
    /// Record a verdict for the given input, stamped now.
    pub fn new(user_input: impl Into<String>, verdict: &Verdict) -> Self {
        Self {
            id: InteractionId::new(),
            user_input: user_input.into(),
            character_response: verdict.character_response.clone(),
            favorability_change: verdict.favorability_change,
            timestamp: Utc::now(),
            reasoning: verdict.reasoning.clone(),
        }
    }
}

// ============================================================================
// Tiers
// ============================================================================

/// Display bands over the favorability range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelationshipTier {
    Hostile,
    Cold,
    Neutral,
    Warm,
    Close,
}

impl RelationshipTier {
    pub fn from_favorability(favorability: i32) -> Self {
        match favorability {
            i32::MIN..=-50 => RelationshipTier::Hostile,
            -49..=-11 => RelationshipTier::Cold,
            -10..=10 => RelationshipTier::Neutral,
            11..=49 => RelationshipTier::Warm,
            _ => RelationshipTier::Close,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RelationshipTier::Hostile => "hostile",
            RelationshipTier::Cold => "cold",
            RelationshipTier::Neutral => "neutral",
            RelationshipTier::Warm => "warm",
            RelationshipTier::Close => "close",
        }
    }
}

impl fmt::Display for RelationshipTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(change: i32) -> Verdict {
        Verdict::new(change, "friendly", "They appreciated it.")
    }

    #[test]
    fn test_normalized_clamps_out_of_range_score() {
        let mut character = Character::new(CharacterDraft::new("Ada", "precise"));
        character.favorability = 900;
        assert_eq!(character.clone().normalized().favorability, FAVORABILITY_MAX);

        character.favorability = i32::MIN;
        assert_eq!(character.clone().normalized().favorability, FAVORABILITY_MIN);

        character.favorability = -12;
        assert_eq!(character.normalized().favorability, -12);
    }

    #[test]
    fn test_new_character_defaults() {
        let character = Character::new(
            CharacterDraft::new("Lin", "reserved, witty").with_relationship("coworker"),
        );

        assert_eq!(character.favorability, 0);
        assert_eq!(character.status, INITIAL_STATUS);
        assert!(character.history.is_empty());
        assert_eq!(character.relationship_type, "coworker");
        assert_eq!(character.description, "");
    }

    #[test]
    fn test_clamp_favorability() {
        assert_eq!(clamp_favorability(95, 20), FAVORABILITY_MAX);
        assert_eq!(clamp_favorability(-95, -15), FAVORABILITY_MIN);
        assert_eq!(clamp_favorability(10, -3), 7);
        assert_eq!(clamp_favorability(0, i32::MAX), FAVORABILITY_MAX);
        assert_eq!(clamp_favorability(-100, i32::MIN), FAVORABILITY_MIN);
    }

    #[test]
    fn test_with_verdict_prepends_and_replaces_status() {
        let character = Character::new(CharacterDraft::new("Lin", "reserved"))
            .with_verdict("bought coffee", &verdict(5))
            .with_verdict("forgot birthday", &Verdict::new(-10, "hurt", "Ouch."));

        assert_eq!(character.favorability, -5);
        assert_eq!(character.status, "hurt");
        assert_eq!(character.history.len(), 2);
        assert_eq!(character.history[0].user_input, "forgot birthday");
        assert_eq!(character.history[1].user_input, "bought coffee");
        assert_eq!(character.latest().map(|i| i.favorability_change), Some(-10));
    }

    #[test]
    fn test_history_records_unclamped_delta() {
        let mut character = Character::new(CharacterDraft::new("Lin", "reserved"));
        character.favorability = 95;

        let character = character.with_verdict("saved the day", &verdict(20));

        assert_eq!(character.favorability, FAVORABILITY_MAX);
        assert_eq!(character.history[0].favorability_change, 20);
    }

    #[test]
    fn test_history_is_capped() {
        let mut character = Character::new(CharacterDraft::new("Lin", "reserved"));
        for i in 0..(MAX_HISTORY + 5) {
            character = character.with_verdict(format!("event {i}"), &verdict(1));
        }

        assert_eq!(character.history.len(), MAX_HISTORY);
        assert_eq!(character.history[0].user_input, format!("event {}", MAX_HISTORY + 4));
        assert_eq!(character.history[MAX_HISTORY - 1].user_input, "event 5");
    }

    #[test]
    fn test_reasoning_is_carried_into_history() {
        let character = Character::new(CharacterDraft::new("Lin", "reserved"))
            .with_verdict("helped move", &verdict(8).with_reasoning("Acts of service land well."));

        assert_eq!(
            character.history[0].reasoning.as_deref(),
            Some("Acts of service land well.")
        );
    }

    #[test]
    fn test_draft_missing_fields() {
        assert!(CharacterDraft::new("Lin", "reserved").is_complete());
        assert_eq!(
            CharacterDraft::new(" ", "").missing_fields(),
            vec!["name", "personality"]
        );
    }

    #[test]
    fn test_tiers() {
        assert_eq!(RelationshipTier::from_favorability(-100), RelationshipTier::Hostile);
        assert_eq!(RelationshipTier::from_favorability(-20), RelationshipTier::Cold);
        assert_eq!(RelationshipTier::from_favorability(0), RelationshipTier::Neutral);
        assert_eq!(RelationshipTier::from_favorability(30), RelationshipTier::Warm);
        assert_eq!(RelationshipTier::from_favorability(100), RelationshipTier::Close);
    }

    #[test]
    fn test_character_json_uses_camel_case() {
        let character = Character::new(
            CharacterDraft::new("Lin", "reserved").with_avatar_url("https://example.com/a.png"),
        )
        .with_verdict("said hi", &verdict(1));

        let json = serde_json::to_value(&character).unwrap();
        assert_eq!(json["avatarUrl"], "https://example.com/a.png");
        assert_eq!(json["history"][0]["userInput"], "said hi");
        assert_eq!(json["history"][0]["favorabilityChange"], 1);
        assert!(json["history"][0].get("reasoning").is_none());

        let back: Character = serde_json::from_value(json).unwrap();
        assert_eq!(back, character);
    }
}
