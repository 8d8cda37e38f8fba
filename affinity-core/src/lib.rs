//! Relationship tracking with language-model evaluated interactions.
//!
//! This crate provides:
//! - The character data model and favorability policy
//! - A character store with durable, versioned persistence
//! - An interaction evaluator backed by Gemini or SiliconFlow
//! - A tracker tying the two together, plus testing utilities
//!
//! # Quick Start
//!
//! ```ignore
//! use affinity_core::{CharacterDraft, Tracker, TrackerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tracker = Tracker::open(TrackerConfig::from_env()?).await;
//!
//!     let mei = tracker
//!         .add_character(CharacterDraft::new("Mei", "blunt, loyal").with_relationship("roommate"))
//!         .await;
//!
//!     let recorded = tracker
//!         .record_interaction(mei.id, "Cooked dinner for her after a long shift")
//!         .await?;
//!     println!("{}", recorded.verdict.character_response);
//!
//!     Ok(())
//! }
//! ```

pub mod character;
pub mod evaluator;
pub mod id;
pub mod persist;
pub mod store;
pub mod testing;
pub mod tracker;

// Primary public API
pub use character::{
    Character, CharacterDraft, Interaction, RelationshipTier, FAVORABILITY_MAX, FAVORABILITY_MIN,
    INITIAL_STATUS, MAX_HISTORY,
};
pub use evaluator::{
    Credential, Evaluate, EvaluateError, EvaluateErrorKind, Evaluator, EvaluatorConfig, Verdict,
};
pub use id::{CharacterId, InteractionId};
pub use persist::{FileStorage, MemoryStorage, PersistError, Storage, STORAGE_KEY};
pub use store::CharacterStore;
pub use testing::{MockEvaluator, MockReply, TestHarness};
pub use tracker::{Recorded, Tracker, TrackerConfig, TrackerError};

// Re-export for convenience
pub use affinity_llm::Provider;
