//! Tests for the record flow: evaluate, then fold into the store.
//!
//! These use `MockEvaluator` and in-memory storage, so they run offline.

use affinity_core::testing::{
    assert_favorability, assert_history_len, assert_latest_input, assert_status, TestHarness,
};
use affinity_core::{
    CharacterDraft, CharacterStore, Credential, EvaluateError, EvaluateErrorKind, Evaluator,
    EvaluatorConfig, MockEvaluator, Provider, Tracker, TrackerError, Verdict, FAVORABILITY_MAX,
    FAVORABILITY_MIN, INITIAL_STATUS, MAX_HISTORY, STORAGE_KEY,
};
use std::sync::Arc;

// =============================================================================
// Favorability and history bounds
// =============================================================================

#[tokio::test]
async fn test_favorability_saturates_at_max() {
    let harness = TestHarness::new();
    let id = harness.add("Rin", "warm").await;

    for _ in 0..5 {
        harness.expect_verdict(20, "Close friend", "Rin beamed.");
        harness.record(id, "Helped with the move").await.unwrap();
    }

    let rin = harness.character(id).await.unwrap();
    assert_favorability(&rin, FAVORABILITY_MAX);
    assert_history_len(&rin, 5);
}

#[tokio::test]
async fn test_favorability_saturates_at_min() {
    let harness = TestHarness::new();
    let id = harness.add("Rin", "warm").await;

    for _ in 0..8 {
        harness.expect_verdict(-15, "Estranged", "Rin stopped replying.");
        harness.record(id, "Cancelled again").await.unwrap();
    }

    assert_favorability(&harness.character(id).await.unwrap(), FAVORABILITY_MIN);
}

#[tokio::test]
async fn test_out_of_range_delta_is_clamped_but_recorded() {
    let harness = TestHarness::new();
    let id = harness.add("Rin", "warm").await;
    harness.expect_text(
        r#"{"favorabilityChange": 400, "newStatus": "Soulmates", "characterResponse": "!"}"#,
    );

    let recorded = harness.record(id, "Saved her cat").await.unwrap();

    assert_eq!(recorded.verdict.favorability_change, 400);
    let rin = recorded.character.unwrap();
    assert_favorability(&rin, FAVORABILITY_MAX);
    assert_eq!(rin.history[0].favorability_change, 400);
}

#[tokio::test]
async fn test_history_drops_oldest_past_cap() {
    let harness = TestHarness::new();
    let id = harness.add("Rin", "warm").await;

    for i in 0..=MAX_HISTORY {
        harness.expect_verdict(1, "Friendly", "ok");
        harness.record(id, &format!("event {i}")).await.unwrap();
    }

    let rin = harness.character(id).await.unwrap();
    assert_history_len(&rin, MAX_HISTORY);
    assert_latest_input(&rin, &format!("event {MAX_HISTORY}"));
    assert_eq!(rin.history[MAX_HISTORY - 1].user_input, "event 1");
}

// =============================================================================
// Round trip
// =============================================================================

#[tokio::test]
async fn test_add_then_apply_round_trip() {
    let harness = TestHarness::new();
    let id = harness.add("A", "p").await;

    let fresh = harness.character(id).await.unwrap();
    assert_favorability(&fresh, 0);
    assert_status(&fresh, INITIAL_STATUS);
    assert_history_len(&fresh, 0);

    harness.expect_verdict(10, "s", "r");
    harness.record(id, "went to the concert").await.unwrap();

    let a = harness.character(id).await.unwrap();
    assert_favorability(&a, 10);
    assert_status(&a, "s");
    assert_history_len(&a, 1);
    assert_eq!(a.history[0].character_response, "r");
    assert_eq!(a.history[0].favorability_change, 10);
    assert_latest_input(&a, "went to the concert");
}

#[tokio::test]
async fn test_fenced_reply_is_accepted() {
    let harness = TestHarness::new();
    let id = harness.add("A", "p").await;
    harness.expect_text(
        "```json\n{\"favorabilityChange\": -2, \"newStatus\": \"Wary\", \"characterResponse\": \"Hm.\", \"reasoning\": \"Late again.\"}\n```",
    );

    let a = harness.record(id, "Arrived an hour late").await.unwrap().character.unwrap();

    assert_favorability(&a, -2);
    assert_eq!(a.history[0].reasoning.as_deref(), Some("Late again."));
}

// =============================================================================
// Failures leave state untouched
// =============================================================================

#[tokio::test]
async fn test_malformed_reply_leaves_character_unchanged() {
    let harness = TestHarness::new();
    let id = harness.add("A", "p").await;
    let before = harness.character(id).await.unwrap();
    let saved_before = harness.storage().get(STORAGE_KEY);

    harness.expect_text(r#"{"favorabilityChange": 5, "characterResponse": "ok"}"#);
    let err = harness.record(id, "Brought snacks").await.unwrap_err();

    match err {
        TrackerError::Evaluate(ref e) => assert_eq!(e.kind(), EvaluateErrorKind::MalformedResponse),
        other => panic!("expected evaluation failure, got {other:?}"),
    }
    assert_eq!(harness.character(id).await.unwrap(), before);
    assert_eq!(harness.storage().get(STORAGE_KEY), saved_before);
}

#[tokio::test]
async fn test_transport_failure_leaves_character_unchanged() {
    let harness = TestHarness::new();
    let id = harness.add("A", "p").await;
    let before = harness.character(id).await.unwrap();

    harness.expect_error(EvaluateError::Transport("connection reset".into()));
    let err = harness.record(id, "Texted happy birthday").await.unwrap_err();

    assert!(err.user_message().contains("failed"));
    assert_eq!(harness.character(id).await.unwrap(), before);
}

#[tokio::test]
async fn test_missing_credential_fails_before_evaluating() {
    let evaluator = Evaluator::new(
        EvaluatorConfig::new(Provider::SiliconFlow)
            .with_credential(Credential::EnvVar("AFFINITY_TEST_UNSET_KEY_9F3A".into())),
    );
    let tracker = Tracker::new(CharacterStore::in_memory(), evaluator);
    let a = tracker.add_character(CharacterDraft::new("A", "p")).await;

    let err = tracker.record_interaction(a.id, "hello").await.unwrap_err();

    match err {
        TrackerError::Evaluate(e) => {
            assert_eq!(e.kind(), EvaluateErrorKind::Configuration);
            assert!(e.user_message().contains("not configured"));
        }
        other => panic!("expected configuration failure, got {other:?}"),
    }
    assert_eq!(tracker.character(a.id).await.unwrap().history.len(), 0);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_applies_to_different_characters_both_land() {
    let store = Arc::new(CharacterStore::in_memory());
    let a = store.add_character(CharacterDraft::new("A", "p")).await;
    let b = store.add_character(CharacterDraft::new("B", "q")).await;

    let tasks = (0..20).map(|i| {
        let store = store.clone();
        let id = if i % 2 == 0 { a.id } else { b.id };
        tokio::spawn(async move {
            store
                .apply_verdict(id, &format!("event {i}"), &Verdict::new(1, "s", "r"))
                .await;
        })
    });
    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }

    let a = store.get(a.id).await.unwrap();
    let b = store.get(b.id).await.unwrap();
    assert_eq!(a.favorability, 10);
    assert_eq!(b.favorability, 10);
    assert_eq!(a.history.len() + b.history.len(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_adds_and_removes_racing_applies_lose_nothing() {
    let store = Arc::new(CharacterStore::in_memory());
    let mut kept = Vec::new();
    let mut doomed = Vec::new();
    for i in 0..6 {
        let character = store.add_character(CharacterDraft::new(format!("C{i}"), "p")).await;
        if i % 2 == 0 {
            kept.push(character.id);
        } else {
            doomed.push(character.id);
        }
    }

    // Every existing character gets three +2 verdicts, the odd ones are
    // removed meanwhile, and four newcomers arrive.
    let applies: Vec<_> = (0..3)
        .flat_map(|round| kept.iter().chain(&doomed).map(move |id| (round, *id)))
        .map(|(round, id)| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .apply_verdict(id, &format!("round {round}"), &Verdict::new(2, "s", "r"))
                    .await;
            })
        })
        .collect();
    let removes: Vec<_> = doomed
        .iter()
        .map(|&id| {
            let store = store.clone();
            tokio::spawn(async move { store.remove_character(id).await })
        })
        .collect();
    let adds: Vec<_> = (0..4)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store.add_character(CharacterDraft::new(format!("New{i}"), "q")).await
            })
        })
        .collect();

    for result in futures::future::join_all(applies).await {
        result.unwrap();
    }
    for result in futures::future::join_all(removes).await {
        assert!(result.unwrap());
    }
    let added: Vec<_> = futures::future::join_all(adds)
        .await
        .into_iter()
        .map(|result| result.unwrap())
        .collect();

    assert_eq!(store.len().await, kept.len() + added.len());
    for id in &kept {
        let character = store.get(*id).await.unwrap();
        assert_eq!(character.favorability, 6);
        assert_eq!(character.history.len(), 3);
    }
    for id in &doomed {
        assert!(store.get(*id).await.is_none());
    }
    for newcomer in &added {
        let character = store.get(newcomer.id).await.unwrap();
        assert_eq!(character.favorability, 0);
        assert!(character.history.is_empty());
    }
}

#[tokio::test]
async fn test_concurrent_records_through_tracker() {
    let evaluator = MockEvaluator::new();
    evaluator.queue_verdict(&Verdict::new(3, "s", "r"));
    evaluator.queue_verdict(&Verdict::new(3, "s", "r"));
    let tracker = Tracker::new(CharacterStore::in_memory(), evaluator);
    let a = tracker.add_character(CharacterDraft::new("A", "p")).await;
    let b = tracker.add_character(CharacterDraft::new("B", "q")).await;

    let (ra, rb) = tokio::join!(
        tracker.record_interaction(a.id, "coffee"),
        tracker.record_interaction(b.id, "tea"),
    );
    ra.unwrap();
    rb.unwrap();

    assert_eq!(tracker.character(a.id).await.unwrap().favorability, 3);
    assert_eq!(tracker.character(b.id).await.unwrap().favorability, 3);
}

#[tokio::test]
async fn test_verdict_for_removed_character_is_dropped() {
    let store = CharacterStore::in_memory();
    let a = store.add_character(CharacterDraft::new("A", "p")).await;
    let b = store.add_character(CharacterDraft::new("B", "q")).await;

    assert!(store.remove_character(a.id).await);
    let characters = store.apply_verdict(a.id, "late", &Verdict::new(5, "s", "r")).await;

    assert_eq!(characters.len(), 1);
    assert_eq!(characters[0], b);
}
