//! Tests that the collection survives a restart.

use affinity_core::persist::{save_characters, SavedRoster};
use affinity_core::{
    CharacterDraft, CharacterStore, FileStorage, MemoryStorage, Storage, Verdict,
    FAVORABILITY_MAX, FAVORABILITY_MIN, STORAGE_KEY,
};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_reopen_yields_same_collection() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    let before = {
        let store = CharacterStore::open(Arc::new(FileStorage::new(temp_dir.path()))).await;
        let a = store
            .add_character(
                CharacterDraft::new("Noor", "thoughtful")
                    .with_relationship("mentor")
                    .with_description("Met at the hackathon"),
            )
            .await;
        store.add_character(CharacterDraft::new("Sam", "loud")).await;
        store
            .apply_verdict(
                a.id,
                "Asked for career advice",
                &Verdict::new(7, "Respected", "Noor was glad to help.").with_reasoning("Trust."),
            )
            .await
    };

    let reopened = CharacterStore::open(Arc::new(FileStorage::new(temp_dir.path()))).await;

    assert_eq!(reopened.characters().await, before);
}

#[tokio::test]
async fn test_corrupt_document_yields_empty_collection() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let storage = FileStorage::new(temp_dir.path());
    tokio::fs::write(storage.path_for(STORAGE_KEY), "{\"version\": 1, \"charac")
        .await
        .unwrap();

    let store = CharacterStore::open(Arc::new(storage)).await;

    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_newer_version_yields_empty_collection() {
    let storage = MemoryStorage::with_entry(
        STORAGE_KEY,
        r#"{"version": 99, "savedAt": "2030-01-01T00:00:00Z", "people": {}}"#,
    );

    let store = CharacterStore::open(Arc::new(storage)).await;

    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_corrupt_document_is_replaced_on_next_write() {
    let storage = Arc::new(MemoryStorage::with_entry(STORAGE_KEY, "garbage"));
    let store = CharacterStore::open(storage.clone()).await;

    store.add_character(CharacterDraft::new("Lee", "calm")).await;

    let saved = SavedRoster::from_json(&storage.get(STORAGE_KEY).unwrap()).unwrap();
    assert_eq!(saved.characters.len(), 1);
    assert_eq!(saved.characters[0].name, "Lee");
}

#[tokio::test]
async fn test_missing_optional_fields_default() {
    let storage = MemoryStorage::new();
    let json = r#"{
        "version": 1,
        "savedAt": "2024-05-01T12:00:00Z",
        "characters": [{
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "name": "Old Friend",
            "personality": "nostalgic",
            "favorability": 42,
            "status": "Old pals"
        }]
    }"#;
    storage.write(STORAGE_KEY, json).await.unwrap();

    let store = CharacterStore::open(Arc::new(storage)).await;
    let characters = store.characters().await;

    assert_eq!(characters.len(), 1);
    assert_eq!(characters[0].favorability, 42);
    assert_eq!(characters[0].relationship_type, "");
    assert!(characters[0].history.is_empty());
}

#[tokio::test]
async fn test_out_of_range_favorability_is_clamped_on_open() {
    let json = r#"{
        "version": 1,
        "savedAt": "2024-05-01T12:00:00Z",
        "characters": [
            {
                "id": "550e8400-e29b-41d4-a716-446655440001",
                "name": "Edited By Hand",
                "personality": "smitten",
                "favorability": 900,
                "status": "Beyond"
            },
            {
                "id": "550e8400-e29b-41d4-a716-446655440002",
                "name": "Old Rival",
                "personality": "bitter",
                "favorability": -900,
                "status": "Nemesis"
            }
        ]
    }"#;
    let storage = MemoryStorage::with_entry(STORAGE_KEY, json);

    let store = CharacterStore::open(Arc::new(storage)).await;
    let characters = store.characters().await;

    assert_eq!(characters[0].favorability, FAVORABILITY_MAX);
    assert_eq!(characters[1].favorability, FAVORABILITY_MIN);
    assert_eq!(characters[0].status, "Beyond");

    // The next apply starts from the clamped score.
    let after = store
        .apply_verdict(characters[1].id, "Apologised", &Verdict::new(5, "Thawing", "Fine."))
        .await;
    assert_eq!(after[1].favorability, FAVORABILITY_MIN + 5);
}

#[tokio::test]
async fn test_empty_collection_is_saved() {
    let storage = MemoryStorage::new();
    save_characters(&storage, &[]).await.unwrap();

    let saved = SavedRoster::from_json(&storage.get(STORAGE_KEY).unwrap()).unwrap();
    assert_eq!(saved.version, 1);
    assert!(saved.characters.is_empty());
}
