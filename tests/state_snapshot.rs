use meshbridge::storage::{StateCommon, StateStore, StateTree, TreeObject};
use serde_json::json;

#[test]
fn snapshot_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("nested").join("state.json");

    let mut store = StateStore::new();
    store.create_channel("Meshtastic", "Meshtastic");
    store.create_state(
        "Meshtastic.Chats.0.history",
        StateCommon::text("History", "json", false),
    );
    store
        .set_state("Meshtastic.Chats.0.history", json!("[]"), true)
        .unwrap();
    assert!(store.is_dirty());
    store.save(&file).unwrap();

    let loaded = StateStore::load(&file).unwrap();
    assert!(!loaded.is_dirty());
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.get_str("Meshtastic.Chats.0.history"), Some("[]"));
    assert!(matches!(
        loaded.object("Meshtastic"),
        Some(TreeObject::Channel { .. })
    ));

    // No temp files left next to the snapshot
    let leftovers: Vec<_> = std::fs::read_dir(file.parent().unwrap())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn corrupt_or_missing_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    assert!(StateStore::open(dir.path().join("missing.json")).is_empty());

    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, "{ not json").unwrap();
    assert!(StateStore::load(&bad).is_err());
    assert!(StateStore::open(&bad).is_empty());
}

#[test]
fn host_writes_survive_reload_but_are_not_requeued() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("state.json");

    let mut store = StateStore::new();
    store.create_state("x.sendPing", StateCommon::boolean("Ping", "button", true));
    store.set_state("x.sendPing", json!(true), false).unwrap();
    store.save(&file).unwrap();

    let mut loaded = StateStore::open(&file);
    assert_eq!(loaded.get_state("x.sendPing"), Some(&json!(true)));
    assert!(loaded.drain_writes().is_empty());
}
