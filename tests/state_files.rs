// tests/state_files.rs
use std::sync::Arc;

use board_watcher::config::{CutoffMode, FeedConfig};
use board_watcher::engine::FeedRunner;
use board_watcher::error::{CycleError, StorageError};
use board_watcher::item::Comment;
use board_watcher::state::FileStateStore;
use board_watcher::testing::{RecordingNotifier, ScriptedAdapter};
use board_watcher::ItemDescriptor;

fn read_json(path: &std::path::Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn watermark_and_history_survive_a_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let state_dir = tmp.path().join("state");
    let output_dir = tmp.path().join("output");
    let notifier = Arc::new(RecordingNotifier::new());
    let feed = FeedConfig::new("update", "https://example.com");

    let first = FeedRunner::new(
        feed.clone(),
        Arc::new(ScriptedAdapter::with_ids(&[105, 104, 103, 99])),
        Arc::new(FileStateStore::new(&state_dir, &output_dir)),
        notifier.clone(),
    );
    first.run_cycle().await.unwrap();

    let store = FileStateStore::new(&state_dir, &output_dir);
    let wm = read_json(&store.watermark_path("update"));
    assert_eq!(wm["last_seen_id"], 105);

    let history: Vec<ItemDescriptor> =
        serde_json::from_value(read_json(&store.history_path("update"))).unwrap();
    let ids: Vec<u64> = history.iter().map(|it| it.id.0).collect();
    assert_eq!(ids, vec![105, 104, 103, 99]);
    assert_eq!(history[0].body.as_deref(), Some("body of 105"));

    // fresh process, fresh store instance
    let second = FeedRunner::new(
        feed,
        Arc::new(ScriptedAdapter::with_ids(&[106, 105, 104])),
        Arc::new(FileStateStore::new(&state_dir, &output_dir)),
        notifier.clone(),
    );
    let report = second.run_cycle().await.unwrap();
    assert_eq!(report.delivered.len(), 1);
    assert_eq!(notifier.sent_ids(), vec![99, 103, 104, 105, 106]);
    assert_eq!(read_json(&store.watermark_path("update"))["last_seen_id"], 106);
}

#[tokio::test]
async fn notified_record_lists_delivered_ids() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStateStore::new(tmp.path().join("s"), tmp.path().join("o")));
    let feed = FeedConfig::new("notice", "https://example.com").with_cutoff(CutoffMode::NotifiedSet);

    FeedRunner::new(
        feed,
        Arc::new(ScriptedAdapter::with_ids(&[21, 20])),
        store.clone(),
        Arc::new(RecordingNotifier::new()),
    )
    .run_cycle()
    .await
    .unwrap();

    let v = read_json(&store.notified_path("notice"));
    assert_eq!(v["notified_ids"], serde_json::json!([20, 21]));
}

#[tokio::test]
async fn corrupt_state_file_fails_the_cycle_without_notifying() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStateStore::new(tmp.path(), tmp.path()));
    std::fs::write(store.watermark_path("update"), b"not json").unwrap();
    let notifier = Arc::new(RecordingNotifier::new());

    let err = FeedRunner::new(
        FeedConfig::new("update", "https://example.com"),
        Arc::new(ScriptedAdapter::with_ids(&[2, 1])),
        store.clone(),
        notifier.clone(),
    )
    .run_cycle()
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        CycleError::Storage {
            source: StorageError::Corrupt { .. },
            ..
        }
    ));
    assert_eq!(notifier.attempts(), 0);
    // the broken record is left for an operator to inspect
    assert_eq!(std::fs::read(store.watermark_path("update")).unwrap(), b"not json");
}

#[tokio::test]
async fn comments_are_written_with_the_history_record() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(tmp.path().join("s"), tmp.path().join("o"));
    let adapter = ScriptedAdapter::with_ids(&[88123, 88122]).with_comments(
        88123,
        vec![Comment {
            id: "모험가1".into(),
            text: "저요".into(),
            date: "06.17 14:05:11".into(),
        }],
    );

    FeedRunner::new(
        FeedConfig::new("gallery", "https://example.com").with_cutoff(CutoffMode::NotifiedSet),
        Arc::new(adapter),
        Arc::new(store.clone()),
        Arc::new(RecordingNotifier::new()),
    )
    .run_cycle()
    .await
    .unwrap();

    let raw = read_json(&store.history_path("gallery"));
    assert_eq!(raw[0]["comments"][0]["text"], "저요");
    // posts without comments carry no empty list
    assert!(raw[1].get("comments").is_none());

    let history: Vec<ItemDescriptor> = serde_json::from_value(raw).unwrap();
    assert_eq!(history[0].comments.len(), 1);
    assert!(history[1].comments.is_empty());
}
