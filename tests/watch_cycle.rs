// tests/watch_cycle.rs
use std::sync::Arc;

use board_watcher::config::{CutoffMode, DateWindowConfig, FeedConfig, ItemFailurePolicy};
use board_watcher::engine::FeedRunner;
use board_watcher::error::{CycleError, ItemFailure};
use board_watcher::gate::GateState;
use board_watcher::ingest::scanner::StopReason;
use board_watcher::testing::{MemoryStore, RecordingNotifier, ScriptedAdapter};
use board_watcher::{ItemId, ListingRow};
use chrono::NaiveDate;

fn watermark_feed() -> FeedConfig {
    FeedConfig::new("update", "https://example.com")
}

fn notified_feed() -> FeedConfig {
    FeedConfig::new("notice", "https://example.com").with_cutoff(CutoffMode::NotifiedSet)
}

fn run(
    feed: FeedConfig,
    adapter: &Arc<ScriptedAdapter>,
    store: &Arc<MemoryStore>,
    notifier: &Arc<RecordingNotifier>,
) -> FeedRunner {
    FeedRunner::new(feed, adapter.clone(), store.clone(), notifier.clone())
}

#[tokio::test]
async fn watermark_100_accepts_newer_ids_and_advances_to_105() {
    let adapter = Arc::new(ScriptedAdapter::with_ids(&[105, 104, 103, 99, 98]));
    let store = Arc::new(MemoryStore::new().with_watermark("update", 100));
    let notifier = Arc::new(RecordingNotifier::new());

    let report = run(watermark_feed(), &adapter, &store, &notifier)
        .run_cycle()
        .await
        .unwrap();

    assert_eq!(report.scanned, 3);
    assert_eq!(report.delivered, vec![ItemId(103), ItemId(104), ItemId(105)]);
    assert_eq!(notifier.sent_ids(), vec![103, 104, 105]);
    assert_eq!(adapter.detail_calls(), 3);
    assert_eq!(store.watermark("update"), Some(ItemId(105)));
    assert!(report.persisted);
}

#[tokio::test]
async fn watermark_equal_to_page_max_does_no_detail_fetches() {
    let adapter = Arc::new(ScriptedAdapter::with_ids(&[105, 104, 103]));
    let store = Arc::new(MemoryStore::new().with_watermark("update", 105));
    let notifier = Arc::new(RecordingNotifier::new());

    let report = run(watermark_feed(), &adapter, &store, &notifier)
        .run_cycle()
        .await
        .unwrap();

    assert!(report.delivered.is_empty());
    assert_eq!(report.stop, Some(StopReason::AlreadySeen));
    assert_eq!(adapter.detail_calls(), 0);
    assert_eq!(notifier.attempts(), 0);
    assert_eq!(store.watermark("update"), Some(ItemId(105)));
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn notified_set_delivers_only_unknown_ids_then_grows() {
    let adapter = Arc::new(ScriptedAdapter::with_ids(&[9, 8, 7, 6]));
    let store = Arc::new(MemoryStore::new().with_notified("notice", &[7, 8]));
    let notifier = Arc::new(RecordingNotifier::new());

    run(notified_feed(), &adapter, &store, &notifier)
        .run_cycle()
        .await
        .unwrap();

    assert_eq!(notifier.sent_ids(), vec![6, 9]);
    assert_eq!(store.notified_ids("notice"), vec![6, 7, 8, 9]);
}

#[tokio::test]
async fn persisted_cycles_never_notify_twice() {
    let adapter = Arc::new(ScriptedAdapter::with_ids(&[3, 2, 1]));
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::new());

    for feed in [watermark_feed(), notified_feed()] {
        let runner = run(feed, &adapter, &store, &notifier);
        runner.run_cycle().await.unwrap();
        runner.run_cycle().await.unwrap();
    }
    // once per strategy, never twice within one
    assert_eq!(notifier.sent_ids(), vec![1, 2, 3, 1, 2, 3]);
}

#[tokio::test]
async fn unpersisted_cycles_are_idempotent() {
    let adapter = Arc::new(ScriptedAdapter::with_ids(&[105, 104, 103, 99]));
    let store = Arc::new(MemoryStore::new().with_watermark("update", 100));
    let notifier = Arc::new(RecordingNotifier::new());
    store.set_fail_saves(true);

    let runner = run(watermark_feed(), &adapter, &store, &notifier);
    let first = runner.run_cycle().await.unwrap_err();
    let second = runner.run_cycle().await.unwrap_err();

    assert!(matches!(first, CycleError::Storage { .. }));
    assert!(matches!(second, CycleError::Storage { .. }));
    // same scan both times: the failed PERSIST re-delivers, nothing is lost
    assert_eq!(notifier.sent_ids(), vec![103, 104, 105, 103, 104, 105]);
    assert_eq!(store.watermark("update"), Some(ItemId(100)));
}

#[tokio::test]
async fn crash_before_persist_redelivers_after_recovery() {
    let adapter = Arc::new(ScriptedAdapter::with_ids(&[12, 11]));
    let store = Arc::new(MemoryStore::new().with_notified("notice", &[10]));
    let notifier = Arc::new(RecordingNotifier::new());
    let runner = run(notified_feed(), &adapter, &store, &notifier);

    store.set_fail_saves(true);
    assert!(runner.run_cycle().await.is_err());
    store.set_fail_saves(false);
    runner.run_cycle().await.unwrap();
    runner.run_cycle().await.unwrap();

    assert_eq!(notifier.sent_ids(), vec![11, 12, 11, 12]);
    assert_eq!(store.notified_ids("notice"), vec![10, 11, 12]);
}

#[tokio::test]
async fn unreachable_store_fails_before_any_side_effect() {
    let adapter = Arc::new(ScriptedAdapter::with_ids(&[2, 1]));
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    store.set_fail_loads(true);

    let err = run(watermark_feed(), &adapter, &store, &notifier)
        .run_cycle()
        .await
        .unwrap_err();

    assert!(matches!(err, CycleError::Storage { .. }));
    assert_eq!(adapter.listing_calls(), 0);
    assert_eq!(notifier.attempts(), 0);
}

#[tokio::test]
async fn listing_failure_aborts_without_persisting() {
    let row = |id: u64| ListingRow::new(id.to_string(), format!("post {id}"));
    let adapter = Arc::new(
        ScriptedAdapter::paged(vec![vec![row(30), row(29)], vec![row(28)]]).fail_listing_page(2),
    );
    let store = Arc::new(MemoryStore::new().with_watermark("update", 20));
    let notifier = Arc::new(RecordingNotifier::new());

    let err = run(watermark_feed(), &adapter, &store, &notifier)
        .run_cycle()
        .await
        .unwrap_err();

    match err {
        CycleError::Listing { feed, source } => {
            assert_eq!(feed, "update");
            assert_eq!(source.page, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(adapter.detail_calls(), 0);
    assert_eq!(store.watermark("update"), Some(ItemId(20)));
}

#[tokio::test]
async fn detail_failure_under_skip_keeps_going() {
    let adapter = Arc::new(ScriptedAdapter::with_ids(&[105, 104, 103, 99]).fail_detail(104));
    let store = Arc::new(MemoryStore::new().with_watermark("update", 100));
    let notifier = Arc::new(RecordingNotifier::new());

    let report = run(watermark_feed(), &adapter, &store, &notifier)
        .run_cycle()
        .await
        .unwrap();

    assert_eq!(report.skipped, vec![ItemId(104)]);
    assert_eq!(notifier.sent_ids(), vec![103, 105]);
    // positional cutoff: the watermark still passes the skipped item
    assert_eq!(store.watermark("update"), Some(ItemId(105)));
    assert_eq!(store.history_ids("update"), vec![105, 103]);
}

#[tokio::test]
async fn detail_failure_under_skip_is_retried_by_notified_set() {
    let adapter = Arc::new(ScriptedAdapter::with_ids(&[6, 5]).fail_detail(6));
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::new());

    run(notified_feed(), &adapter, &store, &notifier)
        .run_cycle()
        .await
        .unwrap();

    assert_eq!(notifier.sent_ids(), vec![5]);
    assert_eq!(store.notified_ids("notice"), vec![5]);
}

#[tokio::test]
async fn detail_failure_under_abort_persists_nothing() {
    let adapter = Arc::new(ScriptedAdapter::with_ids(&[105, 104, 103, 99]).fail_detail(104));
    let store = Arc::new(MemoryStore::new().with_watermark("update", 100));
    let notifier = Arc::new(RecordingNotifier::new());
    let feed = watermark_feed().with_failure_policy(ItemFailurePolicy::Abort);

    let err = run(feed, &adapter, &store, &notifier)
        .run_cycle()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CycleError::ItemAborted {
            item_id: ItemId(104),
            reason: ItemFailure::Detail(_),
            ..
        }
    ));
    // 103 went out before the abort; the watermark did not move
    assert_eq!(notifier.sent_ids(), vec![103]);
    assert_eq!(store.watermark("update"), Some(ItemId(100)));
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn notify_failure_under_skip_still_counts_as_processed() {
    let adapter = Arc::new(ScriptedAdapter::with_ids(&[9, 8]));
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::new().fail_for(8));

    let report = run(notified_feed(), &adapter, &store, &notifier)
        .run_cycle()
        .await
        .unwrap();

    assert_eq!(report.notify_failures, vec![ItemId(8)]);
    assert_eq!(report.delivered, vec![ItemId(9)]);
    assert_eq!(store.notified_ids("notice"), vec![8, 9]);
    assert!(matches!(report.state, GateState::Notified(_)));
}

#[tokio::test]
async fn notify_failure_under_abort_fails_the_cycle() {
    let adapter = Arc::new(ScriptedAdapter::with_ids(&[9, 8]));
    let store = Arc::new(MemoryStore::new().with_notified("notice", &[1]));
    let notifier = Arc::new(RecordingNotifier::new().fail_for(8));
    let feed = notified_feed().with_failure_policy(ItemFailurePolicy::Abort);

    let err = run(feed, &adapter, &store, &notifier)
        .run_cycle()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CycleError::ItemAborted {
            reason: ItemFailure::Notify(_),
            ..
        }
    ));
    assert_eq!(store.notified_ids("notice"), vec![1]);
    assert_eq!(adapter.detail_calls(), 1);
}

#[tokio::test]
async fn date_window_feed_reads_range_and_dedups_by_set() {
    let dated = |id: u64, date: &str| ListingRow::new(id.to_string(), "t").with_date(date);
    let adapter = Arc::new(ScriptedAdapter::paged(vec![
        vec![dated(50, "11:20"), dated(49, "2025.06.16")],
        vec![dated(48, "2025.06.15"), dated(47, "2025.06.14")],
    ]));
    let store = Arc::new(MemoryStore::new().with_notified("gallery", &[49]));
    let notifier = Arc::new(RecordingNotifier::new());

    let mut feed = FeedConfig::new("gallery", "https://gall.example.com")
        .with_cutoff(CutoffMode::DateWindow);
    feed.page_param = Some("page".into());
    feed.date_window = Some(DateWindowConfig {
        lookback_days: Some(1),
        ..Default::default()
    });

    let report = run(feed, &adapter, &store, &notifier)
        .with_today(NaiveDate::from_ymd_opt(2025, 6, 17).unwrap())
        .run_cycle()
        .await
        .unwrap();

    // window is 06-16..=06-17; "11:20" is today
    assert_eq!(notifier.sent_ids(), vec![50]);
    assert_eq!(report.stop, Some(StopReason::WindowExhausted));
    assert_eq!(store.notified_ids("gallery"), vec![49, 50]);
}
