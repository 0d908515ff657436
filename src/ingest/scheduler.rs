// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::artifact::{CommandCapturer, FileArtifactStore};
use crate::config::WatchConfig;
use crate::engine::{ArtifactSupport, CycleReport, FeedRunner};
use crate::error::CycleError;
use crate::ingest::providers::BoardAdapter;
use crate::notify::Notifier;
use crate::state::{FileStateStore, StateStore};

/// One runner per configured feed, sharing the file store and the notifier.
pub fn build_runners(cfg: &WatchConfig, notifier: Arc<dyn Notifier>) -> Result<Vec<Arc<FeedRunner>>> {
    let settings = &cfg.settings;
    let store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(
        settings.state_dir.clone(),
        settings.output_dir.clone(),
    ));

    let artifacts = settings.browser_path.as_ref().map(|browser| ArtifactSupport {
        store: Arc::new(FileArtifactStore::new(settings.output_dir.clone())),
        capturer: Arc::new(CommandCapturer::new(
            browser.clone(),
            settings.state_dir.join("capture"),
        )),
    });

    let mut runners = Vec::with_capacity(cfg.feeds.len());
    for feed in &cfg.feeds {
        let adapter = Arc::new(BoardAdapter::new(feed.clone(), settings)?);
        let mut runner = FeedRunner::new(
            feed.clone(),
            adapter,
            Arc::clone(&store),
            Arc::clone(&notifier),
        );
        match (&artifacts, feed.capture_artifacts) {
            (Some(support), true) => runner = runner.with_artifacts(support.clone()),
            (None, true) => tracing::warn!(
                feed = feed.key.as_str(),
                "capture_artifacts is on but no browser_path is configured; sending without screenshots"
            ),
            _ => {}
        }
        runners.push(Arc::new(runner));
    }
    Ok(runners)
}

/// Run one cycle of every feed concurrently and wait for all of them.
pub async fn run_all_once(
    runners: &[Arc<FeedRunner>],
) -> Vec<(String, Result<CycleReport, CycleError>)> {
    let mut set = JoinSet::new();
    for runner in runners {
        let runner = Arc::clone(runner);
        set.spawn(async move {
            let out = runner.run_cycle().await;
            (runner.key().to_string(), out)
        });
    }

    let mut results = Vec::with_capacity(runners.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(r) => results.push(r),
            Err(e) => tracing::error!(error = %e, "feed task panicked"),
        }
    }
    results.sort_by(|a, b| a.0.cmp(&b.0));
    results
}

/// Sequential loop for one feed: a tick never overlaps the previous cycle.
/// Failures are logged by the runner; the next tick is the retry.
pub fn spawn_feed_loop(runner: Arc<FeedRunner>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let _ = runner.run_cycle().await;
        }
    })
}

pub fn spawn_all(runners: &[Arc<FeedRunner>], period: Duration) -> Vec<JoinHandle<()>> {
    tracing::info!(feeds = runners.len(), period_secs = period.as_secs(), "starting feed loops");
    runners
        .iter()
        .map(|r| spawn_feed_loop(Arc::clone(r), period))
        .collect()
}
