//! # Run Orchestrator
//! One cycle for one feed:
//!
//! `LOAD -> SCAN -> (FETCH_DETAIL -> CAPTURE_ARTIFACT? -> NOTIFY)* -> PERSIST`
//!
//! State is read fresh at the start of every cycle and written only in
//! PERSIST. A cycle that fails before PERSIST leaves the previous state
//! authoritative, so the next tick re-delivers instead of losing items.
//!
//! Callers guarantee single-flight per feed; distinct feeds share nothing.

use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use metrics::{counter, gauge};
use tracing::{debug, info, warn};

use crate::artifact::{ArtifactCapturer, ArtifactStore, CaptureSession};
use crate::config::{CutoffMode, FeedConfig, ItemFailurePolicy};
use crate::error::{CycleError, ItemFailure, StorageError};
use crate::gate::{DeliveryGate, GateState};
use crate::ingest::scanner::{Scanner, StopReason};
use crate::ingest::types::SiteAdapter;
use crate::item::{ItemDescriptor, ItemId};
use crate::notify::{Notification, Notifier};
use crate::state::{merge_history, StateStore};
use crate::telemetry::ensure_metrics_described;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Load,
    Scan,
    FetchDetail,
    CaptureArtifact,
    Notify,
    Persist,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Load => "load",
            CyclePhase::Scan => "scan",
            CyclePhase::FetchDetail => "fetch_detail",
            CyclePhase::CaptureArtifact => "capture_artifact",
            CyclePhase::Notify => "notify",
            CyclePhase::Persist => "persist",
        }
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a finished cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub feed: String,
    pub pages_fetched: u32,
    /// Items the scanner accepted, before the gate.
    pub scanned: usize,
    /// Notifications sent, ascending by id.
    pub delivered: Vec<ItemId>,
    /// Items dropped after a detail failure under the `skip` policy.
    pub skipped: Vec<ItemId>,
    /// Items whose notify failed under `skip`; they still count as processed.
    pub notify_failures: Vec<ItemId>,
    /// Events whose period was already over. Processed, never sent.
    pub expired: Vec<ItemId>,
    pub stop: Option<StopReason>,
    /// Gate state after the cycle (what PERSIST wrote, when it ran).
    pub state: GateState,
    pub persisted: bool,
}

impl CycleReport {
    fn new(feed: &str, state: GateState) -> Self {
        Self {
            feed: feed.to_string(),
            pages_fetched: 0,
            scanned: 0,
            delivered: Vec::new(),
            skipped: Vec::new(),
            notify_failures: Vec::new(),
            expired: Vec::new(),
            stop: None,
            state,
            persisted: false,
        }
    }
}

/// Artifact capture wiring: where screenshots live and how they are taken.
#[derive(Clone)]
pub struct ArtifactSupport {
    pub store: Arc<dyn ArtifactStore>,
    pub capturer: Arc<dyn ArtifactCapturer>,
}

/// Capture session borrowed for one cycle. Acquired on first use, released
/// by `release` whatever way the item loop ended.
struct CaptureScope<'a> {
    capturer: Option<&'a dyn ArtifactCapturer>,
    session: Option<Box<dyn CaptureSession>>,
    unavailable: bool,
}

impl<'a> CaptureScope<'a> {
    fn new(capturer: Option<&'a dyn ArtifactCapturer>) -> Self {
        Self {
            capturer,
            session: None,
            unavailable: false,
        }
    }

    async fn session(&mut self, feed: &str) -> Option<&mut (dyn CaptureSession + 'static)> {
        if self.session.is_none() && !self.unavailable {
            let capturer = self.capturer?;
            match capturer.acquire().await {
                Ok(s) => self.session = Some(s),
                Err(e) => {
                    // one attempt per cycle; the rest of the items go without
                    warn!(feed, error = %e, "capture driver unavailable this cycle");
                    self.unavailable = true;
                }
            }
        }
        self.session.as_deref_mut()
    }

    async fn release(self) {
        if let Some(session) = self.session {
            session.release().await;
        }
    }
}

pub struct FeedRunner {
    feed: FeedConfig,
    adapter: Arc<dyn SiteAdapter>,
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    artifacts: Option<ArtifactSupport>,
    today: Option<NaiveDate>,
    now: Option<NaiveDateTime>,
}

impl FeedRunner {
    pub fn new(
        feed: FeedConfig,
        adapter: Arc<dyn SiteAdapter>,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            feed,
            adapter,
            store,
            notifier,
            artifacts: None,
            today: None,
            now: None,
        }
    }

    /// Only used when the feed has `capture_artifacts` on.
    pub fn with_artifacts(mut self, support: ArtifactSupport) -> Self {
        self.artifacts = Some(support);
        self
    }

    /// Pin "today" for date parsing and date windows.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Pin the clock used to drop ended events. Also pins "today".
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self.today = Some(now.date());
        self
    }

    pub fn feed(&self) -> &FeedConfig {
        &self.feed
    }

    pub fn key(&self) -> &str {
        &self.feed.key
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        ensure_metrics_described();
        let key = self.feed.key.clone();
        counter!("watch_cycles_total", "feed" => key.clone()).increment(1);

        let out = self.run_inner().await;
        match &out {
            Ok(report) => {
                gauge!("watch_last_cycle_ts", "feed" => key.clone())
                    .set(chrono::Utc::now().timestamp() as f64);
                info!(
                    feed = key.as_str(),
                    pages = report.pages_fetched,
                    scanned = report.scanned,
                    delivered = report.delivered.len(),
                    skipped = report.skipped.len(),
                    notify_failures = report.notify_failures.len(),
                    expired = report.expired.len(),
                    persisted = report.persisted,
                    "cycle finished"
                );
            }
            Err(e) => {
                counter!("watch_cycle_failures_total", "feed" => key.clone()).increment(1);
                warn!(feed = key.as_str(), error = %e, "cycle failed; will retry next tick");
            }
        }
        out
    }

    async fn run_inner(&self) -> Result<CycleReport, CycleError> {
        let key = self.feed.key.as_str();
        let storage = |source: StorageError| CycleError::Storage {
            feed: key.to_string(),
            source,
        };

        // LOAD
        debug!(feed = key, phase = %CyclePhase::Load, "loading state");
        let mut gate = match self.feed.cutoff_mode {
            CutoffMode::Watermark => {
                DeliveryGate::watermark(self.store.load_watermark(key).await.map_err(storage)?)
            }
            CutoffMode::NotifiedSet | CutoffMode::DateWindow => {
                DeliveryGate::notified(self.store.load_notified(key).await.map_err(storage)?)
            }
        };
        let history = self.store.load_history(key).await.map_err(storage)?;

        let today = self
            .today
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        let window = self.feed.window(today);
        let mut report = CycleReport::new(key, gate.state().clone());
        if self.feed.cutoff_mode == CutoffMode::DateWindow && window.is_none() {
            warn!(feed = key, "date window resolves to an empty range; nothing to scan");
            return Ok(report);
        }

        // SCAN
        debug!(feed = key, phase = %CyclePhase::Scan, "scanning listing");
        let outcome = Scanner::new(self.adapter.as_ref(), key)
            .max_pages(self.feed.max_pages)
            .order(self.feed.listing_order)
            .today(today)
            .scan(&gate.scan_bound(window))
            .await
            .map_err(|source| CycleError::Listing {
                feed: key.to_string(),
                source,
            })?;
        counter!("watch_pages_fetched_total", "feed" => key.to_string())
            .increment(u64::from(outcome.pages_fetched));
        counter!("watch_items_accepted_total", "feed" => key.to_string())
            .increment(outcome.accepted.len() as u64);

        report.pages_fetched = outcome.pages_fetched;
        report.scanned = outcome.accepted.len();
        report.stop = Some(outcome.stop);

        let delivery = gate.admit(outcome.accepted);
        if delivery.is_empty() {
            debug!(feed = key, stop = ?outcome.stop, "no new items");
            return Ok(report);
        }
        info!(feed = key, new_items = delivery.len(), "new items found");

        // ITEMS
        let mut capture = CaptureScope::new(
            self.capture_enabled()
                .then(|| self.artifacts.as_ref().map(|a| a.capturer.as_ref()))
                .flatten(),
        );
        let mut fresh: Vec<ItemDescriptor> = Vec::with_capacity(delivery.len());
        let looped = self
            .process_items(delivery, &mut gate, &mut capture, &mut report, &mut fresh)
            .await;
        capture.release().await;
        looped?;

        // PERSIST
        report.state = gate.state().clone();
        if !gate.changed() && fresh.is_empty() {
            return Ok(report);
        }
        debug!(feed = key, phase = %CyclePhase::Persist, "persisting state");
        if !fresh.is_empty() {
            let merged = merge_history(history, &fresh, self.feed.history_limit);
            self.store
                .save_history(key, &merged)
                .await
                .map_err(storage)?;
        }
        match gate.state() {
            GateState::Watermark(Some(w)) => {
                self.store.save_watermark(key, *w).await.map_err(storage)?
            }
            GateState::Watermark(None) => {}
            GateState::Notified(set) => self.store.save_notified(key, set).await.map_err(storage)?,
        }
        report.persisted = true;

        if let Some(artifacts) = self.artifacts.as_ref().filter(|_| self.capture_enabled()) {
            let removed = artifacts.store.prune(key, self.feed.artifact_keep).await;
            if removed > 0 {
                debug!(feed = key, removed, "old artifacts pruned");
            }
        }
        Ok(report)
    }

    fn capture_enabled(&self) -> bool {
        self.feed.capture_artifacts && self.artifacts.is_some()
    }

    async fn process_items(
        &self,
        delivery: Vec<ItemDescriptor>,
        gate: &mut DeliveryGate,
        capture: &mut CaptureScope<'_>,
        report: &mut CycleReport,
        fresh: &mut Vec<ItemDescriptor>,
    ) -> Result<(), CycleError> {
        let key = self.feed.key.as_str();
        let abort = self.feed.item_failure_policy == ItemFailurePolicy::Abort;
        let now = self
            .now
            .unwrap_or_else(|| chrono::Local::now().naive_local());

        for mut item in delivery {
            let id = item.id;

            if let Some(period) = item.period.filter(|p| p.has_ended(now)) {
                info!(feed = key, item_id = %id, ended = %period.ends_at, "event already ended, not sending");
                gate.mark_processed(id);
                report.expired.push(id);
                continue;
            }

            // FETCH_DETAIL
            debug!(feed = key, item_id = %id, phase = %CyclePhase::FetchDetail, "fetching detail");
            let detail = match self.adapter.fetch_item_detail(&item).await {
                Ok(detail) => detail,
                Err(e) => {
                    counter!("watch_item_failures_total", "feed" => key.to_string()).increment(1);
                    if abort {
                        return Err(self.aborted(id, ItemFailure::Detail(e)));
                    }
                    warn!(feed = key, item_id = %id, error = %e, "detail fetch failed, skipping item");
                    gate.mark_skipped(id);
                    report.skipped.push(id);
                    continue;
                }
            };
            item.body = Some(detail.body);
            item.comments = detail.comments;

            // CAPTURE_ARTIFACT
            let artifact = self.capture_artifact(&item, capture).await;
            item.attachment_path = artifact.as_ref().map(|p| p.display().to_string());

            // NOTIFY
            let notification = Notification {
                feed: key.to_string(),
                item_url: self.adapter.item_url(&item),
                feed_url: self.adapter.feed_url(),
                category: self
                    .feed
                    .category_label
                    .clone()
                    .unwrap_or_else(|| item.category.clone()),
                artifact,
                item: item.clone(),
            };
            debug!(feed = key, item_id = %id, phase = %CyclePhase::Notify, notifier = self.notifier.name(), "notifying");
            match self.notifier.notify(&notification).await {
                Ok(()) => {
                    counter!("watch_items_delivered_total", "feed" => key.to_string()).increment(1);
                    report.delivered.push(id);
                }
                Err(e) => {
                    counter!("watch_notify_errors_total", "feed" => key.to_string()).increment(1);
                    counter!("watch_item_failures_total", "feed" => key.to_string()).increment(1);
                    if abort {
                        return Err(self.aborted(id, ItemFailure::Notify(e)));
                    }
                    warn!(feed = key, item_id = %id, error = %e, "notify failed, item still marked processed");
                    report.notify_failures.push(id);
                }
            }

            gate.mark_processed(id);
            fresh.push(item);
        }
        Ok(())
    }

    /// Reuses an artifact from an earlier cycle when the store has one.
    /// Failures only cost the attachment.
    async fn capture_artifact(
        &self,
        item: &ItemDescriptor,
        capture: &mut CaptureScope<'_>,
    ) -> Option<std::path::PathBuf> {
        if !self.capture_enabled() {
            return None;
        }
        let artifacts = self.artifacts.as_ref()?;
        let key = self.feed.key.as_str();

        if let Some(existing) = artifacts.store.existing(key, item.id).await {
            debug!(feed = key, item_id = %item.id, "reusing artifact");
            return Some(existing);
        }

        debug!(feed = key, item_id = %item.id, phase = %CyclePhase::CaptureArtifact, "capturing artifact");
        let dest = artifacts.store.path_for(key, item.id);
        let url = self.adapter.item_url(item);
        let session = capture.session(key).await?;
        match session.capture(&url, &dest).await {
            Ok(()) => Some(dest),
            Err(e) => {
                warn!(feed = key, item_id = %item.id, error = %e, "artifact capture failed");
                None
            }
        }
    }

    fn aborted(&self, item_id: ItemId, reason: ItemFailure) -> CycleError {
        CycleError::ItemAborted {
            feed: self.feed.key.clone(),
            item_id,
            reason,
        }
    }
}
