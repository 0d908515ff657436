// src/testing.rs
// In-memory fakes for the core seams. Used by unit tests, the integration
// tests under tests/ and the watch-demo binary.

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::artifact::{ArtifactCapturer, CaptureSession};
use crate::error::{CaptureError, FetchError, NotifyError, StorageError};
use crate::gate::NotifiedIdSet;
use crate::ingest::types::SiteAdapter;
use crate::item::{Comment, ItemDescriptor, ItemDetail, ItemId, ListingRow};
use crate::notify::{Notification, Notifier};
use crate::state::{HistoryStore, NotifiedStore, WatermarkStore};

// --- Adapter ---

/// Serves canned listing pages. Page numbers are 1-based; pages past the end
/// come back empty.
pub struct ScriptedAdapter {
    pages: Vec<Vec<ListingRow>>,
    paginated: bool,
    failing_page: Option<u32>,
    failing_details: BTreeSet<ItemId>,
    comments: HashMap<ItemId, Vec<Comment>>,
    listing_calls: AtomicUsize,
    detail_calls: AtomicUsize,
}

impl ScriptedAdapter {
    /// Unpaginated board with one listing.
    pub fn single(rows: Vec<ListingRow>) -> Self {
        Self::build(vec![rows], false)
    }

    pub fn paged(pages: Vec<Vec<ListingRow>>) -> Self {
        Self::build(pages, true)
    }

    fn build(pages: Vec<Vec<ListingRow>>, paginated: bool) -> Self {
        Self {
            pages,
            paginated,
            failing_page: None,
            failing_details: BTreeSet::new(),
            comments: HashMap::new(),
            listing_calls: AtomicUsize::new(0),
            detail_calls: AtomicUsize::new(0),
        }
    }

    /// Convenience: one unpaginated page of `ids`, titled `post {id}`.
    pub fn with_ids(ids: &[u64]) -> Self {
        Self::single(
            ids.iter()
                .map(|id| ListingRow::new(id.to_string(), format!("post {id}")))
                .collect(),
        )
    }

    pub fn fail_listing_page(mut self, page: u32) -> Self {
        self.failing_page = Some(page);
        self
    }

    pub fn fail_detail(mut self, id: u64) -> Self {
        self.failing_details.insert(ItemId(id));
        self
    }

    /// Detail page of `id` shows these comments.
    pub fn with_comments(mut self, id: u64, comments: Vec<Comment>) -> Self {
        self.comments.insert(ItemId(id), comments);
        self
    }

    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SiteAdapter for ScriptedAdapter {
    async fn fetch_listing_page(
        &self,
        _feed: &str,
        page: u32,
    ) -> Result<Vec<ListingRow>, FetchError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_page == Some(page) {
            return Err(FetchError::Status {
                url: format!("scripted://list?page={page}"),
                status: 503,
            });
        }
        let idx = page.saturating_sub(1) as usize;
        Ok(self.pages.get(idx).cloned().unwrap_or_default())
    }

    async fn fetch_item_detail(&self, item: &ItemDescriptor) -> Result<ItemDetail, FetchError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_details.contains(&item.id) {
            return Err(FetchError::transport(self.item_url(item), "connection reset"));
        }
        Ok(ItemDetail {
            body: format!("body of {}", item.id),
            comments: self.comments.get(&item.id).cloned().unwrap_or_default(),
        })
    }

    fn item_url(&self, item: &ItemDescriptor) -> String {
        format!("scripted://item/{}", item.id)
    }

    fn feed_url(&self) -> String {
        "scripted://list".to_string()
    }

    fn is_paginated(&self) -> bool {
        self.paginated
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

// --- State ---

fn unavailable(what: &str) -> StorageError {
    StorageError::Unavailable {
        path: PathBuf::from(format!("memory://{what}")),
        source: io::Error::new(io::ErrorKind::Other, "store offline"),
    }
}

/// All three stores in one map-backed fake. Loads and saves can be switched
/// off to simulate an unreachable medium.
#[derive(Default)]
pub struct MemoryStore {
    watermarks: Mutex<HashMap<String, ItemId>>,
    notified: Mutex<HashMap<String, NotifiedIdSet>>,
    history: Mutex<HashMap<String, Vec<ItemDescriptor>>>,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_watermark(self, feed: &str, id: u64) -> Self {
        self.watermarks
            .lock()
            .expect("store mutex poisoned")
            .insert(feed.to_string(), ItemId(id));
        self
    }

    pub fn with_notified(self, feed: &str, ids: &[u64]) -> Self {
        self.notified
            .lock()
            .expect("store mutex poisoned")
            .insert(feed.to_string(), ids.iter().copied().map(ItemId).collect());
        self
    }

    pub fn set_fail_loads(&self, on: bool) {
        self.fail_loads.store(on, Ordering::SeqCst);
    }

    pub fn set_fail_saves(&self, on: bool) {
        self.fail_saves.store(on, Ordering::SeqCst);
    }

    pub fn watermark(&self, feed: &str) -> Option<ItemId> {
        self.watermarks
            .lock()
            .expect("store mutex poisoned")
            .get(feed)
            .copied()
    }

    pub fn notified_ids(&self, feed: &str) -> Vec<u64> {
        self.notified
            .lock()
            .expect("store mutex poisoned")
            .get(feed)
            .map(|s| s.iter().map(|id| id.0).collect())
            .unwrap_or_default()
    }

    pub fn history_ids(&self, feed: &str) -> Vec<u64> {
        self.history
            .lock()
            .expect("store mutex poisoned")
            .get(feed)
            .map(|v| v.iter().map(|it| it.id.0).collect())
            .unwrap_or_default()
    }

    /// Number of successful save calls across all record kinds.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn check_load(&self, what: &str) -> Result<(), StorageError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(unavailable(what));
        }
        Ok(())
    }

    fn check_save(&self, what: &str) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(unavailable(what));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl WatermarkStore for MemoryStore {
    async fn load_watermark(&self, feed: &str) -> Result<Option<ItemId>, StorageError> {
        self.check_load("watermark")?;
        Ok(self.watermark(feed))
    }

    async fn save_watermark(&self, feed: &str, last_seen: ItemId) -> Result<(), StorageError> {
        self.check_save("watermark")?;
        self.watermarks
            .lock()
            .expect("store mutex poisoned")
            .insert(feed.to_string(), last_seen);
        Ok(())
    }
}

#[async_trait]
impl NotifiedStore for MemoryStore {
    async fn load_notified(&self, feed: &str) -> Result<NotifiedIdSet, StorageError> {
        self.check_load("notified")?;
        Ok(self
            .notified
            .lock()
            .expect("store mutex poisoned")
            .get(feed)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_notified(&self, feed: &str, set: &NotifiedIdSet) -> Result<(), StorageError> {
        self.check_save("notified")?;
        self.notified
            .lock()
            .expect("store mutex poisoned")
            .insert(feed.to_string(), set.clone());
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn load_history(&self, feed: &str) -> Result<Vec<ItemDescriptor>, StorageError> {
        self.check_load("history")?;
        Ok(self
            .history
            .lock()
            .expect("store mutex poisoned")
            .get(feed)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_history(&self, feed: &str, items: &[ItemDescriptor]) -> Result<(), StorageError> {
        self.check_save("history")?;
        self.history
            .lock()
            .expect("store mutex poisoned")
            .insert(feed.to_string(), items.to_vec());
        Ok(())
    }
}

// --- Notifier ---

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: BTreeSet<ItemId>,
    attempts: AtomicUsize,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every notify for `id` returns HTTP 500.
    pub fn fail_for(mut self, id: u64) -> Self {
        self.failing.insert(ItemId(id));
        self
    }

    pub fn sent_ids(&self) -> Vec<u64> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .iter()
            .map(|n| n.item.id.0)
            .collect()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }

    /// Successful and failed calls.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&n.item.id) {
            return Err(NotifyError::Status(500));
        }
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(n.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

// --- Capture ---

#[derive(Default)]
struct CaptureCounters {
    acquire_calls: AtomicUsize,
    acquired: AtomicUsize,
    released: AtomicUsize,
    captured: AtomicUsize,
}

/// Writes a tiny placeholder file instead of launching a browser.
#[derive(Default)]
pub struct FakeCapturer {
    counters: Arc<CaptureCounters>,
    fail_acquire: bool,
    fail_capture: bool,
}

impl FakeCapturer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_acquire(mut self) -> Self {
        self.fail_acquire = true;
        self
    }

    pub fn failing_capture(mut self) -> Self {
        self.fail_capture = true;
        self
    }

    /// Every `acquire` call, failed ones included.
    pub fn acquire_calls(&self) -> usize {
        self.counters.acquire_calls.load(Ordering::SeqCst)
    }

    /// Sessions handed out.
    pub fn acquired(&self) -> usize {
        self.counters.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }

    pub fn captured(&self) -> usize {
        self.counters.captured.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactCapturer for FakeCapturer {
    async fn acquire(&self) -> Result<Box<dyn CaptureSession>, CaptureError> {
        self.counters.acquire_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_acquire {
            return Err(CaptureError::Driver("fake driver offline".into()));
        }
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            counters: Arc::clone(&self.counters),
            fail: self.fail_capture,
        }))
    }
}

struct FakeSession {
    counters: Arc<CaptureCounters>,
    fail: bool,
}

#[async_trait]
impl CaptureSession for FakeSession {
    async fn capture(&mut self, url: &str, dest: &Path) -> Result<(), CaptureError> {
        if self.fail {
            return Err(CaptureError::Failed {
                url: url.to_string(),
                message: "fake capture failure".into(),
            });
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, b"\x89PNG").await?;
        self.counters.captured.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn release(self: Box<Self>) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}
