//! Durable per-feed state: watermark, notified-id set and item history.
//!
//! Every cycle loads fresh at start and writes once in PERSIST. Writers must
//! replace whole records; a torn file must never be observable to `load`.

pub mod file;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::gate::NotifiedIdSet;
use crate::item::{ItemDescriptor, ItemId};

pub use file::FileStateStore;

#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// `Ok(None)` on first run; errors only when the medium is unreachable.
    async fn load_watermark(&self, feed: &str) -> Result<Option<ItemId>, StorageError>;
    async fn save_watermark(&self, feed: &str, last_seen: ItemId) -> Result<(), StorageError>;
}

#[async_trait]
pub trait NotifiedStore: Send + Sync {
    async fn load_notified(&self, feed: &str) -> Result<NotifiedIdSet, StorageError>;
    async fn save_notified(&self, feed: &str, set: &NotifiedIdSet) -> Result<(), StorageError>;
}

/// Accumulated item records: what the feed has shown so far.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn load_history(&self, feed: &str) -> Result<Vec<ItemDescriptor>, StorageError>;
    async fn save_history(&self, feed: &str, items: &[ItemDescriptor]) -> Result<(), StorageError>;
}

pub trait StateStore: WatermarkStore + NotifiedStore + HistoryStore {}

impl<T: WatermarkStore + NotifiedStore + HistoryStore> StateStore for T {}

/// Upsert `fresh` into `existing` by id, newest first, capped at `limit`.
pub fn merge_history(
    existing: Vec<ItemDescriptor>,
    fresh: &[ItemDescriptor],
    limit: usize,
) -> Vec<ItemDescriptor> {
    use std::collections::BTreeMap;

    let mut by_id: BTreeMap<ItemId, ItemDescriptor> =
        existing.into_iter().map(|it| (it.id, it)).collect();
    for it in fresh {
        by_id.insert(it.id, it.clone());
    }
    by_id.into_values().rev().take(limit).collect()
}
