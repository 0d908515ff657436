// src/state/file.rs
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::{HistoryStore, NotifiedStore, WatermarkStore};
use crate::error::StorageError;
use crate::gate::NotifiedIdSet;
use crate::item::{ItemDescriptor, ItemId};

/// JSON files on local disk.
///
/// - `{state_dir}/{feed}_latest_id.json`
/// - `{state_dir}/{feed}_notified.json`
/// - `{output_dir}/{feed}_contents.json`
#[derive(Debug, Clone)]
pub struct FileStateStore {
    state_dir: PathBuf,
    output_dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct WatermarkRecord {
    feed: String,
    last_seen_id: Option<ItemId>,
}

impl FileStateStore {
    pub fn new(state_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn watermark_path(&self, feed: &str) -> PathBuf {
        self.state_dir.join(format!("{}_latest_id.json", file_stem(feed)))
    }

    pub fn notified_path(&self, feed: &str) -> PathBuf {
        self.state_dir.join(format!("{}_notified.json", file_stem(feed)))
    }

    pub fn history_path(&self, feed: &str) -> PathBuf {
        self.output_dir.join(format!("{}_contents.json", file_stem(feed)))
    }
}

/// Feed keys end up in file names; keep them to a safe alphabet.
pub fn file_stem(feed: &str) -> String {
    feed.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    match fs::read_to_string(path).await {
        Ok(s) => serde_json::from_str(&s)
            .map(Some)
            .map_err(|source| StorageError::Corrupt {
                path: path.to_path_buf(),
                source,
            }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StorageError::Unavailable {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Write to a sibling temp file, then rename over the target.
async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let unavailable = |source: io::Error| StorageError::Unavailable {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await.map_err(unavailable)?;
        }
    }

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &json).await.map_err(unavailable)?;
    fs::rename(&tmp, path).await.map_err(unavailable)?;
    Ok(())
}

#[async_trait]
impl WatermarkStore for FileStateStore {
    async fn load_watermark(&self, feed: &str) -> Result<Option<ItemId>, StorageError> {
        let rec: Option<WatermarkRecord> = read_json(&self.watermark_path(feed)).await?;
        Ok(rec.and_then(|r| r.last_seen_id))
    }

    async fn save_watermark(&self, feed: &str, last_seen: ItemId) -> Result<(), StorageError> {
        let rec = WatermarkRecord {
            feed: feed.to_string(),
            last_seen_id: Some(last_seen),
        };
        write_json_atomic(&self.watermark_path(feed), &rec).await
    }
}

#[async_trait]
impl NotifiedStore for FileStateStore {
    async fn load_notified(&self, feed: &str) -> Result<NotifiedIdSet, StorageError> {
        Ok(read_json(&self.notified_path(feed)).await?.unwrap_or_default())
    }

    async fn save_notified(&self, feed: &str, set: &NotifiedIdSet) -> Result<(), StorageError> {
        write_json_atomic(&self.notified_path(feed), set).await
    }
}

#[async_trait]
impl HistoryStore for FileStateStore {
    async fn load_history(&self, feed: &str) -> Result<Vec<ItemDescriptor>, StorageError> {
        Ok(read_json(&self.history_path(feed)).await?.unwrap_or_default())
    }

    async fn save_history(&self, feed: &str, items: &[ItemDescriptor]) -> Result<(), StorageError> {
        write_json_atomic(&self.history_path(feed), &items).await
    }
}
