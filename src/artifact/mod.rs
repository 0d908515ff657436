//! Captured artifacts (page screenshots) attached to notifications.
//!
//! The store is id-addressed: whether an item already has an artifact is an
//! explicit question to the store, not a guess about file layout.

pub mod capture;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::item::ItemId;

pub use capture::{ArtifactCapturer, CaptureSession, CommandCapturer};

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Where the artifact for `id` lives (or will live).
    fn path_for(&self, feed: &str, id: ItemId) -> PathBuf;

    /// Path of an artifact captured in an earlier cycle, if any.
    async fn existing(&self, feed: &str, id: ItemId) -> Option<PathBuf>;

    /// Keep only the `keep` highest ids; returns how many were removed.
    async fn prune(&self, feed: &str, keep: usize) -> usize;
}

/// `{root}/{feed}_artifacts/{id}.png`
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    root: PathBuf,
}

impl FileArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn feed_dir(&self, feed: &str) -> PathBuf {
        self.root
            .join(format!("{}_artifacts", crate::state::file::file_stem(feed)))
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    fn path_for(&self, feed: &str, id: ItemId) -> PathBuf {
        self.feed_dir(feed).join(format!("{id}.png"))
    }

    async fn existing(&self, feed: &str, id: ItemId) -> Option<PathBuf> {
        let p = self.path_for(feed, id);
        match tokio::fs::try_exists(&p).await {
            Ok(true) => Some(p),
            _ => None,
        }
    }

    async fn prune(&self, feed: &str, keep: usize) -> usize {
        let dir = self.feed_dir(feed);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(_) => return 0,
        };

        let mut by_id: Vec<(u64, PathBuf)> = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("png") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                by_id.push((id, path));
            }
        }
        if by_id.len() <= keep {
            return 0;
        }

        by_id.sort_by_key(|(id, _)| *id);
        let excess = by_id.len() - keep;
        let mut removed = 0;
        for (_, path) in by_id.into_iter().take(excess) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    removed += 1;
                    tracing::debug!(feed, path = %path.display(), "pruned old artifact");
                }
                Err(e) => tracing::warn!(feed, path = %path.display(), error = %e, "artifact prune failed"),
            }
        }
        removed
    }
}
