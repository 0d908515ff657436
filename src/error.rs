//! Typed failures for the watcher core and its adapters.
//!
//! Adapters map their own transport errors into these enums so nothing raw
//! crosses into the item loop.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::item::ItemId;

/// Network, timeout or non-2xx failure after retries were exhausted.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("GET {url} failed: {message}")]
    Transport { url: String, message: String },
}

impl FetchError {
    pub fn transport(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            url: url.into(),
            message: err.to_string(),
        }
    }
}

/// Expected structure missing on a listing row. Skips the row, never the page.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("listing row has no id")]
    MissingId,
    #[error("listing row id {0:?} is not numeric")]
    InvalidId(String),
    #[error("listing row {id} has no {field}")]
    MissingField { id: String, field: &'static str },
    #[error("invalid CSS selector {0:?}")]
    Selector(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("state storage unavailable at {}: {source}", path.display())]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("state record at {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook returned HTTP {0}")]
    Status(u16),
    #[error("webhook request failed: {0}")]
    Transport(String),
    #[error("attachment {} unreadable: {source}", path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl NotifyError {
    /// Transport failures, 5xx and 429 may clear up; other statuses will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            NotifyError::Transport(_) => true,
            NotifyError::Status(s) => *s >= 500 || *s == 429,
            NotifyError::Attachment { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture driver unavailable: {0}")]
    Driver(String),
    #[error("capture of {url} failed: {message}")]
    Failed { url: String, message: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Listing page could not be fetched; aborts the cycle.
#[derive(Debug, Error)]
#[error("listing page {page} unavailable: {source}")]
pub struct ListingError {
    pub page: u32,
    #[source]
    pub source: FetchError,
}

/// Why a single item failed inside the processing loop.
#[derive(Debug, Error)]
pub enum ItemFailure {
    #[error("detail fetch failed: {0}")]
    Detail(#[from] FetchError),
    #[error("notify failed: {0}")]
    Notify(#[from] NotifyError),
}

/// A cycle that ended without reaching PERSIST. Previous state stays authoritative.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("feed {feed}: {source}")]
    Listing {
        feed: String,
        #[source]
        source: ListingError,
    },
    #[error("feed {feed}: {source}")]
    Storage {
        feed: String,
        #[source]
        source: StorageError,
    },
    #[error("feed {feed}: item {item_id} aborted the cycle: {reason}")]
    ItemAborted {
        feed: String,
        item_id: ItemId,
        reason: ItemFailure,
    },
}
