// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod artifact;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod ingest;
pub mod item;
pub mod notify;
pub mod state;
pub mod telemetry;

// In-memory fakes for tests and the demo binary
pub mod testing;

// ---- Re-exports for stable public API ----
pub use crate::engine::{CycleReport, FeedRunner};
pub use crate::error::CycleError;
pub use crate::gate::{DeliveryGate, NotifiedIdSet};
pub use crate::item::{ItemDescriptor, ItemId, ListingRow};
pub use crate::notify::{Notification, Notifier};
