// src/gate.rs
//! Dedup & notification gate.
//!
//! Decides which scanned items get delivered and tracks what the next PERSIST
//! has to write. Two strategies:
//! - watermark: deliver everything the scanner accepted above the last seen id;
//!   the watermark moves to the highest processed id.
//! - notified set: deliver ids not yet in the set; delivered ids join the set.
//!
//! The gate only mutates in memory. Nothing here touches storage.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ingest::scanner::{DateWindow, ScanBound};
use crate::item::{ItemDescriptor, ItemId};

/// Ids already pushed to the chat. Grows monotonically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifiedIdSet {
    #[serde(rename = "notified_ids")]
    ids: BTreeSet<ItemId>,
}

impl NotifiedIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.ids.contains(&id)
    }

    /// Returns `true` if the id was not present before.
    pub fn insert(&mut self, id: ItemId) -> bool {
        self.ids.insert(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.ids.iter().copied()
    }
}

impl FromIterator<ItemId> for NotifiedIdSet {
    fn from_iter<I: IntoIterator<Item = ItemId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Items whose id is absent from `notified`, order preserved.
pub fn delivery_set(scanned: Vec<ItemDescriptor>, notified: &NotifiedIdSet) -> Vec<ItemDescriptor> {
    scanned
        .into_iter()
        .filter(|it| !notified.contains(it.id))
        .collect()
}

/// Highest of the current watermark and the processed ids. Never moves backwards.
pub fn advance_watermark(current: Option<ItemId>, processed: &[ItemId]) -> Option<ItemId> {
    processed.iter().copied().chain(current).max()
}

/// State the gate hands to PERSIST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Watermark(Option<ItemId>),
    Notified(NotifiedIdSet),
}

#[derive(Debug, Clone)]
pub struct DeliveryGate {
    state: GateState,
    changed: bool,
}

impl DeliveryGate {
    pub fn watermark(last_seen: Option<ItemId>) -> Self {
        Self {
            state: GateState::Watermark(last_seen),
            changed: false,
        }
    }

    pub fn notified(set: NotifiedIdSet) -> Self {
        Self {
            state: GateState::Notified(set),
            changed: false,
        }
    }

    /// Scanner bound matching this strategy. Notified-set feeds read the whole
    /// listing, or the date window when one is configured.
    pub fn scan_bound(&self, window: Option<DateWindow>) -> ScanBound {
        match (&self.state, window) {
            (GateState::Watermark(w), _) => ScanBound::Watermark(*w),
            (GateState::Notified(_), Some(win)) => ScanBound::DateWindow(win),
            (GateState::Notified(_), None) => ScanBound::FullListing,
        }
    }

    pub fn admit(&self, scanned: Vec<ItemDescriptor>) -> Vec<ItemDescriptor> {
        match &self.state {
            GateState::Watermark(None) => scanned,
            GateState::Watermark(Some(w)) => scanned.into_iter().filter(|it| it.id > *w).collect(),
            GateState::Notified(set) => delivery_set(scanned, set),
        }
    }

    /// Item went through detail fetch and a notify attempt.
    pub fn mark_processed(&mut self, id: ItemId) {
        match &mut self.state {
            GateState::Watermark(w) => {
                let next = advance_watermark(*w, &[id]);
                if next != *w {
                    *w = next;
                    self.changed = true;
                }
            }
            GateState::Notified(set) => {
                if set.insert(id) {
                    self.changed = true;
                }
            }
        }
    }

    /// Item was skipped under the `skip` policy before anything was sent.
    ///
    /// The watermark still passes it (the cutoff is positional); the notified
    /// set does not, so the item is offered again next cycle.
    pub fn mark_skipped(&mut self, id: ItemId) {
        if matches!(self.state, GateState::Watermark(_)) {
            self.mark_processed(id);
        }
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn into_state(self) -> GateState {
        self.state
    }
}
