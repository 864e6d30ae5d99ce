//! Per-antenna settled-set change detection
//!
//! Holds the previous cycle's settled set for every antenna and reports
//! only the antennas whose membership differs from it.

use crate::domain::event::AntennaChange;
use crate::domain::types::{AntennaId, TagId};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub struct ChangeDetector {
    settled: Vec<BTreeSet<TagId>>,
}

impl ChangeDetector {
    pub fn new(antenna_count: usize) -> Self {
        Self { settled: vec![BTreeSet::new(); antenna_count] }
    }

    /// Compare this cycle's settled sets against the stored snapshot and
    /// replace the snapshot. `current` is indexed by antenna.
    pub fn compare(&mut self, current: Vec<BTreeSet<TagId>>) -> BTreeMap<AntennaId, AntennaChange> {
        let mut changes = BTreeMap::new();

        for (index, (previous, now)) in self.settled.iter().zip(current.iter()).enumerate() {
            if let Some(change) = AntennaChange::between(previous, now) {
                debug!(
                    antenna = %index,
                    count = %change.count,
                    added = %change.added.len(),
                    removed = %change.removed.len(),
                    "antenna_settled_set_changed"
                );
                changes.insert(AntennaId(index), change);
            }
        }

        self.settled = current;
        changes
    }

    /// Settled set from the last comparison
    pub fn settled(&self, antenna: AntennaId) -> Option<&BTreeSet<TagId>> {
        self.settled.get(antenna.index())
    }

    pub fn present_total(&self) -> usize {
        self.settled.iter().map(BTreeSet::len).sum()
    }
}
