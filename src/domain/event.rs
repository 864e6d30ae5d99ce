//! Change events produced by the scan loop

use crate::domain::types::{AntennaId, FilterMethod, TagId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Settled membership of one antenna after a change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AntennaChange {
    /// Tags currently classified as present
    pub tags: BTreeSet<TagId>,
    pub count: usize,
    /// Present now, absent in the previous snapshot
    pub added: BTreeSet<TagId>,
    /// Present in the previous snapshot, absent now
    pub removed: BTreeSet<TagId>,
}

impl AntennaChange {
    /// Diff two settled sets. Returns `None` when they are equal.
    pub fn between(previous: &BTreeSet<TagId>, current: &BTreeSet<TagId>) -> Option<Self> {
        if previous == current {
            return None;
        }
        Some(Self {
            tags: current.clone(),
            count: current.len(),
            added: current.difference(previous).cloned().collect(),
            removed: previous.difference(current).cloned().collect(),
        })
    }
}

/// Per-antenna presence change for one scan cycle
///
/// Only antennas whose settled set differs from the previous cycle appear
/// in `antennas`.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub id: Uuid,
    pub cycle: u64,
    pub ts: DateTime<Utc>,
    pub filter_method: FilterMethod,
    pub antennas: BTreeMap<AntennaId, AntennaChange>,
}

impl ChangeEvent {
    pub fn new(
        cycle: u64,
        filter_method: FilterMethod,
        antennas: BTreeMap<AntennaId, AntennaChange>,
    ) -> Self {
        Self { id: Uuid::now_v7(), cycle, ts: Utc::now(), filter_method, antennas }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Settled tag count per changed antenna
    pub fn counts(&self) -> BTreeMap<AntennaId, usize> {
        self.antennas.iter().map(|(antenna, change)| (*antenna, change.count)).collect()
    }
}

/// What the scanner delivers to its consumer
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// Settled membership changed on at least one antenna; the scanner is now paused
    Changed(ChangeEvent),
    /// The transport failed; the scanner has stopped
    TransportFailed { error: String },
}
