//! One read-parse-update-compare iteration

use super::Scanner;
use crate::domain::event::ChangeEvent;
use crate::domain::types::{AntennaId, ScannerState, TagId};
use crate::io::transport::{Transport, TransportError};
use crate::services::filter_registry::FilterTransition;
use crate::services::parser::parse_buffer;
use crate::services::tag_filter::TagFilter;
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, info, trace};

impl<T: Transport> Scanner<T> {
    /// Run a single scan cycle
    ///
    /// Returns the change event for this cycle, or `None` when no antenna's
    /// settled set changed or the scanner was stopped mid-acquisition.
    pub async fn run_cycle(&mut self) -> Result<Option<ChangeEvent>, TransportError> {
        let transition = self.control.registry.rotate();
        if transition.changed() {
            info!(
                from = %transition.previous,
                to = %transition.current,
                cycle = %self.cycle,
                "filter_method_rotated"
            );
            self.metrics.record_filter_switch();
            self.metrics.set_filter_method(transition.current);
        }

        let buffer = self
            .transport
            .acquire_buffer(self.settings.scan_duration, &mut self.stop_rx)
            .await?;

        if self.control.state() == ScannerState::Stopped {
            debug!(cycle = %self.cycle, bytes = %buffer.len(), "scan_cycle_abandoned");
            return Ok(None);
        }

        let process_start = Instant::now();
        let detections = parse_buffer(&buffer, self.settings.antenna_count);
        let records = detections.len();

        let mut heard: Vec<FxHashSet<TagId>> =
            vec![FxHashSet::default(); self.settings.antenna_count];
        for detection in detections {
            heard[detection.antenna.index()].insert(detection.tag);
        }

        self.observe(&heard, transition);
        let settled = self.settled_sets();
        let present: usize = settled.iter().map(BTreeSet::len).sum();
        let changes = self.detector.compare(settled);

        let process_us = process_start.elapsed().as_micros() as u64;
        self.metrics.record_cycle(buffer.len(), records, process_us);
        self.metrics.set_tag_counts(self.tracked_tags(), present);
        self.cycle += 1;

        debug!(
            cycle = %self.cycle,
            bytes = %buffer.len(),
            records = %records,
            tracked = %self.tracked_tags(),
            present = %present,
            changed_antennas = %changes.len(),
            process_us = %process_us,
            "scan_cycle_complete"
        );

        if changes.is_empty() {
            return Ok(None);
        }
        Ok(Some(ChangeEvent::new(self.cycle, transition.current, changes)))
    }

    /// Feed every tracked tag one observation for this cycle
    ///
    /// Newly heard pairs get a filter first, so each filter is updated
    /// exactly once whether or not it was heard.
    fn observe(&mut self, heard: &[FxHashSet<TagId>], transition: FilterTransition) {
        let window_size = self.settings.window_size;

        for (antenna, (filters, tags)) in self.trackers.iter_mut().zip(heard).enumerate() {
            for tag in tags {
                if !filters.contains_key(tag) {
                    trace!(antenna = %antenna, tag = %tag, "tag_first_seen");
                    filters.insert(tag.clone(), TagFilter::new(window_size));
                }
            }

            for (tag, filter) in filters.iter_mut() {
                let update = filter.update(tags.contains(tag), transition);
                if update.flipped() {
                    trace!(
                        antenna = %antenna,
                        tag = %tag,
                        present = %update.presence,
                        "tag_presence_flipped"
                    );
                }
            }
        }
    }

    /// Tags whose filtered decision is present, per antenna
    fn settled_sets(&self) -> Vec<BTreeSet<TagId>> {
        self.trackers
            .iter()
            .map(|filters| {
                filters
                    .iter()
                    .filter(|(_, filter)| filter.presence())
                    .map(|(tag, _)| tag.clone())
                    .collect()
            })
            .collect()
    }

    /// Filter state for one (antenna, tag) pair
    pub fn filter(&self, antenna: AntennaId, tag: &TagId) -> Option<&TagFilter> {
        self.trackers.get(antenna.index())?.get(tag)
    }
}
