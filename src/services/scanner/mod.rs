//! Scan cycle orchestration
//!
//! The Scanner owns the transport and every per-tag filter. Each cycle it:
//! - applies any pending filter method change
//! - acquires one scan window of raw text from the transport
//! - parses it into distinct (antenna, tag) detections
//! - feeds every tracked tag exactly one observation
//! - compares the settled sets against the previous cycle
//!
//! When a settled set changes the scanner pauses itself and hands a
//! `ScanEvent::Changed` to the consumer, which resumes it via
//! [`ScannerHandle::start`]. A transport failure is terminal.

mod control;
mod cycle;
#[cfg(test)]
mod tests;

pub use control::ScannerHandle;

use crate::domain::event::ScanEvent;
use crate::domain::types::{ScannerState, TagId};
use crate::infra::config::ScannerSettings;
use crate::infra::error::ConfigError;
use crate::infra::metrics::Metrics;
use crate::io::transport::{stopped, Transport};
use crate::services::change_detector::ChangeDetector;
use crate::services::tag_filter::TagFilter;
use control::ScannerControl;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Scan loop state. Moved into its own task by [`Scanner::run`].
pub struct Scanner<T: Transport> {
    pub(crate) settings: ScannerSettings,
    pub(crate) transport: T,
    /// Filters indexed by antenna, keyed by tag
    pub(crate) trackers: Vec<FxHashMap<TagId, TagFilter>>,
    pub(crate) detector: ChangeDetector,
    pub(crate) control: Arc<ScannerControl>,
    pub(crate) stop_rx: watch::Receiver<bool>,
    pub(crate) event_tx: mpsc::Sender<ScanEvent>,
    pub(crate) metrics: Arc<Metrics>,
    /// Completed cycles
    pub(crate) cycle: u64,
}

impl<T: Transport> Scanner<T> {
    /// Build a scanner, its control handle and the event stream
    ///
    /// Fails fast on invalid settings so nothing is spawned with a bad
    /// antenna count or window.
    pub fn new(
        settings: ScannerSettings,
        transport: T,
        metrics: Arc<Metrics>,
    ) -> Result<(Self, ScannerHandle, mpsc::Receiver<ScanEvent>), ConfigError> {
        settings.validate()?;

        let (control, stop_rx) = ScannerControl::new(settings.initial_filter_method, metrics.clone());
        let control = Arc::new(control);
        let (event_tx, event_rx) = mpsc::channel(settings.event_buffer);

        info!(
            transport = %transport.describe(),
            antennas = %settings.antenna_count,
            scan_duration_ms = %settings.scan_duration.as_millis(),
            window_size = %settings.window_size,
            filter_method = %settings.initial_filter_method,
            "scanner_initialized"
        );

        let scanner = Self {
            trackers: vec![FxHashMap::default(); settings.antenna_count],
            detector: ChangeDetector::new(settings.antenna_count),
            settings,
            transport,
            control: control.clone(),
            stop_rx,
            event_tx,
            metrics,
            cycle: 0,
        };
        Ok((scanner, ScannerHandle { control }, event_rx))
    }

    pub fn handle(&self) -> ScannerHandle {
        ScannerHandle { control: self.control.clone() }
    }

    /// Number of (antenna, tag) filters currently held
    pub fn tracked_tags(&self) -> usize {
        self.trackers.iter().map(FxHashMap::len).sum()
    }

    /// Drive cycles until stopped, the transport fails, or the consumer
    /// goes away
    pub async fn run(mut self) {
        info!(transport = %self.transport.describe(), "scanner_started");

        loop {
            match self.control.state() {
                ScannerState::Stopped => break,
                ScannerState::Paused => {
                    self.wait_for_resume().await;
                    continue;
                }
                ScannerState::Running => {}
            }

            match self.run_cycle().await {
                Ok(None) => {}
                Ok(Some(event)) => {
                    // Pause before handing over so a prompt start() is never lost
                    match self.control.transition(ScannerState::Running, ScannerState::Paused) {
                        Ok(()) | Err(ScannerState::Paused) => {}
                        Err(_) => break,
                    }
                    self.metrics.record_change();
                    info!(
                        cycle = %event.cycle,
                        id = %event.id,
                        antennas = %event.antennas.len(),
                        filter_method = %event.filter_method,
                        "scan_change_detected"
                    );
                    tokio::select! {
                        sent = self.event_tx.send(ScanEvent::Changed(event)) => {
                            if sent.is_err() {
                                warn!("scan_event_receiver_dropped");
                                self.control.stop();
                                break;
                            }
                        }
                        _ = stopped(&mut self.stop_rx) => {
                            info!(cycle = %self.cycle, "scan_event_dropped_on_stop");
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!(
                        transport = %self.transport.describe(),
                        cycle = %self.cycle,
                        error = %e,
                        "transport_failed"
                    );
                    self.metrics.record_transport_failure();
                    let failure = ScanEvent::TransportFailed { error: e.to_string() };
                    tokio::select! {
                        _ = self.event_tx.send(failure) => {}
                        _ = stopped(&mut self.stop_rx) => {}
                    }
                    self.control.stop();
                    break;
                }
            }
        }

        info!(cycles = %self.cycle, tracked = %self.tracked_tags(), "scanner_stopped");
    }

    async fn wait_for_resume(&mut self) {
        tokio::select! {
            _ = self.control.resume.notified() => {}
            _ = stopped(&mut self.stop_rx) => {}
        }
    }
}
