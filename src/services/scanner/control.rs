//! Cross-thread control surface for the scan loop
//!
//! The run state is a single atomic byte; the stop flag is mirrored into a
//! watch channel so a blocked transport wait can observe it. Every call is
//! safe from any thread at any time, and becomes a no-op once stopped.

use crate::domain::types::{FilterMethod, ScannerState};
use crate::infra::metrics::Metrics;
use crate::services::filter_registry::FilterRegistry;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tracing::info;

pub(crate) struct ScannerControl {
    state: AtomicU8,
    pub(crate) registry: FilterRegistry,
    stop_tx: watch::Sender<bool>,
    pub(crate) resume: Notify,
    metrics: Arc<Metrics>,
}

impl ScannerControl {
    pub(crate) fn new(
        initial: FilterMethod,
        metrics: Arc<Metrics>,
    ) -> (Self, watch::Receiver<bool>) {
        let (stop_tx, stop_rx) = watch::channel(false);
        metrics.set_scanner_state(ScannerState::Running);
        metrics.set_filter_method(initial);
        let control = Self {
            state: AtomicU8::new(ScannerState::Running as u8),
            registry: FilterRegistry::new(initial),
            stop_tx,
            resume: Notify::new(),
            metrics,
        };
        (control, stop_rx)
    }

    #[inline]
    pub(crate) fn state(&self) -> ScannerState {
        ScannerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Atomically move `from -> to`; returns the observed state on failure
    pub(crate) fn transition(&self, from: ScannerState, to: ScannerState) -> Result<(), ScannerState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| self.metrics.set_scanner_state(to))
            .map_err(ScannerState::from_u8)
    }

    pub(crate) fn stop(&self) -> bool {
        let previous = ScannerState::from_u8(
            self.state.swap(ScannerState::Stopped as u8, Ordering::AcqRel),
        );
        self.stop_tx.send_replace(true);
        self.resume.notify_one();
        self.metrics.set_scanner_state(ScannerState::Stopped);
        previous != ScannerState::Stopped
    }
}

/// Cloneable handle used by consumers to steer a running scanner
#[derive(Clone)]
pub struct ScannerHandle {
    pub(crate) control: Arc<ScannerControl>,
}

impl ScannerHandle {
    /// Running -> Paused. Takes effect before the next buffer acquisition.
    pub fn pause(&self) -> bool {
        let paused = self.control.transition(ScannerState::Running, ScannerState::Paused).is_ok();
        if paused {
            info!("scanner_pause_requested");
        }
        paused
    }

    /// Paused -> Running
    pub fn start(&self) -> bool {
        let resumed = self.control.transition(ScannerState::Paused, ScannerState::Running).is_ok();
        if resumed {
            self.control.resume.notify_one();
            info!("scanner_resumed");
        }
        resumed
    }

    /// Any state -> Stopped (terminal)
    pub fn stop(&self) -> bool {
        let stopped = self.control.stop();
        if stopped {
            info!("scanner_stop_requested");
        }
        stopped
    }

    /// Request a filter method; applied at the next cycle boundary
    pub fn set_filter_method(&self, method: FilterMethod) -> bool {
        if self.control.state() == ScannerState::Stopped {
            return false;
        }
        self.control.registry.request(method);
        info!(method = %method, "filter_method_requested");
        true
    }

    pub fn state(&self) -> ScannerState {
        self.control.state()
    }

    /// Method used by the most recent cycle
    pub fn filter_method(&self) -> FilterMethod {
        self.control.registry.current()
    }

    /// Method the next cycle will use
    pub fn requested_filter_method(&self) -> FilterMethod {
        self.control.registry.requested()
    }
}

impl std::fmt::Debug for ScannerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerHandle")
            .field("state", &self.state())
            .field("filter_method", &self.filter_method())
            .finish()
    }
}
