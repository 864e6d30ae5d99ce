//! Reader transport interface
//!
//! A transport hands the scan loop everything the reader printed during one
//! scan window, decoded permissively as text.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open {device}: {source}")]
    Open {
        device: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("read from {device} failed: {source}")]
    Read {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} disconnected")]
    Disconnected(String),

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait Transport: Send {
    /// Collect bytes for up to `scan_duration` and return them as text
    ///
    /// Must return early (with whatever was collected) once `stop` reads `true`.
    async fn acquire_buffer(
        &mut self,
        scan_duration: Duration,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<String, TransportError>;

    /// Human-readable source name for logs
    fn describe(&self) -> String;
}

/// Wait until the stop flag reads `true`. Never resolves if the sender is
/// dropped without stopping.
pub async fn stopped(stop: &mut watch::Receiver<bool>) {
    let outcome = stop.wait_for(|stopped| *stopped).await.map(|_| ());
    if outcome.is_err() {
        std::future::pending::<()>().await;
    }
}
