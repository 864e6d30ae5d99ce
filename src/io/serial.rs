//! Serial transport for the RFID reader
//!
//! The reader streams detection records over a UART:
//! - Baud: 115200, 8N1
//! - One text record per line, `<tag_id>,<antenna>,<XXXX>`
//!
//! Bytes are accumulated for one scan window and decoded as lossy UTF-8.
//! The port stays open between windows; input that piled up while the
//! scanner was paused is discarded before the next window starts.

use crate::infra::config::Config;
use crate::io::transport::{stopped, Transport, TransportError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, trace, warn};

const READ_CHUNK_LEN: usize = 1024;
/// Port-level read timeout; the scan window is enforced separately
const PORT_TIMEOUT: Duration = Duration::from_millis(100);

pub struct SerialTransport {
    device: String,
    baud: u32,
    port: Option<SerialStream>,
    last_window_end: Option<Instant>,
}

impl SerialTransport {
    pub fn new(config: &Config) -> Self {
        Self::with_device(config.serial_device(), config.serial_baud())
    }

    pub fn with_device(device: &str, baud: u32) -> Self {
        Self { device: device.to_string(), baud, port: None, last_window_end: None }
    }

    fn ensure_open(&mut self) -> Result<&mut SerialStream, TransportError> {
        if self.port.is_none() {
            let port = tokio_serial::new(&self.device, self.baud)
                .timeout(PORT_TIMEOUT)
                .open_native_async()
                .map_err(|source| TransportError::Open { device: self.device.clone(), source })?;
            info!(device = %self.device, baud = %self.baud, "serial_port_opened");
            self.port = Some(port);
        }
        self.port.as_mut().ok_or_else(|| TransportError::Disconnected(self.device.clone()))
    }

    /// Discard input buffered since the previous window if it is stale
    fn discard_stale_input(&mut self, scan_duration: Duration) {
        let stale = self.last_window_end.is_some_and(|end| end.elapsed() > scan_duration);
        if !stale {
            return;
        }
        if let Some(port) = self.port.as_mut() {
            match port.clear(ClearBuffer::Input) {
                Ok(()) => debug!(device = %self.device, "serial_stale_input_cleared"),
                Err(e) => warn!(device = %self.device, error = %e, "serial_clear_failed"),
            }
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn acquire_buffer(
        &mut self,
        scan_duration: Duration,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<String, TransportError> {
        self.ensure_open()?;
        self.discard_stale_input(scan_duration);

        let device = self.device.clone();
        let deadline = Instant::now() + scan_duration;
        let mut collected = Vec::with_capacity(4096);
        let mut chunk = [0u8; READ_CHUNK_LEN];
        let mut failure = None;

        let port = self.ensure_open()?;
        loop {
            tokio::select! {
                _ = stopped(stop) => {
                    debug!(device = %device, bytes = %collected.len(), "serial_window_interrupted");
                    break;
                }
                _ = tokio::time::sleep_until(deadline) => break,
                result = port.read(&mut chunk) => match result {
                    Ok(0) => {
                        failure = Some(TransportError::Disconnected(device.clone()));
                        break;
                    }
                    Ok(n) => collected.extend_from_slice(&chunk[..n]),
                    Err(e) if e.kind() == ErrorKind::TimedOut => {}
                    Err(source) => {
                        failure = Some(TransportError::Read { device: device.clone(), source });
                        break;
                    }
                },
            }
        }

        self.last_window_end = Some(Instant::now());

        if let Some(err) = failure {
            // Reopened on the next call if the caller decides to retry
            self.port = None;
            return Err(err);
        }

        trace!(device = %device, bytes = %collected.len(), "serial_window_complete");
        Ok(String::from_utf8_lossy(&collected).into_owned())
    }

    fn describe(&self) -> String {
        format!("serial:{}@{}", self.device, self.baud)
    }
}
