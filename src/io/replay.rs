//! Replay transport - serves recorded scan windows instead of a live reader
//!
//! Capture files hold the raw text of consecutive scan windows, separated by
//! lines consisting of `---`:
//!
//! ```text
//! E2806995,1,<5D36>
//! E2806996,2,<1A2B>
//! ---
//! E2806995,1,<5D36>
//! ```
//!
//! Once the script is exhausted the transport idles for each scan window
//! and returns empty buffers, so trackers keep decaying.

use crate::io::transport::{stopped, Transport, TransportError};
use anyhow::Context;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

const CYCLE_SEPARATOR: &str = "---";

#[derive(Debug)]
enum Step {
    Buffer(String),
    Failure(String),
}

pub struct ReplayTransport {
    name: String,
    steps: VecDeque<Step>,
    /// Hold each recorded window for the full scan duration
    paced: bool,
}

impl ReplayTransport {
    pub fn new<I, S>(buffers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: "script".to_string(),
            steps: buffers.into_iter().map(|b| Step::Buffer(b.into())).collect(),
            paced: false,
        }
    }

    /// Load a capture file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read capture file {}", path.display()))?;
        let mut transport = Self::new(split_cycles(&content));
        transport.name = path.display().to_string();
        info!(file = %transport.name, cycles = %transport.steps.len(), "replay_capture_loaded");
        Ok(transport)
    }

    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    /// Queue another recorded window
    pub fn push_buffer(&mut self, buffer: impl Into<String>) {
        self.steps.push_back(Step::Buffer(buffer.into()));
    }

    /// Queue a transport failure (e.g. reader unplugged)
    pub fn push_failure(&mut self, message: impl Into<String>) {
        self.steps.push_back(Step::Failure(message.into()));
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }

    /// Sleep for the window unless stopped first
    async fn hold(scan_duration: Duration, stop: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = stopped(stop) => {}
            _ = tokio::time::sleep(scan_duration) => {}
        }
    }
}

/// Split capture text into per-window buffers
pub fn split_cycles(content: &str) -> Vec<String> {
    let mut cycles = Vec::new();
    let mut current = String::new();
    for line in content.lines() {
        if line.trim() == CYCLE_SEPARATOR {
            cycles.push(std::mem::take(&mut current));
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    if !current.is_empty() {
        cycles.push(current);
    }
    cycles
}

#[async_trait]
impl Transport for ReplayTransport {
    async fn acquire_buffer(
        &mut self,
        scan_duration: Duration,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<String, TransportError> {
        if *stop.borrow() {
            return Ok(String::new());
        }

        match self.steps.pop_front() {
            Some(Step::Buffer(buffer)) => {
                if self.paced {
                    Self::hold(scan_duration, stop).await;
                }
                Ok(buffer)
            }
            Some(Step::Failure(message)) => Err(TransportError::Other(message)),
            None => {
                debug!(source = %self.name, "replay_exhausted_idle_window");
                Self::hold(scan_duration, stop).await;
                Ok(String::new())
            }
        }
    }

    fn describe(&self) -> String {
        format!("replay:{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_split_cycles() {
        let cycles = split_cycles("A,1,<0000>\n---\nB,2,<0000>\nC,1,<0000>\n---\n---\n");
        assert_eq!(cycles, vec!["A,1,<0000>\n", "B,2,<0000>\nC,1,<0000>\n", ""]);
    }

    #[tokio::test]
    async fn test_serves_buffers_in_order() {
        let mut transport = ReplayTransport::new(["one", "two"]);
        let (_tx, mut rx) = watch::channel(false);
        let d = Duration::from_millis(5);
        assert_eq!(transport.acquire_buffer(d, &mut rx).await.unwrap(), "one");
        assert_eq!(transport.acquire_buffer(d, &mut rx).await.unwrap(), "two");
        assert_eq!(transport.acquire_buffer(d, &mut rx).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_pushed_buffers_follow_script() {
        let mut transport = ReplayTransport::new(["one"]);
        transport.push_buffer("two");
        assert_eq!(transport.remaining(), 2);

        let (_tx, mut rx) = watch::channel(false);
        let d = Duration::from_millis(5);
        assert_eq!(transport.acquire_buffer(d, &mut rx).await.unwrap(), "one");
        assert_eq!(transport.acquire_buffer(d, &mut rx).await.unwrap(), "two");
        assert_eq!(transport.remaining(), 0);
    }

    #[tokio::test]
    async fn test_failure_step() {
        let mut transport = ReplayTransport::new(Vec::<String>::new());
        transport.push_failure("unplugged");
        let (_tx, mut rx) = watch::channel(false);
        let err = transport.acquire_buffer(Duration::from_millis(5), &mut rx).await.unwrap_err();
        assert_eq!(err.to_string(), "unplugged");
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_window_interrupted_by_stop() {
        let mut transport = ReplayTransport::new(Vec::<String>::new());
        let (tx, mut rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            transport.acquire_buffer(Duration::from_secs(3600), &mut rx).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert_eq!(result.unwrap().unwrap().unwrap(), "");
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"A,1,<0000>\n---\nB,2,<0000>\n").unwrap();
        file.flush().unwrap();

        let transport = ReplayTransport::from_file(file.path()).unwrap();
        assert_eq!(transport.remaining(), 2);
        assert!(transport.describe().starts_with("replay:"));
    }
}
