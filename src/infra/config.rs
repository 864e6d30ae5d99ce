//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::types::{FilterMethod, MAX_ANTENNAS};
use crate::infra::error::ConfigError;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerSection {
    #[serde(default = "default_antenna_count")]
    pub antenna_count: usize,
    #[serde(default = "default_scan_duration_ms")]
    pub scan_duration_ms: u64,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// One of none, window_lpf, hmm_viterbi
    #[serde(default = "default_filter_method")]
    pub filter_method: String,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Resume scanning as soon as a change event has been persisted
    #[serde(default = "default_auto_resume")]
    pub auto_resume: bool,
}

impl Default for ScannerSection {
    fn default() -> Self {
        Self {
            antenna_count: default_antenna_count(),
            scan_duration_ms: default_scan_duration_ms(),
            window_size: default_window_size(),
            filter_method: default_filter_method(),
            event_buffer: default_event_buffer(),
            auto_resume: default_auto_resume(),
        }
    }
}

fn default_antenna_count() -> usize {
    4
}

fn default_scan_duration_ms() -> u64 {
    3000
}

fn default_window_size() -> usize {
    3
}

fn default_filter_method() -> String {
    FilterMethod::WindowLpf.as_str().to_string()
}

fn default_event_buffer() -> usize {
    16
}

fn default_auto_resume() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct SerialSection {
    #[serde(default = "default_serial_device")]
    pub device: String,
    #[serde(default = "default_serial_baud")]
    pub baud: u32,
}

impl Default for SerialSection {
    fn default() -> Self {
        Self { device: default_serial_device(), baud: default_serial_baud() }
    }
}

fn default_serial_device() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_serial_baud() -> u32 {
    115200
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressSection {
    /// File path for change events (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressSection {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "changes.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSection {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Metrics and control HTTP port (0 to disable)
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval(), http_port: default_http_port() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

fn default_http_port() -> u16 {
    9090
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteSection {
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "shelf".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteSection,
    #[serde(default)]
    pub scanner: ScannerSection,
    #[serde(default)]
    pub serial: SerialSection,
    #[serde(default)]
    pub egress: EgressSection,
    #[serde(default)]
    pub metrics: MetricsSection,
}

/// Validated settings consumed by the scan loop
#[derive(Debug, Clone, PartialEq)]
pub struct ScannerSettings {
    pub antenna_count: usize,
    pub scan_duration: Duration,
    pub window_size: usize,
    pub initial_filter_method: FilterMethod,
    pub event_buffer: usize,
}

impl ScannerSettings {
    pub fn new(
        antenna_count: usize,
        scan_duration: Duration,
        window_size: usize,
        initial_filter_method: FilterMethod,
    ) -> Result<Self, ConfigError> {
        let settings = Self {
            antenna_count,
            scan_duration,
            window_size,
            initial_filter_method,
            event_buffer: default_event_buffer(),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.antenna_count == 0 {
            return Err(ConfigError::NoAntennas);
        }
        if self.antenna_count > MAX_ANTENNAS {
            return Err(ConfigError::TooManyAntennas(self.antenna_count));
        }
        if self.window_size == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        if self.scan_duration.is_zero() {
            return Err(ConfigError::ZeroScanDuration);
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::ZeroEventBuffer);
        }
        Ok(())
    }
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    antenna_count: usize,
    scan_duration_ms: u64,
    window_size: usize,
    filter_method: String,
    event_buffer: usize,
    auto_resume: bool,
    serial_device: String,
    serial_baud: u32,
    egress_file: String,
    metrics_interval_secs: u64,
    http_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            site_id: toml_config.site.id,
            antenna_count: toml_config.scanner.antenna_count,
            scan_duration_ms: toml_config.scanner.scan_duration_ms,
            window_size: toml_config.scanner.window_size,
            filter_method: toml_config.scanner.filter_method,
            event_buffer: toml_config.scanner.event_buffer,
            auto_resume: toml_config.scanner.auto_resume,
            serial_device: toml_config.serial.device,
            serial_baud: toml_config.serial.baud,
            egress_file: toml_config.egress.file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            http_port: toml_config.metrics.http_port,
            config_file,
        }
    }

    /// Determine config file path from an explicit argument or environment
    pub fn resolve_config_path(explicit: Option<&str>) -> String {
        if let Some(path) = explicit {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str, config_file: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content)
            .with_context(|| format!("Failed to parse config file {}", config_file))?;
        Ok(Self::from_toml(toml_config, config_file.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Load configuration from a TOML file, falling back to defaults only
    /// when the file does not exist
    ///
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_from_path(path: &str) -> anyhow::Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content, path),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %path, "config_file_missing_using_defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read config file {}", path)),
        }
    }

    /// Build validated scan loop settings
    pub fn scanner_settings(&self) -> Result<ScannerSettings, ConfigError> {
        let method = self.filter_method.parse::<FilterMethod>()?;
        let settings = ScannerSettings {
            antenna_count: self.antenna_count,
            scan_duration: Duration::from_millis(self.scan_duration_ms),
            window_size: self.window_size,
            initial_filter_method: method,
            event_buffer: self.event_buffer,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn antenna_count(&self) -> usize {
        self.antenna_count
    }

    pub fn scan_duration_ms(&self) -> u64 {
        self.scan_duration_ms
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn filter_method(&self) -> &str {
        &self.filter_method
    }

    pub fn auto_resume(&self) -> bool {
        self.auto_resume
    }

    pub fn serial_device(&self) -> &str {
        &self.serial_device
    }

    pub fn serial_baud(&self) -> u32 {
        self.serial_baud
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the antenna count
    #[cfg(test)]
    pub fn with_antenna_count(mut self, antenna_count: usize) -> Self {
        self.antenna_count = antenna_count;
        self
    }

    /// Builder method for tests to set the filter method name
    #[cfg(test)]
    pub fn with_filter_method(mut self, method: &str) -> Self {
        self.filter_method = method.to_string();
        self
    }
}
