//! Infrastructure - configuration, errors and metrics
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults, validation)
//! - `error` - Configuration errors raised before scanning starts
//! - `metrics` - Lock-free metrics collection

pub mod config;
pub mod error;
pub mod metrics;

pub use config::{Config, ScannerSettings};
pub use error::ConfigError;
pub use metrics::{Metrics, MetricsSummary};
