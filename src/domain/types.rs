//! Shared types for the shelf scanner

use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest antenna digit the reader's record format can carry (`1..=8`)
pub const MAX_ANTENNAS: usize = 8;

/// Newtype wrapper for 0-based antenna indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AntennaId(pub usize);

impl AntennaId {
    /// Convert the reader's 1-based antenna digit to an internal index
    #[inline]
    pub fn from_wire(digit: u8) -> Option<Self> {
        match digit {
            1..=8 => Some(Self(usize::from(digit - 1))),
            _ => None,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for AntennaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reader-assigned tag identifier (hexadecimal EPC, kept opaque)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(String);

impl TagId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TagId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One parsed detection: a tag heard on an antenna during a scan cycle
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Detection {
    pub antenna: AntennaId,
    pub tag: TagId,
}

impl Detection {
    pub fn new(antenna: usize, tag: impl Into<String>) -> Self {
        Self { antenna: AntennaId(antenna), tag: TagId::new(tag) }
    }
}

/// Strategy used to turn raw per-cycle detections into a presence decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FilterMethod {
    /// Presence equals this cycle's detection
    #[serde(rename = "none")]
    NoFiltering = 0,
    /// Majority vote over the last `window_size` cycles
    WindowLpf = 1,
    /// Two-state HMM decoded online with the Viterbi recursion
    HmmViterbi = 2,
}

impl FilterMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterMethod::NoFiltering => "none",
            FilterMethod::WindowLpf => "window_lpf",
            FilterMethod::HmmViterbi => "hmm_viterbi",
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(FilterMethod::NoFiltering),
            1 => Some(FilterMethod::WindowLpf),
            2 => Some(FilterMethod::HmmViterbi),
            _ => None,
        }
    }
}

impl fmt::Display for FilterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a filter method name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown filter method '{0}' (expected none, window_lpf or hmm_viterbi)")]
pub struct UnknownFilterMethod(pub String);

impl std::str::FromStr for FilterMethod {
    type Err = UnknownFilterMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "no_filtering" | "raw" => Ok(FilterMethod::NoFiltering),
            "window_lpf" | "window" | "lpf" => Ok(FilterMethod::WindowLpf),
            "hmm_viterbi" | "hmm" | "viterbi" => Ok(FilterMethod::HmmViterbi),
            other => Err(UnknownFilterMethod(other.to_string())),
        }
    }
}

/// Run state of the scan loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ScannerState {
    Running = 0,
    Paused = 1,
    /// Terminal
    Stopped = 2,
}

impl ScannerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScannerState::Running => "running",
            ScannerState::Paused => "paused",
            ScannerState::Stopped => "stopped",
        }
    }

    #[inline]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ScannerState::Running,
            1 => ScannerState::Paused,
            _ => ScannerState::Stopped,
        }
    }
}

impl fmt::Display for ScannerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_antenna_from_wire() {
        assert_eq!(AntennaId::from_wire(1), Some(AntennaId(0)));
        assert_eq!(AntennaId::from_wire(8), Some(AntennaId(7)));
        assert_eq!(AntennaId::from_wire(0), None);
        assert_eq!(AntennaId::from_wire(9), None);
    }

    #[test]
    fn test_filter_method_from_str() {
        assert_eq!("none".parse::<FilterMethod>().unwrap(), FilterMethod::NoFiltering);
        assert_eq!("WINDOW_LPF".parse::<FilterMethod>().unwrap(), FilterMethod::WindowLpf);
        assert_eq!("hmm".parse::<FilterMethod>().unwrap(), FilterMethod::HmmViterbi);
        assert!("kalman".parse::<FilterMethod>().is_err());
    }

    #[test]
    fn test_filter_method_u8_round_trip() {
        for method in [FilterMethod::NoFiltering, FilterMethod::WindowLpf, FilterMethod::HmmViterbi]
        {
            assert_eq!(FilterMethod::from_u8(method.as_u8()), Some(method));
        }
        assert_eq!(FilterMethod::from_u8(7), None);
    }

    #[test]
    fn test_filter_method_serde_names() {
        let json = serde_json::to_string(&FilterMethod::NoFiltering).unwrap();
        assert_eq!(json, "\"none\"");
        let method: FilterMethod = serde_json::from_str("\"hmm_viterbi\"").unwrap();
        assert_eq!(method, FilterMethod::HmmViterbi);
    }
}
