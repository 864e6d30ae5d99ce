//! Configuration errors raised before the scan loop starts

use crate::domain::types::UnknownFilterMethod;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("antenna_count must be at least 1")]
    NoAntennas,

    #[error("antenna_count {0} exceeds the {max} antennas the reader can address", max = crate::domain::MAX_ANTENNAS)]
    TooManyAntennas(usize),

    #[error("window_size must be at least 1")]
    EmptyWindow,

    #[error("scan_duration must be greater than zero")]
    ZeroScanDuration,

    #[error("event_buffer must be at least 1")]
    ZeroEventBuffer,

    #[error(transparent)]
    FilterMethod(#[from] UnknownFilterMethod),
}
