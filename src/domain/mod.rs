//! Domain models - core scanner types
//!
//! This module contains the canonical data types used throughout the system:
//! - `AntennaId` / `TagId` - identities of reading channels and tagged items
//! - `Detection` - one parsed (antenna, tag) record from a scan cycle
//! - `FilterMethod` - the selectable presence filtering strategy
//! - `ChangeEvent` / `ScanEvent` - what the scan loop hands to its consumer

pub mod event;
pub mod types;

pub use event::{AntennaChange, ChangeEvent, ScanEvent};
pub use types::{AntennaId, Detection, FilterMethod, ScannerState, TagId, MAX_ANTENNAS};
