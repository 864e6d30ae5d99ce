//! Detection record parsing
//!
//! The reader prints one record per detection:
//!
//! ```text
//! <tag_id>,<antenna_digit>,<XXXX>
//! ```
//!
//! - `tag_id`: reader-assigned hex EPC, never contains a comma
//! - `antenna_digit`: single digit 1-8 (1-based)
//! - `<XXXX>`: 4 hex digits wrapped in angle brackets (frame checksum)
//!
//! The serial link is noisy, so partial and garbled lines show up every
//! cycle. Anything that does not match the grammar is dropped.

use crate::domain::types::{AntennaId, Detection, TagId};
use std::collections::BTreeSet;
use tracing::trace;

const CHECKSUM_HEX_DIGITS: usize = 4;

/// Parse one scan window's buffer into distinct (antenna, tag) detections
///
/// Records naming an antenna outside `0..antenna_count` are dropped.
pub fn parse_buffer(buffer: &str, antenna_count: usize) -> BTreeSet<Detection> {
    let mut detections = BTreeSet::new();
    let mut rejected = 0usize;

    for line in buffer.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_record(line) {
            Some(detection) if detection.antenna.index() < antenna_count => {
                detections.insert(detection);
            }
            _ => rejected += 1,
        }
    }

    if rejected > 0 {
        trace!(rejected = %rejected, accepted = %detections.len(), "records_rejected");
    }

    detections
}

/// Parse a single trimmed record line
pub fn parse_record(line: &str) -> Option<Detection> {
    let mut fields = line.split(',');
    let tag = fields.next()?;
    let antenna = fields.next()?;
    let checksum = fields.next()?;
    if fields.next().is_some() || tag.is_empty() {
        return None;
    }

    let antenna = parse_antenna_digit(antenna)?;
    if !is_checksum_field(checksum) {
        return None;
    }

    Some(Detection { antenna, tag: TagId::new(tag) })
}

fn parse_antenna_digit(field: &str) -> Option<AntennaId> {
    match field.as_bytes() {
        [digit @ b'0'..=b'9'] => AntennaId::from_wire(digit - b'0'),
        _ => None,
    }
}

fn is_checksum_field(field: &str) -> bool {
    field
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .is_some_and(|hex| {
            hex.len() == CHECKSUM_HEX_DIGITS && hex.bytes().all(|b| b.is_ascii_hexdigit())
        })
}
