//! Change event egress - appends change events to a JSONL file
//!
//! One JSON object per line, written to the file specified in config.

use crate::domain::event::ChangeEvent;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

pub struct ChangeEgress {
    file_path: PathBuf,
}

impl ChangeEgress {
    pub fn new(file_path: impl AsRef<Path>) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        info!(file_path = %file_path.display(), "egress_initialized");
        Self { file_path }
    }

    /// Write a change event to the egress file
    /// Returns true if successful, false otherwise
    pub fn write_change(&self, event: &ChangeEvent) -> bool {
        let json = event.to_json();

        match self.append_line(&json) {
            Ok(()) => {
                info!(
                    id = %event.id,
                    cycle = %event.cycle,
                    antennas = %event.antennas.len(),
                    "change_egressed"
                );
                true
            }
            Err(e) => {
                error!(id = %event.id, error = %e, "change_egress_failed");
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.file_path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path.display(), bytes = %line.len(), "egress_written");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::AntennaChange;
    use crate::domain::types::{AntennaId, FilterMethod, TagId};
    use std::collections::{BTreeMap, BTreeSet};
    use std::fs;
    use tempfile::tempdir;

    fn sample_event(cycle: u64) -> ChangeEvent {
        let now: BTreeSet<TagId> = [TagId::from("E2806995")].into_iter().collect();
        let mut antennas = BTreeMap::new();
        antennas.insert(AntennaId(0), AntennaChange::between(&BTreeSet::new(), &now).unwrap());
        ChangeEvent::new(cycle, FilterMethod::WindowLpf, antennas)
    }

    #[test]
    fn test_write_change() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("changes.jsonl");
        let egress = ChangeEgress::new(&file_path);

        let event = sample_event(3);
        assert!(egress.write_change(&event));

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["id"], event.id.to_string());
        assert_eq!(parsed["cycle"], 3);
        assert_eq!(parsed["antennas"]["0"]["tags"][0], "E2806995");
    }

    #[test]
    fn test_append_mode() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("changes.jsonl");
        fs::write(&file_path, "{\"existing\":\"data\"}\n").unwrap();

        let egress = ChangeEgress::new(&file_path);
        egress.write_change(&sample_event(1));
        egress.write_change(&sample_event(2));

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("existing"));
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested").join("dir").join("changes.jsonl");
        let egress = ChangeEgress::new(&nested);
        assert!(egress.write_change(&sample_event(1)));
        assert!(nested.exists());
    }
}
