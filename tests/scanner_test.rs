//! Integration tests driving the scan loop from recorded captures

use shelf_scanner::domain::{AntennaId, FilterMethod, ScanEvent, ScannerState, TagId};
use shelf_scanner::infra::{Metrics, ScannerSettings};
use shelf_scanner::io::{ChangeEgress, ReplayTransport};
use shelf_scanner::services::Scanner;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, NamedTempFile};

const TAG: &str = "E200341201";

fn capture(cycles: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(cycles.join("---\n").as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn settings(method: FilterMethod) -> ScannerSettings {
    ScannerSettings::new(4, Duration::from_millis(10), 3, method).unwrap()
}

async fn next_change(events: &mut tokio::sync::mpsc::Receiver<ScanEvent>) -> shelf_scanner::domain::ChangeEvent {
    match tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
        Ok(Some(ScanEvent::Changed(change))) => change,
        other => panic!("expected change event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_hmm_rides_out_single_miss() {
    let hit = "E200341201,2,<5D36>\n";
    let noisy_miss = "E2003412,9,<5D36>\n#garbled\n";
    let file = capture(&[hit, hit, hit, hit, noisy_miss, hit, hit]);
    let transport = ReplayTransport::from_file(file.path()).unwrap();

    let (scanner, handle, mut events) =
        Scanner::new(settings(FilterMethod::HmmViterbi), transport, Arc::new(Metrics::new())).unwrap();
    let task = tokio::spawn(scanner.run());

    let arrived = next_change(&mut events).await;
    assert_eq!(arrived.cycle, 1);
    assert_eq!(arrived.antennas[&AntennaId(1)].added, BTreeSet::from([TagId::from(TAG)]));
    assert!(handle.start());

    // The miss in cycle 5 is absorbed; two misses after the capture runs out are not
    let departed = next_change(&mut events).await;
    assert_eq!(departed.cycle, 9);
    assert_eq!(departed.antennas[&AntennaId(1)].removed, BTreeSet::from([TagId::from(TAG)]));
    assert_eq!(departed.filter_method, FilterMethod::HmmViterbi);

    handle.stop();
    task.await.unwrap();
}

#[tokio::test]
async fn test_consumer_loop_egresses_and_resumes() {
    let dir = tempdir().unwrap();
    let egress_path = dir.path().join("out").join("changes.jsonl");
    let file = capture(&[
        "A1,1,<0001>\nB1,3,<0002>\n",
        "A1,1,<0001>\nB1,3,<0002>\n",
        "A1,1,<0001>\n",
    ]);
    let transport = ReplayTransport::from_file(file.path()).unwrap();
    let metrics = Arc::new(Metrics::new());

    let (scanner, handle, mut events) =
        Scanner::new(settings(FilterMethod::NoFiltering), transport, metrics.clone()).unwrap();
    let task = tokio::spawn(scanner.run());
    let egress = ChangeEgress::new(&egress_path);

    let mut seen = Vec::new();
    while seen.len() < 3 {
        let change = next_change(&mut events).await;
        assert_eq!(handle.state(), ScannerState::Paused);
        egress.write_change(&change);
        seen.push(change);
        handle.start();
    }
    handle.stop();
    task.await.unwrap();

    // Arrival, B1 leaving antenna 3, then A1 leaving once the capture is exhausted
    assert_eq!(seen[0].counts().into_iter().collect::<Vec<_>>(), vec![(AntennaId(0), 1), (AntennaId(2), 1)]);
    assert_eq!(seen[1].antennas.keys().copied().collect::<Vec<_>>(), vec![AntennaId(2)]);
    assert_eq!(seen[2].antennas[&AntennaId(0)].count, 0);

    let lines: Vec<serde_json::Value> = fs::read_to_string(&egress_path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["filter_method"], "none");
    assert_eq!(lines[1]["antennas"]["2"]["removed"][0], "B1");
    assert_eq!(metrics.changes_total(), 3);
}

#[tokio::test]
async fn test_runtime_filter_switch_via_handle() {
    let hit = "T9,4,<ABCD>\n";
    let transport = ReplayTransport::new([hit, hit, "", hit]);
    let (scanner, handle, mut events) =
        Scanner::new(settings(FilterMethod::NoFiltering), transport, Arc::new(Metrics::new())).unwrap();
    let task = tokio::spawn(scanner.run());

    let arrived = next_change(&mut events).await;
    assert_eq!(arrived.filter_method, FilterMethod::NoFiltering);

    // Window already holds two hits, so a single miss under the vote keeps the tag
    handle.set_filter_method(FilterMethod::WindowLpf);
    handle.start();

    let departed = next_change(&mut events).await;
    assert_eq!(departed.filter_method, FilterMethod::WindowLpf);
    assert_eq!(departed.cycle, 5);
    assert_eq!(handle.filter_method(), FilterMethod::WindowLpf);

    handle.stop();
    task.await.unwrap();
}
