//! Integration test: machine → bridge → durable store.
//!
//! Validates: every finished record reaches the sink in production order,
//! breakdown rows are flagged as anomalies, and the paced runner feeds the
//! same pipeline.

use std::time::Duration;

use hardening_common::telemetry::{ProcessState, TelemetryState};
use hardening_twin::bridge::TelemetryBridge;
use hardening_twin::drift::{Direction, DriftParam};
use hardening_twin::runner::TickRunner;
use hardening_twin::sink::{JsonLinesSink, MemorySink, PersistedRow};

use super::common::{collect_records, machine, seeded_config};

async fn read_rows(path: &std::path::Path) -> Vec<PersistedRow> {
    let text = tokio::fs::read_to_string(path).await.unwrap();
    text.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn finished_parts_are_persisted_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry.jsonl");

    let mut bridge = TelemetryBridge::new(64);
    bridge.start(JsonLinesSink::open(&path, 3).await.unwrap()).unwrap();

    let mut m = machine(31);
    m.attach_bridge(bridge.producer());
    m.start_cycle();
    let emitted = collect_records(&mut m, 160);
    assert!(emitted.len() >= 3);

    bridge.flush().await.unwrap();
    bridge.stop().await.unwrap();

    let rows = read_rows(&path).await;
    assert_eq!(rows.len(), emitted.len());
    for (row, record) in rows.iter().zip(&emitted) {
        assert_eq!(row.sim_run_id, 3);
        assert_eq!(row.record.part_id, record.part_id);
        assert_eq!(row.record.ok_count, record.ok_count);
        assert_eq!(row.record.coil_life, record.coil_life);
        assert_eq!(row.record.sim_clock, record.sim_clock);
        assert!(!row.is_anomaly);
    }
    let stats = bridge.stats();
    assert_eq!(stats.persisted, emitted.len() as u64);
    assert_eq!(stats.dropped, 0);
}

#[tokio::test]
async fn breakdown_rows_are_anomalies() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runs").join("telemetry.jsonl");

    let mut bridge = TelemetryBridge::new(64);
    bridge.start(JsonLinesSink::open(&path, 1).await.unwrap()).unwrap();

    let mut m = machine(32);
    m.attach_bridge(bridge.producer());
    m.inject_drift(DriftParam::ScanSpeed, Direction::Down);
    m.start_cycle();
    let emitted = collect_records(&mut m, 40);
    assert_eq!(emitted.len(), 1);

    bridge.stop().await.unwrap();

    let rows = read_rows(&path).await;
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_anomaly);
    assert_eq!(rows[0].record.state, TelemetryState::Down);
    assert!(
        rows[0]
            .record
            .downtime_reason()
            .unwrap()
            .starts_with("Servo Overload")
    );
    assert!(rows[0].record.repair_ticks() >= 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn paced_runner_feeds_the_bridge() {
    let sink = MemorySink::new();
    let mut bridge = TelemetryBridge::new(256);
    bridge.start(sink.clone()).unwrap();

    let mut m = hardening_twin::MachineController::new(&seeded_config(33));
    m.attach_bridge(bridge.producer());
    let runner = TickRunner::spawn(m, Duration::from_millis(1)).unwrap();
    let control = runner.control();
    control.start_cycle().unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while control.status().telemetry.ok_count < 3 {
        assert!(tokio::time::Instant::now() < deadline, "runner made no progress");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    control.stop().unwrap();
    while control.status().state != ProcessState::Idle {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    let stats = runner.shutdown().unwrap();

    bridge.flush().await.unwrap();
    bridge.stop().await.unwrap();

    let records = sink.records();
    assert_eq!(records.len() as u64, stats.records);
    assert!(records.len() >= 3);
    for pair in records.windows(2) {
        assert_eq!(pair[1].ok_count, pair[0].ok_count + 1);
        assert_ne!(pair[0].part_id, pair[1].part_id);
    }
}
