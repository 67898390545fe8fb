//! Integration test: nominal production.
//!
//! Validates: IDLE → LOADING → HEATING → QUENCH → UNLOADING → next part,
//! cycle accounting, coil wear and reset.

use hardening_common::telemetry::{EventStatus, ProcessState, TelemetryState};

use super::common::{collect_records, machine, machine_with, next_record, seeded_config};

#[test]
fn nominal_cycle_reaches_quench_then_completes_ok() {
    let mut m = machine(11);
    assert!(m.start_cycle());
    let first_part = m.part_id().map(str::to_string);

    let mut ticks = 0;
    while m.state() != ProcessState::Quench {
        assert!(m.tick().is_none());
        ticks += 1;
        assert!(ticks <= 20, "still {} after {ticks} ticks", m.state());
    }
    assert!(m.part_temp() >= 850.0);

    let record = next_record(&mut m, 80 - ticks).expect("cycle did not complete");
    assert_eq!(record.state, TelemetryState::Completed);
    assert_eq!(record.part_id, first_part);
    assert!(record.ng_reason.is_none());
    assert!(record.downtime.is_none());
    assert_eq!(record.ok_count, 1);
    assert_eq!(record.ng_count, 0);
    assert!(record.peak_part_temp_c >= 850.0);
    assert!(record.part_temp_c <= 50.0);

    // The next part is already heating.
    assert_eq!(m.state(), ProcessState::Heating);
    assert!(m.part_id().is_some());
    assert_ne!(m.part_id().map(str::to_string), first_part);
}

#[test]
fn consecutive_parts_have_distinct_ids_and_advancing_clock() {
    let mut m = machine(12);
    m.start_cycle();
    let records = collect_records(&mut m, 200);
    assert!(records.len() >= 4);

    for pair in records.windows(2) {
        assert_ne!(pair[0].part_id, pair[1].part_id);
        assert!(pair[0].timestamp < pair[1].timestamp);
        assert_eq!(pair[1].ok_count, pair[0].ok_count + 1);
        assert_eq!(pair[1].coil_life + 1, pair[0].coil_life);
    }
    assert!(records.iter().all(|r| r.sim_clock.starts_with("Day 1, 09:0")));
    assert_eq!(m.event_log().count(), 0);
}

#[test]
fn coil_is_replaced_when_life_runs_out() {
    let mut config = seeded_config(13);
    config.rules.coil_life_max = 3;
    let mut m = machine_with(&config);
    m.start_cycle();

    let coil: Vec<u32> = collect_records(&mut m, 300)
        .iter()
        .take(6)
        .map(|r| r.coil_life)
        .collect();
    assert_eq!(coil, vec![2, 1, 3, 2, 1, 3]);
}

#[test]
fn stop_and_restart_keeps_counters() {
    let mut m = machine(14);
    m.start_cycle();
    next_record(&mut m, 80).unwrap();
    for _ in 0..5 {
        m.tick();
    }

    m.stop();
    assert_eq!(m.state(), ProcessState::Idle);
    assert!(m.tick().is_none());
    assert_eq!(m.state(), ProcessState::Idle);

    assert!(m.start_cycle());
    let record = next_record(&mut m, 80).unwrap();
    assert_eq!(record.ok_count, 2);
    assert_eq!(record.coil_life, 199_998);
}

#[test]
fn reset_returns_to_fresh_machine() {
    let mut config = seeded_config(15);
    config.rules.quality_stop.enabled = true;
    config.rules.quality_stop.after = 2;
    let mut m = machine_with(&config);

    m.set_manual_control(true, 700.0, 120.0).unwrap();
    m.start_cycle();
    let records = collect_records(&mut m, 120);
    assert_eq!(m.state(), ProcessState::Down);
    assert!(records.last().unwrap().downtime.is_some());

    m.reset();
    assert_eq!(m.state(), ProcessState::Idle);
    assert_eq!(m.ok_count(), 0);
    assert_eq!(m.ng_count(), 0);
    assert_eq!(m.coil_life(), 200_000);
    assert_eq!(m.consecutive_ng(), 0);
    assert_eq!(m.event_log().count(), 0);
    assert!(m.downtime().is_none());
    assert!(m.clock().format().starts_with("Day 1, "));
    assert_eq!(m.clock().elapsed_secs(), 0);
    // Manual mode survives a reset.
    assert!(m.manual_control().is_some());

    m.disable_manual_control();
    m.start_cycle();
    let record = next_record(&mut m, 80).unwrap();
    assert!(record.ng_reason.is_none());
    assert_eq!(record.ok_count, 1);
}

#[test]
fn reset_after_ok_parts_clears_counters_and_coil() {
    let mut m = machine(17);
    m.start_cycle();
    let records = collect_records(&mut m, 200);
    assert!(records.len() >= 3);
    assert!(records.iter().all(|r| r.ng_reason.is_none()));
    assert_eq!(m.ok_count(), records.len() as u64);
    assert_eq!(m.coil_life(), 200_000 - records.len() as u32);
    assert!(m.clock().elapsed_secs() > 0);

    m.reset();
    assert_eq!(m.state(), ProcessState::Idle);
    assert_eq!(m.ok_count(), 0);
    assert_eq!(m.ng_count(), 0);
    assert_eq!(m.coil_life(), 200_000);
    assert!(m.part_id().is_none());
    assert_eq!(m.clock().elapsed_secs(), 0);

    let status = m.get_status();
    assert_eq!(status.telemetry.ok_count, 0);
    assert_eq!(status.telemetry.coil_life, 200_000);

    m.start_cycle();
    let record = next_record(&mut m, 80).unwrap();
    assert_eq!(record.ok_count, 1);
    assert_eq!(record.coil_life, 199_999);
}

#[test]
fn manual_mode_produces_ng_parts_and_quality_stop() {
    let mut config = seeded_config(16);
    config.rules.quality_stop.enabled = true;
    config.rules.quality_stop.after = 2;
    let mut m = machine_with(&config);

    m.set_manual_control(true, 700.0, 120.0).unwrap();
    m.start_cycle();

    let first = next_record(&mut m, 80).unwrap();
    let reason = first.ng_reason.as_deref().unwrap();
    assert!(reason.contains("UNDERHEATED"), "{reason}");
    assert!(first.downtime.is_none());
    assert_eq!(first.ng_count, 1);
    assert!(first.peak_part_temp_c <= 700.0);

    let second = next_record(&mut m, 80).unwrap();
    assert_eq!(second.state, TelemetryState::Down);
    assert!(second.ng_reason.is_none());
    let downtime = second.downtime.unwrap();
    assert!(
        downtime
            .reason
            .starts_with("Quality Stop (2 Consecutive NG): NG: UNDERHEATED"),
        "{}",
        downtime.reason
    );
    assert!((10..=20).contains(&downtime.repair_ticks));

    let events: Vec<EventStatus> = m.event_log().map(|e| e.status).collect();
    assert_eq!(events, vec![EventStatus::Ng, EventStatus::Down]);
    assert_eq!(m.ng_count(), 2);
}
