//! Integration test: drift faults end in NG parts and breakdowns.
//!
//! Validates: named failures ramp the right reading, the matching safety
//! rule trips with its fault code, and DOWN ignores `start_cycle` until a
//! repair or an operator stop.

use hardening_common::telemetry::{EventStatus, FaultCode, ProcessState, TelemetryState};
use hardening_twin::drift::{Direction, DriftParam};
use hardening_twin::error::TwinError;
use hardening_twin::machine::MachineController;

use super::common::{collect_records, machine, next_record};

#[test]
fn hose_burst_degrades_quality_then_breaks_down() {
    let mut m = machine(21);
    let drift = m.inject_fault(Some("hose_burst")).unwrap();
    assert_eq!(drift.target, Some(DriftParam::Pressure));
    assert!(drift.rate > 0.0);
    m.start_cycle();

    let records = collect_records(&mut m, 150);
    let (last, parts) = records.split_last().expect("no records");

    // Pressure creeps above the quality band before it bursts.
    let first = &parts[0];
    assert!(
        first
            .ng_reason
            .as_deref()
            .is_some_and(|r| r.contains("High Pressure")),
        "{:?}",
        first.ng_reason
    );

    assert_eq!(last.state, TelemetryState::Down);
    let downtime = last.downtime.as_ref().unwrap();
    assert_eq!(downtime.code, FaultCode::Breakdown);
    assert!(downtime.reason.starts_with("Hose Burst (Pressure "));
    assert!((40..=50).contains(&downtime.repair_ticks));
    assert!(last.ng_reason.is_none());
    assert_eq!(m.state(), ProcessState::Down);
}

#[test]
fn cooling_failure_trips_scald_protection_in_first_quench() {
    let mut m = machine(22);
    m.inject_fault(Some("cooling_fail")).unwrap();
    m.start_cycle();

    let records = collect_records(&mut m, 60);
    assert_eq!(records.len(), 1);
    let downtime = records[0].downtime.as_ref().unwrap();
    assert!(downtime.reason.starts_with("Scalding Risk"));
    assert_eq!(downtime.code, FaultCode::Breakdown);
}

#[test]
fn pump_failure_stops_machine() {
    let mut m = machine(23);
    m.inject_fault(Some("pump_failure")).unwrap();
    m.start_cycle();

    let records = collect_records(&mut m, 400);
    let down = records.last().unwrap();
    let downtime = down.downtime.as_ref().unwrap();
    assert!(downtime.reason.starts_with("Pump Failure (Flow "), "{}", downtime.reason);
    assert_eq!(downtime.code, FaultCode::MachineStop);
    assert!(records[..records.len() - 1].iter().all(|r| r.downtime.is_none()));
}

fn break_down_on_overcurrent(m: &mut MachineController) {
    m.inject_drift(DriftParam::Power, Direction::Up);
    assert!(m.start_cycle());
    let records = collect_records(m, 150);
    assert_eq!(m.state(), ProcessState::Down);
    let down = records.last().unwrap();
    assert!(down.downtime_reason().unwrap().starts_with("Inverter Overcurrent"));
}

#[test]
fn down_machine_ignores_start_until_repaired() {
    let mut m = machine(24);
    break_down_on_overcurrent(&mut m);

    let ng_before = m.ng_count();
    assert!(!m.start_cycle());
    assert!(collect_records(&mut m, 20).is_empty());
    assert_eq!(m.ng_count(), ng_before);

    let status = m.get_status();
    assert_eq!(status.state, ProcessState::Down);
    assert!(status.telemetry.downtime.is_some());
    assert_eq!(status.event_log.last().unwrap().status, EventStatus::Down);

    m.repair();
    assert_eq!(m.state(), ProcessState::Idle);
    assert!(m.drift_state().target.is_none());
    assert!(m.start_cycle());
}

#[test]
fn stop_forces_down_machine_to_idle() {
    let mut m = machine(24);
    break_down_on_overcurrent(&mut m);
    let (ok, ng, coil) = (m.ok_count(), m.ng_count(), m.coil_life());

    m.stop();
    assert_eq!(m.state(), ProcessState::Idle);
    assert!(m.downtime().is_none());
    assert!(m.drift_state().target.is_none());
    let status = m.get_status();
    assert!(status.telemetry.downtime.is_none());
    assert_eq!((m.ok_count(), m.ng_count(), m.coil_life()), (ok, ng, coil));

    assert!(m.start_cycle());
    let record = next_record(&mut m, 60).unwrap();
    assert!(record.downtime.is_none());
}

#[test]
fn repair_on_idle_machine_changes_nothing() {
    let mut m = machine(25);
    m.repair();
    m.repair();
    assert_eq!(m.state(), ProcessState::Idle);
    assert_eq!(m.ok_count(), 0);
    assert_eq!(m.ng_count(), 0);
    assert!(m.downtime().is_none());
    assert_eq!(m.event_log().count(), 0);
}

#[test]
fn random_fault_targets_a_drift_parameter() {
    for seed in 0..20 {
        let mut m = machine(seed);
        let drift = m.inject_fault(None).unwrap();
        let target = drift.target.unwrap();
        assert!(DriftParam::RANDOM_SET.contains(&target));
        assert_ne!(drift.rate, 0.0);
    }
}

#[test]
fn unknown_fault_kind_leaves_machine_untouched() {
    let mut m = machine(26);
    let err = m.inject_fault(Some("lightning")).unwrap_err();
    assert!(matches!(err, TwinError::UnknownFaultKind(ref kind) if kind == "lightning"));
    assert!(m.drift_state().target.is_none());
}
