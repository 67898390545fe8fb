//! Shared fixtures: seeded machines with a fixed clock anchor.

use chrono::NaiveDate;
use hardening_common::config::TwinConfig;
use hardening_common::telemetry::TelemetrySnapshot;
use hardening_twin::clock::SimClock;
use hardening_twin::machine::MachineController;

pub fn seeded_config(seed: u64) -> TwinConfig {
    let mut config = TwinConfig::default();
    config.tick.seed = Some(seed);
    config
}

/// Machine built from `config`, clock anchored at 09:00 on day 1.
pub fn machine_with(config: &TwinConfig) -> MachineController {
    let anchor = NaiveDate::from_ymd_opt(2025, 3, 1)
        .and_then(|d| d.and_hms_opt(9, 0, 0))
        .unwrap();
    MachineController::new(config).with_clock(SimClock::starting_at(anchor, 1000))
}

pub fn machine(seed: u64) -> MachineController {
    machine_with(&seeded_config(seed))
}

/// Tick up to `limit` times, returning the first emitted record.
pub fn next_record(m: &mut MachineController, limit: usize) -> Option<TelemetrySnapshot> {
    (0..limit).find_map(|_| m.tick())
}

/// Every record emitted over `ticks` ticks.
pub fn collect_records(m: &mut MachineController, ticks: usize) -> Vec<TelemetrySnapshot> {
    (0..ticks).filter_map(|_| m.tick()).collect()
}
