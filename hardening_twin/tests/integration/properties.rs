//! Property tests over seeds and fault choices.

use hardening_common::telemetry::TelemetryState;
use proptest::prelude::*;

use super::common::{machine, machine_with, seeded_config};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// The part never cools below ambient, whatever drift is running.
    #[test]
    fn part_temperature_never_below_ambient(seed in any::<u64>(), fault in any::<bool>()) {
        let mut m = machine(seed);
        if fault {
            m.inject_fault(None).unwrap();
        }
        m.start_cycle();
        for _ in 0..200 {
            m.tick();
            prop_assert!(m.part_temp() >= 25.0, "part at {}", m.part_temp());
        }
    }

    /// A record carries downtime or an NG reason, never both, and downtime
    /// exactly when it was emitted by a breakdown.
    #[test]
    fn records_carry_at_most_one_anomaly(seed in any::<u64>()) {
        let mut m = machine(seed);
        m.inject_fault(None).unwrap();
        m.start_cycle();
        for _ in 0..200 {
            if let Some(record) = m.tick() {
                prop_assert!(!(record.downtime.is_some() && record.ng_reason.is_some()));
                prop_assert_eq!(
                    record.downtime.is_some(),
                    record.state == TelemetryState::Down
                );
            }
        }
    }

    /// After k finished parts the coil shows `max - k mod max` cycles left.
    #[test]
    fn coil_life_wraps_to_a_new_coil(seed in any::<u64>(), max in 2u32..6) {
        let mut config = seeded_config(seed);
        config.rules.coil_life_max = max;
        let mut m = machine_with(&config);
        m.start_cycle();

        let mut finished = 0u32;
        for _ in 0..300 {
            if let Some(record) = m.tick() {
                finished += 1;
                prop_assert_eq!(record.coil_life, max - finished % max);
            }
        }
        prop_assert!(finished >= 6);
    }
}
