//! Integration test: configuration files drive the machine.
//!
//! Validates: the shipped sample loads and validates, partial files fall
//! back to defaults, and loaded settings reach the simulation.

use std::io::Write;
use std::path::PathBuf;

use hardening_common::config::{ConfigError, LogLevel, TwinConfig};
use hardening_common::telemetry::ProcessState;

use super::common::{machine_with, next_record};

fn sample_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("config")
        .join("twin.toml")
}

fn write_config(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn shipped_sample_matches_defaults() {
    let config = TwinConfig::load_validated(&sample_path()).unwrap();
    let defaults = TwinConfig::default();

    assert_eq!(config.shared.service_name, "hardening-line-01");
    assert_eq!(config.shared.log_level, LogLevel::Info);
    assert_eq!(config.tick, defaults.tick);
    assert_eq!(config.process, defaults.process);
    assert_eq!(config.thermal, defaults.thermal);
    assert_eq!(config.rules, defaults.rules);
    assert_eq!(config.drift, defaults.drift);
    assert_eq!(config.bridge, defaults.bridge);
}

#[test]
fn partial_file_overrides_only_what_it_names() {
    let file = write_config(
        r#"
[tick]
seed = 5

[rules]
coil_life_max = 2

[rules.quality_stop]
enabled = true
"#,
    );
    let config = TwinConfig::load_validated(file.path()).unwrap();
    assert_eq!(config.tick.seed, Some(5));
    assert_eq!(config.tick.period_ms, 200);
    assert!(config.rules.quality_stop.enabled);
    assert_eq!(config.rules.quality_stop.after, 5);

    let mut m = machine_with(&config);
    assert_eq!(m.coil_life(), 2);
    m.start_cycle();
    assert_eq!(next_record(&mut m, 80).unwrap().coil_life, 1);
    assert_eq!(next_record(&mut m, 80).unwrap().coil_life, 2);
    assert_eq!(m.state(), ProcessState::Heating);
}

#[test]
fn invalid_files_are_rejected() {
    let inverted = write_config(
        r#"
[rules.quality.flow_lpm]
min = 150.0
max = 80.0
"#,
    );
    assert!(matches!(
        TwinConfig::load_validated(inverted.path()),
        Err(ConfigError::ValidationError(_))
    ));

    let broken = write_config("[tick\nperiod_ms = 200");
    assert!(matches!(
        TwinConfig::load_validated(broken.path()),
        Err(ConfigError::ParseError(_))
    ));

    let missing = sample_path().with_file_name("absent.toml");
    assert!(matches!(
        TwinConfig::load_validated(&missing),
        Err(ConfigError::FileNotFound(ref p)) if *p == missing
    ));
}
