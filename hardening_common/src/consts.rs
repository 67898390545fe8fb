//! Line-wide constants for the hardening twin.
//!
//! Single source of truth for defaults and fixed limits.
//! Configuration defaults in [`crate::config`] and [`crate::limits`] refer here.

/// Tick period of the live simulation in milliseconds (5 Hz).
pub const TICK_PERIOD_MS: u64 = 200;

/// Simulated time advanced per tick in milliseconds.
pub const SIM_STEP_MS: u64 = 1000;

/// Ambient (and quench supply) temperature [°C].
pub const AMBIENT_TEMP_C: f64 = 25.0;

/// Part temperature at which heating hands over to quench [°C].
pub const HEATING_TARGET_C: f64 = 850.0;

/// Part temperature at which the quenched part is unloaded [°C].
pub const QUENCH_EXIT_C: f64 = 50.0;

/// Induction power applied while heating [kW].
pub const HEATING_POWER_KW: f64 = 50.0;

/// Nominal quench flow [lpm].
pub const QUENCH_FLOW_LPM: f64 = 120.0;

/// Nominal quench-water temperature [°C].
pub const QUENCH_WATER_TEMP_C: f64 = 26.5;

/// Ticks a part may spend in HEATING or QUENCH before the watchdog forces progress.
pub const WATCHDOG_TICKS: u32 = 50;

/// Ticks after entering a state before low-side safety checks apply.
pub const GRACE_TICKS: u32 = 2;

/// Coil life at installation [cycles].
pub const COIL_LIFE_MAX: u32 = 200_000;

/// Number of NG/DOWN events kept for the live view.
pub const EVENT_LOG_CAPACITY: usize = 10;

/// Default capacity of the telemetry hand-off queue.
pub const BRIDGE_CAPACITY: usize = 1024;

/// Default run identifier for the live view bucket.
pub const LIVE_RUN_ID: u32 = 1;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/twin.toml";

/// Default telemetry sink path.
pub const DEFAULT_SINK_PATH: &str = "data/telemetry.jsonl";
