//! Configuration loading traits and types.
//!
//! Every binary in the workspace reads one TOML file through [`ConfigLoader`]
//! and embeds [`SharedConfig`] under `[shared]`.
//!
//! # Usage
//!
//! ```rust,no_run
//! use hardening_common::config::{ConfigError, TwinConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = TwinConfig::load_validated(Path::new("config/twin.toml"))?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::consts::{
    AMBIENT_TEMP_C, BRIDGE_CAPACITY, DEFAULT_SINK_PATH, HEATING_POWER_KW, HEATING_TARGET_C,
    LIVE_RUN_ID, QUENCH_EXIT_C, QUENCH_FLOW_LPM, QUENCH_WATER_TEMP_C, SIM_STEP_MS,
    TICK_PERIOD_MS, WATCHDOG_TICKS,
};
use crate::limits::RuleConfig;

/// Why a config file could not be turned into a [`TwinConfig`].
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Unreadable file or bad TOML.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Parsed, but a value is out of range or inconsistent.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// `[shared] log_level`, written in lowercase in the TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_filter(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// The `[shared]` table: log level and the line name stamped on logs.
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "hardening-line-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    #[serde(default)]
    pub log_level: LogLevel,
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            service_name: "hardening-twin".to_string(),
        }
    }
}

impl SharedConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reads any deserializable config type from a TOML file. A missing file is
/// [`ConfigError::FileNotFound`] so callers can fall back to defaults.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.to_path_buf()),
            _ => ConfigError::ParseError(format!("{}: {e}", path.display())),
        })?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Twin sections ──────────────────────────────────────────────────

/// Tick pacing and simulated-time step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickConfig {
    /// Wall-clock period between ticks [ms].
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    /// Simulated time advanced per tick [ms].
    #[serde(default = "default_sim_step_ms")]
    pub sim_step_ms: u64,
    /// RNG seed; entropy-seeded when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_period_ms() -> u64 {
    TICK_PERIOD_MS
}

fn default_sim_step_ms() -> u64 {
    SIM_STEP_MS
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            sim_step_ms: default_sim_step_ms(),
            seed: None,
        }
    }
}

/// Gaussian sensor noise (standard deviation) on the live view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorNoise {
    pub power_kw: f64,
    pub flow_lpm: f64,
    pub pressure_bar: f64,
}

impl Default for SensorNoise {
    fn default() -> Self {
        Self {
            power_kw: 0.5,
            flow_lpm: 2.0,
            pressure_bar: 0.05,
        }
    }
}

/// Process set-points per state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub heating_power_kw: f64,
    pub heating_scan_speed_mm_s: f64,
    /// Part temperature that ends HEATING [°C].
    pub heating_target_c: f64,
    /// Part temperature that ends QUENCH [°C].
    pub quench_exit_c: f64,
    pub quench_flow_lpm: f64,
    /// Uniform flow jitter around the target [lpm].
    pub quench_flow_jitter_lpm: f64,
    pub quench_pressure_min_bar: f64,
    pub quench_pressure_max_bar: f64,
    pub quench_scan_speed_mm_s: f64,
    pub quench_tempering_speed_mm_s: f64,
    /// Nominal quench-water temperature [°C].
    pub quench_water_temp_c: f64,
    /// Ticks allowed in HEATING or QUENCH before forcing progress.
    pub watchdog_ticks: u32,
    pub sensor_noise: SensorNoise,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            heating_power_kw: HEATING_POWER_KW,
            heating_scan_speed_mm_s: 10.0,
            heating_target_c: HEATING_TARGET_C,
            quench_exit_c: QUENCH_EXIT_C,
            quench_flow_lpm: QUENCH_FLOW_LPM,
            quench_flow_jitter_lpm: 2.0,
            quench_pressure_min_bar: 3.4,
            quench_pressure_max_bar: 3.6,
            quench_scan_speed_mm_s: 8.0,
            quench_tempering_speed_mm_s: 5.0,
            quench_water_temp_c: QUENCH_WATER_TEMP_C,
            watchdog_ticks: WATCHDOG_TICKS,
            sensor_noise: SensorNoise::default(),
        }
    }
}

/// First-order energy balance coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalConfig {
    pub ambient_c: f64,
    /// °C gained per kW per tick.
    pub c_heat: f64,
    /// °C lost per lpm per tick.
    pub c_cool: f64,
    /// Fraction of the excess over ambient lost per tick.
    pub c_loss: f64,
    /// Half-width of the uniform sensor noise [°C].
    pub noise_band_c: f64,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            ambient_c: AMBIENT_TEMP_C,
            c_heat: 1.4,
            c_cool: 0.2,
            c_loss: 0.05,
            noise_band_c: 0.5,
        }
    }
}

/// Per-tick drift magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    pub rate_per_tick: f64,
    /// Pressure has a tighter safety band and drifts slower.
    pub pressure_rate_per_tick: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            rate_per_tick: 0.8,
            pressure_rate_per_tick: 0.04,
        }
    }
}

/// Telemetry hand-off and sink settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub capacity: usize,
    pub sink_path: PathBuf,
    /// Run bucket persisted rows are filed under.
    pub run_id: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            capacity: BRIDGE_CAPACITY,
            sink_path: PathBuf::from(DEFAULT_SINK_PATH),
            run_id: LIVE_RUN_ID,
        }
    }
}

/// Complete twin configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "hardening-line-01"
///
/// [tick]
/// period_ms = 200
/// seed = 42
///
/// [rules.quality_stop]
/// enabled = true
/// after = 5
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwinConfig {
    #[serde(default)]
    pub shared: SharedConfig,
    #[serde(default)]
    pub tick: TickConfig,
    #[serde(default)]
    pub process: ProcessConfig,
    #[serde(default)]
    pub thermal: ThermalConfig,
    #[serde(default)]
    pub rules: RuleConfig,
    #[serde(default)]
    pub drift: DriftConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

impl TwinConfig {
    /// Load from `path` and validate.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` on the first violated bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.rules.validate()?;

        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.tick.period_ms == 0 || self.tick.sim_step_ms == 0 {
            return invalid("tick period and sim step must be positive");
        }

        let p = &self.process;
        let t = &self.thermal;
        if p.heating_power_kw <= 0.0 || p.quench_flow_lpm <= 0.0 {
            return invalid("heating power and quench flow must be positive");
        }
        if !(p.heating_target_c > p.quench_exit_c && p.quench_exit_c > t.ambient_c) {
            return invalid("expected heating_target_c > quench_exit_c > ambient_c");
        }
        if p.quench_pressure_min_bar > p.quench_pressure_max_bar {
            return invalid("quench pressure min exceeds max");
        }
        if p.quench_flow_jitter_lpm < 0.0 {
            return invalid("quench_flow_jitter_lpm cannot be negative");
        }
        if p.watchdog_ticks <= self.rules.grace_ticks {
            return invalid("watchdog_ticks must exceed rules.grace_ticks");
        }
        let n = &p.sensor_noise;
        if n.power_kw < 0.0 || n.flow_lpm < 0.0 || n.pressure_bar < 0.0 {
            return invalid("sensor noise cannot be negative");
        }

        if t.c_heat <= 0.0 || t.c_cool <= 0.0 {
            return invalid("c_heat and c_cool must be positive");
        }
        if !(0.0..1.0).contains(&t.c_loss) {
            return invalid("c_loss must be in [0, 1)");
        }
        if t.noise_band_c < 0.0 {
            return invalid("noise_band_c cannot be negative");
        }

        if self.drift.rate_per_tick <= 0.0 || self.drift.pressure_rate_per_tick <= 0.0 {
            return invalid("drift rates must be positive");
        }

        if self.bridge.capacity == 0 {
            return invalid("bridge capacity cannot be zero");
        }
        Ok(())
    }
}
