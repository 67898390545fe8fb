//! Quality bands, safety limits and repair-time ranges for the rule engine.
//!
//! Safety limits must be more extreme than the matching quality bands so an
//! NG zone exists between them: flow 50-80 lpm is a soft part, flow below
//! 50 lpm is a pump failure.
//!
//! # TOML Example
//!
//! ```toml
//! [rules]
//! grace_ticks = 2
//!
//! [rules.quality.pressure_bar]
//! min = 2.0
//! max = 4.0
//!
//! [rules.safety]
//! pressure_max_bar = 6.0
//!
//! [rules.quality_stop]
//! enabled = false
//! after = 5
//! ```

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::consts::{COIL_LIFE_MAX, GRACE_TICKS};

/// Two-sided acceptance band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityBand {
    pub min: f64,
    pub max: f64,
}

impl QualityBand {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min >= self.max {
            return Err(ConfigError::ValidationError(format!(
                "quality band {name}: min {} must be below max {}",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Quality bands a good part stays inside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityBands {
    pub pressure_bar: QualityBand,
    pub quench_water_temp_c: QualityBand,
    pub flow_lpm: QualityBand,
    pub scan_speed_mm_s: QualityBand,
    pub tempering_speed_mm_s: QualityBand,
    pub part_temp_c: QualityBand,
}

impl Default for QualityBands {
    fn default() -> Self {
        Self {
            pressure_bar: QualityBand::new(2.0, 4.0),
            quench_water_temp_c: QualityBand::new(25.0, 32.0),
            flow_lpm: QualityBand::new(80.0, 150.0),
            scan_speed_mm_s: QualityBand::new(8.0, 12.0),
            tempering_speed_mm_s: QualityBand::new(20.0, 30.0),
            part_temp_c: QualityBand::new(800.0, 880.0),
        }
    }
}

/// Single-sided machine-protection limits. Crossing one halts the line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyLimits {
    /// Hose burst above this pressure [bar].
    pub pressure_max_bar: f64,
    /// Complete pressure loss below this [bar].
    pub pressure_min_bar: f64,
    /// Pump failure below this flow [lpm].
    pub flow_min_lpm: f64,
    /// Scalding risk above this quench-water temperature [°C].
    pub quench_water_temp_max_c: f64,
    /// Part melt / coil damage above this part temperature [°C].
    pub part_temp_max_c: f64,
    /// Inverter overcurrent above this power [kW].
    pub power_max_kw: f64,
    /// Servo overload / jam below this scan speed [mm/s].
    pub speed_min_mm_s: f64,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            pressure_max_bar: 6.0,
            pressure_min_bar: 1.0,
            flow_min_lpm: 50.0,
            quench_water_temp_max_c: 50.0,
            part_temp_max_c: 1200.0,
            power_max_kw: 80.0,
            speed_min_mm_s: 5.0,
        }
    }
}

/// Readings at or below these floors are sensor noise, not process values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseFloors {
    pub part_temp_c: f64,
    pub flow_lpm: f64,
    pub pressure_bar: f64,
}

impl Default for NoiseFloors {
    fn default() -> Self {
        Self {
            part_temp_c: 100.0,
            flow_lpm: 10.0,
            pressure_bar: 0.1,
        }
    }
}

/// Inclusive repair-time range [ticks].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairRange {
    pub min_ticks: u32,
    pub max_ticks: u32,
}

impl RepairRange {
    pub const fn new(min_ticks: u32, max_ticks: u32) -> Self {
        Self {
            min_ticks,
            max_ticks,
        }
    }
}

/// Repair-time range per fault kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairRanges {
    pub coil_exhausted: RepairRange,
    pub part_melt: RepairRange,
    pub overcurrent: RepairRange,
    pub hose_burst: RepairRange,
    pub pressure_loss: RepairRange,
    pub pump_failure: RepairRange,
    pub scald_risk: RepairRange,
    pub servo_overload: RepairRange,
    pub quality_stop: RepairRange,
}

impl Default for RepairRanges {
    fn default() -> Self {
        Self {
            coil_exhausted: RepairRange::new(50, 70),
            part_melt: RepairRange::new(50, 70),
            overcurrent: RepairRange::new(40, 50),
            hose_burst: RepairRange::new(40, 50),
            pressure_loss: RepairRange::new(10, 20),
            pump_failure: RepairRange::new(25, 35),
            scald_risk: RepairRange::new(40, 50),
            servo_overload: RepairRange::new(15, 25),
            quality_stop: RepairRange::new(10, 20),
        }
    }
}

impl RepairRanges {
    fn validate(&self) -> Result<(), ConfigError> {
        let ranges = [
            ("coil_exhausted", self.coil_exhausted),
            ("part_melt", self.part_melt),
            ("overcurrent", self.overcurrent),
            ("hose_burst", self.hose_burst),
            ("pressure_loss", self.pressure_loss),
            ("pump_failure", self.pump_failure),
            ("scald_risk", self.scald_risk),
            ("servo_overload", self.servo_overload),
            ("quality_stop", self.quality_stop),
        ];
        for (name, range) in ranges {
            if range.min_ticks == 0 || range.min_ticks > range.max_ticks {
                return Err(ConfigError::ValidationError(format!(
                    "repair range {name}: [{}, {}] must be non-empty and start above zero",
                    range.min_ticks, range.max_ticks
                )));
            }
        }
        Ok(())
    }
}

/// Hard stop after N consecutive NG parts.
///
/// Off by default: the line keeps producing through NG streaks unless the
/// plant opts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityStopConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_quality_stop_after")]
    pub after: u32,
}

fn default_quality_stop_after() -> u32 {
    5
}

impl Default for QualityStopConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            after: default_quality_stop_after(),
        }
    }
}

/// Complete rule-engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub quality: QualityBands,
    pub safety: SafetyLimits,
    pub noise_floor: NoiseFloors,
    /// Ticks in QUENCH/HEATING before low-side safety checks apply.
    pub grace_ticks: u32,
    /// Coil life at installation [cycles].
    pub coil_life_max: u32,
    pub repair: RepairRanges,
    pub quality_stop: QualityStopConfig,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            quality: QualityBands::default(),
            safety: SafetyLimits::default(),
            noise_floor: NoiseFloors::default(),
            grace_ticks: GRACE_TICKS,
            coil_life_max: COIL_LIFE_MAX,
            repair: RepairRanges::default(),
            quality_stop: QualityStopConfig::default(),
        }
    }
}

impl RuleConfig {
    /// Validate band ordering and the quality/safety nesting.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if a band is empty, a safety
    /// limit sits inside its quality band, or a repair range is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let q = &self.quality;
        q.pressure_bar.validate("pressure_bar")?;
        q.quench_water_temp_c.validate("quench_water_temp_c")?;
        q.flow_lpm.validate("flow_lpm")?;
        q.scan_speed_mm_s.validate("scan_speed_mm_s")?;
        q.tempering_speed_mm_s.validate("tempering_speed_mm_s")?;
        q.part_temp_c.validate("part_temp_c")?;

        let s = &self.safety;
        let nesting = [
            (
                s.pressure_max_bar > q.pressure_bar.max,
                "pressure_max_bar must exceed quality pressure max",
            ),
            (
                s.pressure_min_bar < q.pressure_bar.min,
                "pressure_min_bar must be below quality pressure min",
            ),
            (
                s.flow_min_lpm < q.flow_lpm.min,
                "flow_min_lpm must be below quality flow min",
            ),
            (
                s.quench_water_temp_max_c > q.quench_water_temp_c.max,
                "quench_water_temp_max_c must exceed quality water max",
            ),
            (
                s.part_temp_max_c > q.part_temp_c.max,
                "part_temp_max_c must exceed quality part temperature max",
            ),
            (
                s.speed_min_mm_s < q.scan_speed_mm_s.min,
                "speed_min_mm_s must be below quality scan speed min",
            ),
        ];
        for (ok, msg) in nesting {
            if !ok {
                return Err(ConfigError::ValidationError(msg.to_string()));
            }
        }

        if self.coil_life_max == 0 {
            return Err(ConfigError::ValidationError(
                "coil_life_max cannot be zero".to_string(),
            ));
        }
        if self.quality_stop.enabled && self.quality_stop.after == 0 {
            return Err(ConfigError::ValidationError(
                "quality_stop.after must be at least 1".to_string(),
            ));
        }
        self.repair.validate()
    }
}
