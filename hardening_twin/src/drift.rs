//! Persistent parameter drift for fault scenarios.
//!
//! A drift ramps one live input by a fixed amount per tick until it is
//! cleared by `repair`, `stop` or `reset`. The controller adds the
//! accumulated offset to the raw input and clamps it to the parameter's
//! physical range.

use hardening_common::config::DriftConfig;
use rand::Rng;
use rand::seq::SliceRandom;
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::error::TwinError;

/// Live input a drift can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriftParam {
    Pressure,
    Flow,
    QuenchWaterTemp,
    Power,
    ScanSpeed,
    /// Accelerated coil wear; always drifts toward exhaustion.
    CoilLife,
}

impl DriftParam {
    /// Parameters `inject_fault` picks from when none is named.
    pub const RANDOM_SET: [DriftParam; 5] = [
        Self::Pressure,
        Self::Flow,
        Self::QuenchWaterTemp,
        Self::Power,
        Self::ScanSpeed,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pressure => "pressure",
            Self::Flow => "flow",
            Self::QuenchWaterTemp => "quench_water_temp",
            Self::Power => "power",
            Self::ScanSpeed => "scan_speed",
            Self::CoilLife => "coil_life",
        }
    }

    /// Physical range of the drifted reading. Coil life is bounded by its maximum.
    pub fn range(&self, coil_life_max: u32) -> (f64, f64) {
        match self {
            Self::Pressure => (0.0, 10.0),
            Self::Flow => (0.0, 250.0),
            Self::QuenchWaterTemp => (0.0, 100.0),
            Self::Power => (0.0, 100.0),
            Self::ScanSpeed => (0.0, 20.0),
            Self::CoilLife => (0.0, f64::from(coil_life_max)),
        }
    }
}

impl fmt::Display for DriftParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ramp direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    #[inline]
    pub const fn sign(&self) -> f64 {
        match self {
            Self::Up => 1.0,
            Self::Down => -1.0,
        }
    }
}

impl FromStr for Direction {
    type Err = TwinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "+" | "increase" => Ok(Self::Up),
            "down" | "-" | "decrease" => Ok(Self::Down),
            other => Err(TwinError::UnknownFaultKind(format!("direction {other}"))),
        }
    }
}

/// Parsed `inject_fault` request: a parameter and, for named failures, the
/// direction that produces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultSpec {
    pub param: DriftParam,
    pub direction: Option<Direction>,
}

impl FromStr for FaultSpec {
    type Err = TwinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        let (param, direction) = match key.as_str() {
            "pressure" => (DriftParam::Pressure, None),
            "flow" => (DriftParam::Flow, None),
            "quench_water_temp" | "temp" => (DriftParam::QuenchWaterTemp, None),
            "power" => (DriftParam::Power, None),
            "scan_speed" => (DriftParam::ScanSpeed, None),
            "coil_life" => (DriftParam::CoilLife, Some(Direction::Up)),
            "hose_burst" => (DriftParam::Pressure, Some(Direction::Up)),
            "pump_failure" => (DriftParam::Flow, Some(Direction::Down)),
            "cooling_fail" => (DriftParam::QuenchWaterTemp, Some(Direction::Up)),
            "power_surge" => (DriftParam::Power, Some(Direction::Up)),
            "servo_jam" => (DriftParam::ScanSpeed, Some(Direction::Down)),
            "coil_failure" => (DriftParam::CoilLife, Some(Direction::Up)),
            _ => return Err(TwinError::UnknownFaultKind(s.to_string())),
        };
        Ok(Self { param, direction })
    }
}

/// Active drift: target, signed rate per tick and accumulated offset.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DriftState {
    pub target: Option<DriftParam>,
    pub rate: f64,
    pub offset: f64,
}

#[derive(Debug, Clone)]
pub struct DriftInjector {
    config: DriftConfig,
    state: DriftState,
}

impl DriftInjector {
    pub fn new(config: DriftConfig) -> Self {
        Self {
            config,
            state: DriftState::default(),
        }
    }

    /// Start drifting `param` in a random direction (coil life always wears).
    pub fn start<R: Rng + ?Sized>(&mut self, param: DriftParam, rng: &mut R) -> DriftState {
        let direction = if param == DriftParam::CoilLife || rng.gen_bool(0.5) {
            Direction::Up
        } else {
            Direction::Down
        };
        self.start_with(param, direction)
    }

    /// Start drifting `param` in a fixed direction.
    pub fn start_with(&mut self, param: DriftParam, direction: Direction) -> DriftState {
        let direction = if param == DriftParam::CoilLife {
            Direction::Up
        } else {
            direction
        };
        let magnitude = match param {
            DriftParam::Pressure => self.config.pressure_rate_per_tick,
            _ => self.config.rate_per_tick,
        };
        self.state = DriftState {
            target: Some(param),
            rate: magnitude * direction.sign(),
            offset: 0.0,
        };
        info!(param = %param, rate = self.state.rate, "drift started");
        self.state
    }

    /// Uniform pick from [`DriftParam::RANDOM_SET`].
    pub fn pick_random<R: Rng + ?Sized>(rng: &mut R) -> DriftParam {
        DriftParam::RANDOM_SET
            .choose(rng)
            .copied()
            .unwrap_or(DriftParam::Pressure)
    }

    /// Advance the accumulator by one tick; no-op without a target.
    pub fn advance(&mut self) {
        if self.state.target.is_some() {
            self.state.offset += self.state.rate;
        }
    }

    /// Offset currently applied to `param`, if it is the drift target.
    pub fn offset_for(&self, param: DriftParam) -> Option<f64> {
        (self.state.target == Some(param)).then_some(self.state.offset)
    }

    /// `value` with the drift offset applied and clamped, or unchanged if
    /// `param` is not drifting.
    pub fn apply(&self, param: DriftParam, value: f64, coil_life_max: u32) -> f64 {
        match self.offset_for(param) {
            Some(offset) => {
                let (lo, hi) = param.range(coil_life_max);
                (value + offset).clamp(lo, hi)
            }
            None => value,
        }
    }

    #[inline]
    pub fn state(&self) -> DriftState {
        self.state
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state.target.is_some()
    }

    pub fn clear(&mut self) {
        self.state = DriftState::default();
    }
}
