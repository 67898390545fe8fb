//! Safety and quality rule engine.
//!
//! Classifies a [`TelemetrySnapshot`] as OK, NG or DOWN. Safety checks are
//! first-match in strict priority; quality checks accumulate every violation.
//!
//! | Priority | Check                               | Outcome     |
//! |----------|-------------------------------------|-------------|
//! | 1        | coil life exhausted                 | DOWN (BD)   |
//! | 2        | part temperature above melt limit   | DOWN (BD)   |
//! | 3        | power above overcurrent limit       | DOWN (BD)   |
//! | 4        | QUENCH: burst / pressure loss / pump / scald | DOWN (BD/MS) |
//! | 5        | HEATING, QUENCH: scan speed too low | DOWN (MS)   |
//! | 6        | quality bands (all of them)         | NG          |
//! | 7        | nothing                             | OK          |

use hardening_common::limits::{RepairRange, RepairRanges, RuleConfig};
use hardening_common::telemetry::{Downtime, FaultCode, TelemetrySnapshot, TelemetryState};
use rand::Rng;
use std::fmt;
use tracing::debug;

/// Safety fault raised by the rule engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    CoilExhausted,
    PartMelt,
    Overcurrent,
    HoseBurst,
    PressureLoss,
    PumpFailure,
    ScaldRisk,
    ServoOverload,
    QualityStop,
}

impl FaultKind {
    /// Breakdowns imply hardware damage; machine stops are recoverable stalls.
    pub const fn code(&self) -> FaultCode {
        match self {
            Self::CoilExhausted
            | Self::PartMelt
            | Self::Overcurrent
            | Self::HoseBurst
            | Self::ScaldRisk => FaultCode::Breakdown,
            Self::PressureLoss | Self::PumpFailure | Self::ServoOverload => {
                FaultCode::MachineStop
            }
            Self::QualityStop => FaultCode::QualityStop,
        }
    }

    fn repair_range(&self, ranges: &RepairRanges) -> RepairRange {
        match self {
            Self::CoilExhausted => ranges.coil_exhausted,
            Self::PartMelt => ranges.part_melt,
            Self::Overcurrent => ranges.overcurrent,
            Self::HoseBurst => ranges.hose_burst,
            Self::PressureLoss => ranges.pressure_loss,
            Self::PumpFailure => ranges.pump_failure,
            Self::ScaldRisk => ranges.scald_risk,
            Self::ServoOverload => ranges.servo_overload,
            Self::QualityStop => ranges.quality_stop,
        }
    }
}

/// Verdict for one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum FaultOutcome {
    Ok,
    /// Part rejected; production continues. Reasons in evaluation order.
    Ng { reasons: Vec<String> },
    /// Machine halted until repaired.
    Down {
        kind: FaultKind,
        reason: String,
        /// Advisory repair duration [ticks].
        repair_ticks: u32,
    },
}

impl FaultOutcome {
    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    #[inline]
    pub fn is_down(&self) -> bool {
        matches!(self, Self::Down { .. })
    }

    /// Joined NG reason, `None` unless NG.
    pub fn ng_reason(&self) -> Option<String> {
        match self {
            Self::Ng { reasons } => Some(reasons.join(", ")),
            _ => None,
        }
    }

    /// Downtime record, `None` unless DOWN.
    pub fn downtime(&self) -> Option<Downtime> {
        match self {
            Self::Down {
                kind,
                reason,
                repair_ticks,
            } => Some(Downtime {
                code: kind.code(),
                reason: reason.clone(),
                repair_ticks: *repair_ticks,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for FaultOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Ng { reasons } => write!(f, "NG: {}", reasons.join(", ")),
            Self::Down { kind, reason, .. } => write!(f, "DOWN [{}]: {reason}", kind.code()),
        }
    }
}

/// Stateful classifier; the only state is the consecutive-NG counter.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    config: RuleConfig,
    consecutive_ng: u32,
}

impl RuleEngine {
    pub fn new(config: RuleConfig) -> Self {
        Self {
            config,
            consecutive_ng: 0,
        }
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    pub fn consecutive_ng(&self) -> u32 {
        self.consecutive_ng
    }

    /// Clear the consecutive-NG counter.
    pub fn reset(&mut self) {
        self.consecutive_ng = 0;
    }

    /// Classify `snapshot`.
    ///
    /// `commit` is set only for the end-of-cycle evaluation of a finished
    /// part; it updates the consecutive-NG counter and may trigger the
    /// quality stop. Repair ticks are drawn from `rng`.
    pub fn evaluate<R: Rng + ?Sized>(
        &mut self,
        snapshot: &TelemetrySnapshot,
        commit: bool,
        rng: &mut R,
    ) -> FaultOutcome {
        if let Some((kind, reason)) = self.safety_fault(snapshot) {
            return self.down(kind, reason, rng);
        }

        let reasons = self.quality_violations(snapshot);
        if reasons.is_empty() {
            if commit {
                self.consecutive_ng = 0;
            }
            return FaultOutcome::Ok;
        }

        if commit {
            self.consecutive_ng = self.consecutive_ng.saturating_add(1);
            let stop = &self.config.quality_stop;
            if stop.enabled && self.consecutive_ng >= stop.after {
                let reason = format!(
                    "Quality Stop ({} Consecutive NG): {}",
                    self.consecutive_ng,
                    reasons.join(", ")
                );
                return self.down(FaultKind::QualityStop, reason, rng);
            }
        }
        FaultOutcome::Ng { reasons }
    }

    fn down<R: Rng + ?Sized>(&self, kind: FaultKind, reason: String, rng: &mut R) -> FaultOutcome {
        let range = kind.repair_range(&self.config.repair);
        let repair_ticks = rng.gen_range(range.min_ticks..=range.max_ticks.max(range.min_ticks));
        debug!(?kind, %reason, repair_ticks, "safety rule tripped");
        FaultOutcome::Down {
            kind,
            reason,
            repair_ticks,
        }
    }

    fn safety_fault(&self, s: &TelemetrySnapshot) -> Option<(FaultKind, String)> {
        let limits = &self.config.safety;
        let past_grace = s.state_ticks > self.config.grace_ticks;

        if s.coil_life == 0 {
            return Some((
                FaultKind::CoilExhausted,
                "Coil Failure (Life Exceeded)".to_string(),
            ));
        }
        if s.part_temp_c > limits.part_temp_max_c {
            return Some((
                FaultKind::PartMelt,
                format!("Coil Damage (Part Melted: {:.1}°C)", s.part_temp_c),
            ));
        }
        if s.power_kw > limits.power_max_kw {
            return Some((
                FaultKind::Overcurrent,
                format!("Inverter Overcurrent ({:.1} kW)", s.power_kw),
            ));
        }

        if s.state == TelemetryState::Quench {
            if s.pressure_bar > limits.pressure_max_bar {
                return Some((
                    FaultKind::HoseBurst,
                    format!("Hose Burst (Pressure {:.1})", s.pressure_bar),
                ));
            }
            if past_grace && s.pressure_bar < limits.pressure_min_bar {
                return Some((
                    FaultKind::PressureLoss,
                    format!("Severe Pressure Drop ({:.1})", s.pressure_bar),
                ));
            }
            if past_grace && s.flow_lpm < limits.flow_min_lpm {
                return Some((
                    FaultKind::PumpFailure,
                    format!("Pump Failure (Flow {:.1})", s.flow_lpm),
                ));
            }
            if s.quench_water_temp_c > limits.quench_water_temp_max_c {
                return Some((
                    FaultKind::ScaldRisk,
                    format!("Scalding Risk (Temp {:.1})", s.quench_water_temp_c),
                ));
            }
        }

        if matches!(s.state, TelemetryState::Heating | TelemetryState::Quench)
            && past_grace
            && s.scan_speed_mm_s < limits.speed_min_mm_s
        {
            return Some((
                FaultKind::ServoOverload,
                format!("Servo Overload (Speed {:.1})", s.scan_speed_mm_s),
            ));
        }
        None
    }

    fn quality_violations(&self, s: &TelemetrySnapshot) -> Vec<String> {
        let mut reasons = Vec::new();
        if !s.state.is_quality_checked() {
            return reasons;
        }
        let q = &self.config.quality;
        let floor = &self.config.noise_floor;

        let peak = s.peak_part_temp_c;
        let band = q.part_temp_c;
        if (peak > floor.part_temp_c || s.state.is_terminal()) && !band.contains(peak) {
            reasons.push(if peak < band.min {
                format!("NG: UNDERHEATED Part ({peak:.1}°C) -> SOFTNESS")
            } else {
                format!("NG: OVERHEATED Part ({peak:.1}°C) -> BRITTLENESS")
            });
        }

        let water = s.quench_water_temp_c;
        let band = q.quench_water_temp_c;
        if !band.contains(water) {
            reasons.push(if water < band.min {
                format!("CRACKING (Water Too Cold: {water:.1}°C)")
            } else {
                format!("SOFTNESS (Water Too Hot: {water:.1}°C)")
            });
        }

        let flow = s.flow_lpm;
        let band = q.flow_lpm;
        if flow > floor.flow_lpm && !band.contains(flow) {
            reasons.push(if flow < band.min {
                format!("SOFTNESS (Low Flow: {flow:.1} lpm)")
            } else {
                format!("CRACKING (High Flow: {flow:.1} lpm)")
            });
        }

        let pressure = s.pressure_bar;
        let band = q.pressure_bar;
        if pressure > floor.pressure_bar && !band.contains(pressure) {
            reasons.push(if pressure < band.min {
                format!("SOFTNESS (Low Pressure: {pressure:.1} bar)")
            } else {
                format!("CRACKING (High Pressure: {pressure:.1} bar)")
            });
        }
        reasons
    }
}
