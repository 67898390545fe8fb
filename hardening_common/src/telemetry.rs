//! Process states and telemetry records shared by the simulation core,
//! the telemetry bridge and any control surface.
//!
//! Optional fields carry their validity condition in the type:
//! - [`TelemetrySnapshot::downtime`] is present only while the machine is DOWN
//!   (live view) or on a record emitted by a breakdown.
//! - [`TelemetrySnapshot::ng_reason`] is present only on the record of the
//!   part that failed quality rules.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the hardening machine.
///
/// `Loading` and `Unloading` are transient: the controller resolves them
/// within the tick they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessState {
    /// Powered, no part in process.
    #[default]
    Idle,
    /// Part being placed in the coil.
    Loading,
    /// Induction heating up to the hardening target.
    Heating,
    /// Water quench down to unload temperature.
    Quench,
    /// Finished part leaving the coil; cycle accounting happens here.
    Unloading,
    /// Safety halt, cleared only by an explicit repair.
    Down,
}

impl ProcessState {
    /// HEATING or QUENCH: the states with energy flowing into or out of the part.
    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Heating | Self::Quench)
    }

    /// Whether the line is producing (the tick loop advances the machine).
    #[inline]
    pub const fn is_producing(&self) -> bool {
        !matches!(self, Self::Idle | Self::Down)
    }

    /// Upper-case state name as shown on the line HMI.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Loading => "LOADING",
            Self::Heating => "HEATING",
            Self::Quench => "QUENCH",
            Self::Unloading => "UNLOADING",
            Self::Down => "DOWN",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State tag carried by a telemetry snapshot.
///
/// Mirrors [`ProcessState`] and adds `Completed`, which only end-of-cycle
/// records carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TelemetryState {
    Idle,
    Loading,
    Heating,
    Quench,
    Unloading,
    Down,
    Completed,
}

impl TelemetryState {
    /// States in which quality rules are evaluated.
    #[inline]
    pub const fn is_quality_checked(&self) -> bool {
        matches!(
            self,
            Self::Heating | Self::Quench | Self::Unloading | Self::Completed
        )
    }

    /// The part has left processing; cold-part checks always apply.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Unloading | Self::Completed)
    }
}

impl From<ProcessState> for TelemetryState {
    fn from(state: ProcessState) -> Self {
        match state {
            ProcessState::Idle => Self::Idle,
            ProcessState::Loading => Self::Loading,
            ProcessState::Heating => Self::Heating,
            ProcessState::Quench => Self::Quench,
            ProcessState::Unloading => Self::Unloading,
            ProcessState::Down => Self::Down,
        }
    }
}

/// Twelve-hour operating window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shift {
    /// 08:00 to 20:00.
    #[serde(rename = "Shift A")]
    A,
    /// 20:00 to 08:00.
    #[serde(rename = "Shift B")]
    B,
}

impl Shift {
    /// Shift covering the given hour of day (0-23).
    #[inline]
    pub const fn from_hour(hour: u32) -> Self {
        if hour >= 8 && hour < 20 { Self::A } else { Self::B }
    }

    /// Operator on duty for the shift.
    #[inline]
    pub const fn operator_id(&self) -> &'static str {
        match self {
            Self::A => "OP_A",
            Self::B => "OP_B",
        }
    }
}

/// Downtime classification reported with a DOWN verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultCode {
    /// Breakdown: hardware damage implied.
    #[serde(rename = "BD")]
    Breakdown,
    /// Machine stop: recoverable stall.
    #[serde(rename = "MS")]
    MachineStop,
    /// Quality stop after repeated NG parts.
    #[serde(rename = "QL")]
    QualityStop,
}

impl FaultCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Breakdown => "BD",
            Self::MachineStop => "MS",
            Self::QualityStop => "QL",
        }
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the machine is down and how long the repair is expected to take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Downtime {
    pub code: FaultCode,
    pub reason: String,
    /// Advisory repair duration [ticks]. Recovery itself is manual.
    pub repair_ticks: u32,
}

/// One reading of the machine: live view each tick, or a finished-part record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Simulated instant of the reading.
    pub timestamp: NaiveDateTime,
    /// Simulated clock as displayed (`Day N, HH:MM:SS`).
    pub sim_clock: String,
    pub state: TelemetryState,
    /// Ticks spent in the current state.
    pub state_ticks: u32,
    /// Induction power [kW].
    pub power_kw: f64,
    /// Quench flow [lpm].
    pub flow_lpm: f64,
    /// Quench pressure [bar].
    pub pressure_bar: f64,
    /// Coil scan speed [mm/s].
    pub scan_speed_mm_s: f64,
    /// Tempering speed [mm/s].
    pub tempering_speed_mm_s: f64,
    /// Quench-water temperature [°C].
    pub quench_water_temp_c: f64,
    /// Current part temperature [°C].
    pub part_temp_c: f64,
    /// Highest part temperature reached while heating [°C].
    pub peak_part_temp_c: f64,
    /// Remaining coil life [cycles].
    pub coil_life: u32,
    pub shift: Shift,
    pub operator_id: String,
    /// Part in the coil; absent while no part is loaded.
    pub part_id: Option<String>,
    pub ok_count: u64,
    pub ng_count: u64,
    /// Present only while DOWN or on a breakdown record.
    pub downtime: Option<Downtime>,
    /// Present only on the record of an NG part.
    pub ng_reason: Option<String>,
}

impl TelemetrySnapshot {
    /// Record describes an NG part or a breakdown.
    #[inline]
    pub fn is_anomaly(&self) -> bool {
        self.downtime.is_some() || self.ng_reason.is_some()
    }

    pub fn downtime_reason(&self) -> Option<&str> {
        self.downtime.as_ref().map(|d| d.reason.as_str())
    }

    /// Advisory repair time, zero unless the record carries downtime.
    pub fn repair_ticks(&self) -> u32 {
        self.downtime.as_ref().map_or(0, |d| d.repair_ticks)
    }
}

/// Outcome class of a logged event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    #[serde(rename = "NG")]
    Ng,
    #[serde(rename = "DOWN")]
    Down,
}

/// Entry of the live event log (last NG/DOWN events).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Simulated clock when the event happened.
    pub time: String,
    pub part_id: Option<String>,
    pub status: EventStatus,
    pub reason: String,
}

/// Answer to a status query from the control surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineStatus {
    pub state: ProcessState,
    pub telemetry: TelemetrySnapshot,
    /// Oldest first, at most [`crate::consts::EVENT_LOG_CAPACITY`] entries.
    pub event_log: Vec<EventLogEntry>,
}
