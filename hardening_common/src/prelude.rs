//! Common re-exports.
//!
//! ```rust
//! use hardening_common::prelude::*;
//! ```

use std::time::Duration;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig, TwinConfig};

// ─── Rule limits ────────────────────────────────────────────────────
pub use crate::limits::{QualityBand, RuleConfig, SafetyLimits};

// ─── Telemetry ──────────────────────────────────────────────────────
pub use crate::telemetry::{
    Downtime, EventLogEntry, EventStatus, FaultCode, MachineStatus, ProcessState, Shift,
    TelemetrySnapshot, TelemetryState,
};

/// Default live tick period as Duration.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(crate::consts::TICK_PERIOD_MS);
