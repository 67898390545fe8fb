//! Error types for the twin.
//!
//! Safety faults and quality defects are process outcomes
//! ([`crate::rules::FaultOutcome`]), not errors. Errors here cover
//! configuration, control-surface misuse and telemetry persistence.

use hardening_common::config::ConfigError;
use thiserror::Error;

/// Errors raised by the controller, bridge and tick runner.
#[derive(Debug, Error)]
pub enum TwinError {
    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// `inject_fault` called with a name no drift parameter answers to.
    #[error("Unknown fault kind: {0}")]
    UnknownFaultKind(String),

    /// Manual ceiling or flow target out of range.
    #[error("Invalid manual limits: {0}")]
    InvalidManualLimits(String),

    /// Bridge `start` called outside a tokio runtime.
    #[error("Telemetry bridge requires a running tokio runtime")]
    NoRuntime,

    /// Bridge `start` called twice.
    #[error("Telemetry bridge already started")]
    BridgeAlreadyStarted,

    /// Bridge `stop` or `flush` called before `start`.
    #[error("Telemetry bridge not started")]
    BridgeNotStarted,

    /// The bridge consumer task ended abnormally.
    #[error("Telemetry consumer failed: {0}")]
    ConsumerFailed(String),

    /// The tick thread is gone; control commands can no longer be applied.
    #[error("Tick runner is not running")]
    RunnerStopped,

    /// The tick thread could not be spawned or joined.
    #[error("Tick runner thread error: {0}")]
    RunnerThread(String),
}

/// Errors returned by a telemetry sink for a single record.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The sink refused the record.
    #[error("Record rejected: {0}")]
    Rejected(String),
}
