//! # Induction-Hardening Twin
//!
//! Tick-driven simulation of one induction-hardening station. Each tick
//! advances simulated time, applies any injected drift to the process
//! readings, steps a first-order thermal model and evaluates the safety and
//! quality rules. Finished records (one per part, one per breakdown) are
//! handed to an asynchronous telemetry bridge for persistence.
//!
//! ## Layers
//!
//! 1. [`physics`] and [`clock`]: thermal model and simulated time
//! 2. [`rules`] and [`drift`]: verdicts and fault injection
//! 3. [`machine`]: the process state machine and control surface
//! 4. [`runner`]: paced tick thread with a thread-safe control handle
//! 5. [`bridge`] and [`sink`]: bounded hand-off and durable storage
//!
//! The tick path never blocks on persistence: a full bridge queue drops
//! the record with a warning.

pub mod bridge;
pub mod clock;
pub mod drift;
pub mod error;
pub mod machine;
pub mod physics;
pub mod rules;
pub mod runner;
pub mod sink;

pub use error::{SinkError, TwinError};
pub use machine::MachineController;
