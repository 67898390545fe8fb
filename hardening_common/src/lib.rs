//! Shared library for the induction-hardening twin.
//!
//! # Module Structure
//!
//! - [`telemetry`] - Process states, telemetry snapshots and the event log
//! - [`limits`] - Quality bands, safety limits and repair ranges
//! - [`config`] - Configuration loading traits and twin sections
//! - [`consts`] - Line-wide constants
//! - [`prelude`] - Common re-exports for convenience

pub mod config;
pub mod consts;
pub mod limits;
pub mod prelude;
pub mod telemetry;
