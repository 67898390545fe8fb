mod common;
mod config_loading;
mod fault_injection;
mod production_cycle;
mod properties;
mod telemetry_pipeline;
