//! Logging setup shared by the chat widget binaries.

mod config;
mod tracing_init;

pub use config::TelemetryConfig;
pub use tracing_init::{init_telemetry, telemetry_initialized};

