pub mod telemetry;

pub use telemetry::{init_tracing, track_event, usage_counters, TelemetryInitError};
