//! Telemetry setup for Palisade services.
//!
//! Currently structured logging only: the protection pipeline emits tracing
//! events; this crate wires them to a JSON (production) or pretty
//! (development) subscriber.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig};

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
