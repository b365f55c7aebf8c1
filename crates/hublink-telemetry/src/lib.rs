//! Prometheus metrics and structured logging for hublink.
//!
//! - `init_logging`: tracing subscriber, pretty in development, JSON in
//!   production
//! - `Metrics`: process-wide connection counters

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
