//! Prometheus metrics and structured logging for the sic bo feed client.
//!
//! - Prometheus metrics for session state, feed traffic and predictions
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, DEFAULT_FILTER};
pub use metrics::Metrics;
