//! Sic bo feed client.
//!
//! Main application that wires the components together:
//! - WebSocket session to the feed (auth, subscriptions, heartbeat, reconnect)
//! - Per-channel round history
//! - On-demand ensemble forecasts
//! - JSON query API and Prometheus metrics

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
