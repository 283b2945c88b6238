//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] sicbo_ws::WsError),

    #[error("Feed error: {0}")]
    Feed(#[from] sicbo_feed::FeedError),

    #[error("Invalid value: {0}")]
    Core(#[from] sicbo_core::CoreError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] sicbo_telemetry::TelemetryError),

    #[error("API error: {0}")]
    Api(#[from] sicbo_api::ApiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
