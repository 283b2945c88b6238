//! Error types for sicbo-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid die face {face} in round {sid} (expected 1-6)")]
    InvalidFace { sid: u64, face: u8 },

    #[error("Invalid channel id: {0}")]
    InvalidChannel(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
