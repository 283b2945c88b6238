//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use sicbo_feed::FeedError;
use sicbo_ws::RefreshError;
use thiserror::Error;

use crate::types::ErrorBody;

/// Query failures, each mapped onto an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("No data received yet for channel {0}")]
    NoData(String),

    #[error("Session not ready: not authenticated or socket closed")]
    NotReady,

    #[error("Session failed: reconnect budget exhausted")]
    SessionFailed,

    #[error("Session task unavailable")]
    Unavailable,
}

pub type QueryResult<T> = Result<T, QueryError>;

impl QueryError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ChannelNotFound(_) => "channel_not_found",
            Self::NoData(_) => "no_data",
            Self::NotReady => "not_ready",
            Self::SessionFailed => "session_failed",
            Self::Unavailable => "unavailable",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::ChannelNotFound(_) | Self::NoData(_) => StatusCode::NOT_FOUND,
            Self::NotReady => StatusCode::BAD_REQUEST,
            Self::SessionFailed | Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<FeedError> for QueryError {
    fn from(e: FeedError) -> Self {
        match e {
            FeedError::ChannelNotFound(channel) => Self::ChannelNotFound(channel),
        }
    }
}

impl From<RefreshError> for QueryError {
    fn from(e: RefreshError) -> Self {
        match e {
            RefreshError::NotReady => Self::NotReady,
            RefreshError::SessionFailed => Self::SessionFailed,
            RefreshError::ChannelClosed => Self::Unavailable,
        }
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

/// Server startup and runtime failures.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            QueryError::ChannelNotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(QueryError::NoData("tx".into()).code(), "no_data");
        assert_eq!(QueryError::NotReady.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            QueryError::SessionFailed.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_from_refresh_error() {
        assert_eq!(
            QueryError::from(RefreshError::ChannelClosed),
            QueryError::Unavailable
        );
        assert_eq!(
            QueryError::from(FeedError::ChannelNotFound("md5".into())),
            QueryError::ChannelNotFound("md5".into())
        );
    }
}
