//! Feed error types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),
}

pub type FeedResult<T> = Result<T, FeedError>;
