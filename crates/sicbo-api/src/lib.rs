//! JSON query API over the feed client.
//!
//! Handlers only talk to the [`FeedQuery`] trait. [`FeedService`] is the
//! production implementation over the round store, the live session and
//! the predictor.
//!
//! ```text
//! GET      /api/status
//! GET      /api/channels
//! GET      /api/latest              GET /api/latest/{channel}
//! GET      /api/history/{channel}?limit=N
//! GET      /api/predict             GET /api/predict/{channel}
//! GET      /api/predict/{channel}/short
//! GET|POST /api/refresh
//! GET      /metrics
//! ```

mod config;
mod error;
mod query;
mod server;
mod service;
mod types;

pub use config::ApiConfig;
pub use error::{ApiError, QueryError, QueryResult};
pub use query::FeedQuery;
pub use server::{create_router, run_server, ApiState};
pub use service::FeedService;
pub use types::{
    ChannelHistory, ChannelPrediction, ChannelResult, ChannelStatus, ErrorBody, LatestRound,
    RefreshResponse, RoundView, ShortPrediction, StatusReport,
};
