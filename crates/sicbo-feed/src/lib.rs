//! Round history storage for monitored feed channels.
//!
//! Holds the latest complete snapshot per channel. Snapshots are
//! immutable and shared as `Arc`, so a reader never sees a half-replaced
//! history.

pub mod error;
pub mod history;

pub use error::{FeedError, FeedResult};
pub use history::{ChannelSnapshot, RoundHistoryStore};
