//! Core domain types for the sic bo feed client.
//!
//! This crate provides fundamental types shared by every other crate:
//! - `Round`: one resolved game round (sequence number + three faces)
//! - `Outcome`: the high/low classification of a round total
//! - `ChannelId`: identifier of one monitored feed table

pub mod channel;
pub mod error;
pub mod round;

pub use channel::ChannelId;
pub use error::{CoreError, Result};
pub use round::{Outcome, Round, HIGH_THRESHOLD, MAX_FACE, MIN_FACE};
