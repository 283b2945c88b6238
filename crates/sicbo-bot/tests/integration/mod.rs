//! Integration tests for sicbo-bot.
//!
//! These tests run the feed session against a mock server:
//! - Auth and staggered subscription handshake
//! - Snapshot delivery into the round store
//! - Heartbeat, refresh and reconnect behavior

pub mod common;
