//! API server configuration.

use serde::{Deserialize, Serialize};

/// HTTP query API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable the HTTP server.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Address to bind.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Rounds returned by `/api/history` without `limit`.
    #[serde(default = "default_history_limit")]
    pub default_history_limit: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3004
}

fn default_history_limit() -> usize {
    20
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
            default_history_limit: default_history_limit(),
        }
    }
}

impl ApiConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}
