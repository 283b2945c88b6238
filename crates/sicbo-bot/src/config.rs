//! Application configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sicbo_api::ApiConfig;
use sicbo_core::ChannelId;
use sicbo_predict::PredictorConfig;
use sicbo_telemetry::DEFAULT_FILTER;
use sicbo_ws::{
    ConnectionConfig, Credentials, HandshakeConfig, MonitoredChannel, SubscriptionTarget,
};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Environment variable that overrides `credentials.password`.
pub const PASSWORD_ENV: &str = "SICBO_PASSWORD";

/// Login material for the feed.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub app_id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Sent verbatim as the last element of the auth frame.
    #[serde(default)]
    pub auth_details: Map<String, Value>,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("app_id", &self.app_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Monitored channel: subscribed, refreshed and stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    pub plugin: String,
    pub cmd: u32,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// Subscription sent once per connection whose data is not stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    pub plugin: String,
    pub cmd: u32,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl From<&SubscriptionConfig> for SubscriptionTarget {
    fn from(cfg: &SubscriptionConfig) -> Self {
        Self {
            plugin: cfg.plugin.clone(),
            cmd: cfg.cmd,
            params: cfg.params.clone(),
        }
    }
}

/// WebSocket timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Reconnects allowed before the session fails.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Linear backoff step (ms); attempt `n` waits `n` steps.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Wait after auth success before the first subscription (ms).
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_subscribe_stagger_ms")]
    pub subscribe_stagger_ms: u64,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default = "default_refresh_stagger_ms")]
    pub refresh_stagger_ms: u64,
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_base_delay_ms() -> u64 {
    5000
}

fn default_heartbeat_interval_ms() -> u64 {
    25000
}

fn default_settle_delay_ms() -> u64 {
    2000
}

fn default_subscribe_stagger_ms() -> u64 {
    1000
}

fn default_refresh_interval_ms() -> u64 {
    30000
}

fn default_refresh_stagger_ms() -> u64 {
    1000
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            subscribe_stagger_ms: default_subscribe_stagger_ms(),
            refresh_interval_ms: default_refresh_interval_ms(),
            refresh_stagger_ms: default_refresh_stagger_ms(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    DEFAULT_FILTER.to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Feed WebSocket URL.
    pub ws_url: String,
    /// Extra handshake headers (Origin, User-Agent, ...).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub credentials: CredentialsConfig,
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub extra_subscriptions: Vec<SubscriptionConfig>,
    #[serde(default)]
    pub websocket: WsConfig,
    #[serde(default)]
    pub predictor: PredictorConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load from a file, apply environment overrides and validate.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;

        let config = Self::parse(&content)?
            .with_password_override(std::env::var(PASSWORD_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML without validation.
    pub fn parse(content: &str) -> AppResult<Self> {
        toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Replace the password when `password` is set and non-empty.
    pub fn with_password_override(mut self, password: Option<String>) -> Self {
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            self.credentials.password = password;
        }
        self
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.ws_url.trim().is_empty() {
            return Err(AppError::Config("ws_url must not be empty".to_string()));
        }
        if self.channels.is_empty() {
            return Err(AppError::Config(
                "at least one [[channels]] entry is required".to_string(),
            ));
        }

        let mut names = HashSet::new();
        let mut cmds = HashSet::new();
        for channel in &self.channels {
            ChannelId::new(channel.name.as_str())?;
            if !names.insert(channel.name.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate channel name: {}",
                    channel.name
                )));
            }
            if !cmds.insert(channel.cmd) {
                return Err(AppError::Config(format!(
                    "duplicate channel cmd {} ({})",
                    channel.cmd, channel.name
                )));
            }
        }

        self.predictor.validate().map_err(AppError::Config)?;
        Ok(())
    }

    pub fn channel_ids(&self) -> AppResult<Vec<ChannelId>> {
        self.channels
            .iter()
            .map(|c| ChannelId::new(c.name.as_str()).map_err(AppError::from))
            .collect()
    }

    /// Session configuration for the connection manager.
    pub fn connection_config(&self) -> AppResult<ConnectionConfig> {
        let channels = self
            .channels
            .iter()
            .map(|c| -> AppResult<MonitoredChannel> {
                Ok(MonitoredChannel {
                    id: ChannelId::new(c.name.as_str())?,
                    target: SubscriptionTarget {
                        plugin: c.plugin.clone(),
                        cmd: c.cmd,
                        params: c.params.clone(),
                    },
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        let ws = &self.websocket;
        Ok(ConnectionConfig {
            url: self.ws_url.clone(),
            headers: self
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            max_reconnect_attempts: ws.max_reconnect_attempts,
            reconnect_base_delay_ms: ws.reconnect_base_delay_ms,
            heartbeat_interval_ms: ws.heartbeat_interval_ms,
            handshake: HandshakeConfig {
                credentials: Credentials {
                    app_id: self.credentials.app_id.clone(),
                    username: self.credentials.username.clone(),
                    password: self.credentials.password.clone(),
                    auth_details: Value::Object(self.credentials.auth_details.clone()),
                },
                channels,
                extra_subscriptions: self.extra_subscriptions.iter().map(Into::into).collect(),
                settle_delay_ms: ws.settle_delay_ms,
                subscribe_stagger_ms: ws.subscribe_stagger_ms,
                refresh_interval_ms: ws.refresh_interval_ms,
                refresh_stagger_ms: ws.refresh_stagger_ms,
            },
        })
    }
}
