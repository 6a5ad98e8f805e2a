//! Client configuration
//!
//! Configuration can be built in code, loaded from a TOML file, or read from
//! environment variables (a `.env` file is honoured). Everything is supplied
//! by the caller; no endpoint or key is hard-coded here.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{ClientError, Result};

/// Nominal interval between server pings
pub const NOMINAL_PING_INTERVAL_MS: u64 = 30_000;

/// Network slack added on top of the nominal ping interval
pub const PING_SLACK_MS: u64 = 2_000;

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the relay server (http or https)
    pub server_url: String,

    /// Optional API key, sent as a bearer token on HTTP and WebSocket
    #[serde(default)]
    pub api_key: Option<String>,

    /// WebSocket tuning
    #[serde(default)]
    pub websocket: WsConfig,

    /// HTTP request timeout in milliseconds
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WsConfig {
    /// How long a correlated request waits for its response
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Maximum silence between server pings before the channel is closed
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout_ms(),
            ping_interval_ms: default_ping_interval_ms(),
        }
    }
}

// Default value functions
fn default_response_timeout_ms() -> u64 { 10_000 }
fn default_ping_interval_ms() -> u64 { NOMINAL_PING_INTERVAL_MS + PING_SLACK_MS }
fn default_http_timeout_ms() -> u64 { 30_000 }

fn env_millis(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|e| ClientError::Configuration(format!("{name}={value:?}: {e}"))),
        Err(_) => Ok(None),
    }
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            api_key: None,
            websocket: WsConfig::default(),
            http_timeout_ms: default_http_timeout_ms(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_websocket(mut self, websocket: WsConfig) -> Self {
        self.websocket = websocket;
        self
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Configuration(format!("cannot read {path}: {e}")))?;
        let config: ClientConfig = toml::from_str(&content)
            .map_err(|e| ClientError::Configuration(format!("invalid TOML in {path}: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `RELAY_*` environment variables
    ///
    /// `RELAY_SERVER_URL` is required; `RELAY_API_KEY`,
    /// `RELAY_WS_RESPONSE_TIMEOUT_MS` and `RELAY_WS_PING_INTERVAL_MS` are
    /// optional.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let server_url = std::env::var("RELAY_SERVER_URL")
            .map_err(|_| ClientError::Configuration("RELAY_SERVER_URL is not set".to_string()))?;
        let mut config = Self::new(server_url);
        config.api_key = std::env::var("RELAY_API_KEY").ok().filter(|key| !key.is_empty());
        if let Some(value) = env_millis("RELAY_WS_RESPONSE_TIMEOUT_MS")? {
            config.websocket.response_timeout_ms = value;
        }
        if let Some(value) = env_millis("RELAY_WS_PING_INTERVAL_MS")? {
            config.websocket.ping_interval_ms = value;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.server_url)
            .map_err(|e| ClientError::Configuration(format!("invalid server_url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::Configuration(format!(
                "server_url must be http or https, got {}",
                url.scheme()
            )));
        }
        if self.websocket.response_timeout_ms == 0 {
            return Err(ClientError::Configuration(
                "websocket.response_timeout_ms must be positive".to_string(),
            ));
        }
        if self.websocket.ping_interval_ms == 0 {
            return Err(ClientError::Configuration(
                "websocket.ping_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URL without a trailing slash
    pub fn http_base(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }

    /// WebSocket endpoint: `{base}/v1/ws` with http→ws and https→wss
    pub fn ws_url(&self) -> Result<String> {
        let base = self.http_base();
        let upgraded = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(ClientError::Configuration(format!(
                "cannot derive websocket url from {base}"
            )));
        };
        Ok(format!("{upgraded}/v1/ws"))
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.websocket.response_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.websocket.ping_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}
