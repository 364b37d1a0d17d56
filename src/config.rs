//! Client Configuration
//!
//! Resolves the REST base URL, the WebSocket base used for call rooms,
//! the STUN server and the auth timers from the environment.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

// ============================================================================
// DEFAULTS
// ============================================================================

/// Backend used by local development setups
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Public STUN server used by every peer connection
pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// Proactive access-token refresh period (25 minutes)
pub const DEFAULT_TOKEN_REFRESH: Duration = Duration::from_secs(25 * 60);

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL in {var}: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("Unsupported URL scheme '{0}' (expected http, https, ws or wss)")]
    UnsupportedScheme(String),

    #[error("Invalid number in {var}: {value}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("Invalid room name: {0:?}")]
    InvalidRoomName(String),
}

// ============================================================================
// CLIENT CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST backend
    pub api_url: Url,
    /// Base URL of the call relay (ws:// or wss://)
    pub ws_url: Url,
    pub stun_url: String,
    pub token_refresh_interval: Duration,
    pub http_timeout: Duration,
    /// Where the token database lives; platform data dir when unset
    pub data_dir: Option<PathBuf>,
}

impl ClientConfig {
    /// Config pointing at `api_url`, with the WebSocket base derived from it
    pub fn new(api_url: &str) -> Result<Self, ConfigError> {
        let api_url = parse_base_url("FLOW_API_URL", api_url)?;
        let ws_url = websocket_base(&api_url)?;

        Ok(Self {
            api_url,
            ws_url,
            stun_url: DEFAULT_STUN_URL.to_string(),
            token_refresh_interval: DEFAULT_TOKEN_REFRESH,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            data_dir: None,
        })
    }

    /// Reads `FLOW_API_URL`, `FLOW_WS_URL`, `FLOW_STUN_URL`,
    /// `FLOW_TOKEN_REFRESH_SECS`, `FLOW_HTTP_TIMEOUT_SECS` and `FLOW_DATA_DIR`
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = std::env::var("FLOW_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        let mut config = Self::new(&api_url)?;

        if let Ok(ws) = std::env::var("FLOW_WS_URL") {
            config = config.with_ws_url(&ws)?;
        }
        if let Ok(stun) = std::env::var("FLOW_STUN_URL") {
            config.stun_url = stun;
        }
        if let Some(secs) = read_secs("FLOW_TOKEN_REFRESH_SECS")? {
            config.token_refresh_interval = secs;
        }
        if let Some(secs) = read_secs("FLOW_HTTP_TIMEOUT_SECS")? {
            config.http_timeout = secs;
        }
        if let Ok(dir) = std::env::var("FLOW_DATA_DIR") {
            config.data_dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    /// Points at another backend; the WebSocket base is derived again
    pub fn with_api_url(mut self, api_url: &str) -> Result<Self, ConfigError> {
        self.api_url = parse_base_url("FLOW_API_URL", api_url)?;
        self.ws_url = websocket_base(&self.api_url)?;
        Ok(self)
    }

    /// Overrides the WebSocket base; http(s) URLs are converted to ws(s)
    pub fn with_ws_url(mut self, ws_url: &str) -> Result<Self, ConfigError> {
        let parsed = parse_base_url("FLOW_WS_URL", ws_url)?;
        self.ws_url = websocket_base(&parsed)?;
        Ok(self)
    }

    pub fn with_stun_url(mut self, stun_url: impl Into<String>) -> Self {
        self.stun_url = stun_url.into();
        self
    }

    pub fn with_token_refresh_interval(mut self, interval: Duration) -> Self {
        self.token_refresh_interval = interval;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// `ws(s)://<host>/ws/call/{room}/?token={jwt}`
    pub fn room_url(&self, room_name: &str, token: Option<&str>) -> Result<Url, ConfigError> {
        if room_name.trim().is_empty() {
            return Err(ConfigError::InvalidRoomName(room_name.to_string()));
        }

        let mut url = self.ws_url.clone();
        url.path_segments_mut()
            .map_err(|_| ConfigError::UnsupportedScheme(self.ws_url.scheme().to_string()))?
            .pop_if_empty()
            .extend(["ws", "call", room_name, ""]);

        if let Some(token) = token {
            url.query_pairs_mut().append_pair("token", token);
        }

        Ok(url)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Parses a base URL and guarantees a trailing slash so `join` keeps the path
fn parse_base_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { var, source })?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn websocket_base(url: &Url) -> Result<Url, ConfigError> {
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    };

    // Url::set_scheme refuses special→special swaps like http→ws, so rebuild
    let rebuilt = format!("{}{}", scheme, &url[url::Position::AfterScheme..]);
    let mut ws = Url::parse(&rebuilt).map_err(|source| ConfigError::InvalidUrl {
        var: "FLOW_WS_URL",
        source,
    })?;
    ws.set_query(None);
    Ok(ws)
}

fn read_secs(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        Err(_) => Ok(None),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_derived_from_api_url() {
        let config = ClientConfig::new("http://127.0.0.1:8000").unwrap();
        assert_eq!(config.ws_url.as_str(), "ws://127.0.0.1:8000/");

        let config = ClientConfig::new("https://flow.example.edu/api").unwrap();
        assert_eq!(config.api_url.as_str(), "https://flow.example.edu/api/");
        assert_eq!(config.ws_url.as_str(), "wss://flow.example.edu/api/");
    }

    #[test]
    fn test_room_url_carries_room_and_token() {
        let config = ClientConfig::new("https://flow.example.edu").unwrap();
        let url = config.room_url("room-42", Some("abc.def.ghi")).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://flow.example.edu/ws/call/room-42/?token=abc.def.ghi"
        );
    }

    #[test]
    fn test_room_url_escapes_room_name() {
        let config = ClientConfig::new("http://localhost:8000").unwrap();
        let url = config.room_url("study group/1", None).unwrap();
        assert_eq!(url.path(), "/ws/call/study%20group%2F1/");
        assert!(url.query().is_none());
    }

    #[test]
    fn test_room_url_rejects_blank_room() {
        let config = ClientConfig::new("http://localhost:8000").unwrap();
        assert!(matches!(
            config.room_url("   ", None),
            Err(ConfigError::InvalidRoomName(_))
        ));
    }

    #[test]
    fn test_explicit_ws_url_override() {
        let config = ClientConfig::new("http://localhost:8000")
            .unwrap()
            .with_ws_url("https://relay.example.edu")
            .unwrap();
        assert_eq!(config.ws_url.as_str(), "wss://relay.example.edu/");
    }

    #[test]
    fn test_rejects_unknown_scheme() {
        assert!(matches!(
            ClientConfig::new("ftp://example.edu"),
            Err(ConfigError::UnsupportedScheme(_))
        ));
    }
}
