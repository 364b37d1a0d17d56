//! Flow Client - headless client core of the Flow campus network
//!
//! - REST access to profiles, feed, friends, messages and the market
//! - JWT session with a single refresh timer
//! - Peer-to-peer call rooms over WebRTC, signalled through a WebSocket relay

pub mod api;
pub mod auth;
pub mod call;
pub mod config;
pub mod database;
pub mod media;
pub mod peer;
pub mod signaling;

use api::{ApiClient, ApiError, Room};
use auth::{AuthError, AuthSession, SignedInUser, TokenStore};
use call::{CallConfig, CallSession};
use config::ClientConfig;
use database::{DatabaseError, TokenDatabase};
use media::{MediaDevices, SampleMediaDevices};
use peer::{PeerConnector, WebRtcConnector};
use std::sync::Arc;
use thiserror::Error;

pub use call::{CallError, CallEvent, CallHandle, CallStatus};

// ============================================================================
// LOGGING
// ============================================================================

/// Installs the fmt subscriber; `RUST_LOG` directives win over the defaults.
/// Safe to call more than once.
pub fn init_tracing() {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in ["flow_client=debug", "webrtc=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

// ============================================================================
// FLOW CLIENT
// ============================================================================

/// Composition root: config, HTTP client, auth session and API client
pub struct FlowClient {
    config: ClientConfig,
    auth: Arc<AuthSession>,
    api: ApiClient,
}

impl FlowClient {
    /// Client whose tokens persist in the SQLite store under `config.data_dir`
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let store = TokenDatabase::open(config.data_dir.as_deref())?;
        Self::with_store(config, Arc::new(store))
    }

    pub fn with_store(config: ClientConfig, store: Arc<dyn TokenStore>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        let auth = AuthSession::new(&config, http.clone(), store);
        let api = ApiClient::new(&config, http, Arc::clone(&auth));

        tracing::info!("Flow client ready for {}", config.api_url);
        Ok(Self { config, auth, api })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn auth(&self) -> &Arc<AuthSession> {
        &self.auth
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SignedInUser, AuthError> {
        self.auth.sign_in(email, password).await
    }

    /// Resumes a session stored by an earlier run
    pub fn restore_session(&self) -> Result<bool, AuthError> {
        self.auth.restore()
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.auth.sign_out().await
    }

    pub async fn create_room(&self) -> Result<Room, ApiError> {
        self.api.create_room().await
    }

    pub async fn join_room(&self, room_name: &str) -> Result<Room, ApiError> {
        self.api.join_room(room_name).await
    }

    /// Call session on webrtc-rs with application-fed sample tracks
    pub fn new_call_session(&self) -> CallSession {
        self.call_session_with(Arc::new(SampleMediaDevices::new()), Arc::new(WebRtcConnector::new()))
    }

    pub fn call_session_with(
        &self,
        devices: Arc<dyn MediaDevices>,
        connector: Arc<dyn PeerConnector>,
    ) -> CallSession {
        let config = CallConfig::new(self.config.clone(), Some(Arc::clone(&self.auth)));
        CallSession::new(config, devices, connector)
    }
}

impl std::fmt::Debug for FlowClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowClient")
            .field("api_url", &self.config.api_url.as_str())
            .field("auth", &self.auth)
            .finish()
    }
}
