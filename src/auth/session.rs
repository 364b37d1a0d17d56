//! Auth Session
//!
//! One object per client owns the JWT pair and the single background task
//! that refreshes the access token every 25 minutes. Sign-in starts the task,
//! sign-out stops it. `access_token()` additionally refreshes lazily when the
//! stored token has already expired.

use super::store::{TokenPair, TokenStore};
use super::token;
use crate::config::ClientConfig;
use crate::database::DatabaseError;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use url::Url;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Session expired, please sign in again")]
    SessionExpired,

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Token storage failed: {0}")]
    Store(#[from] DatabaseError),

    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(alias = "token", alias = "access_token")]
    access: String,
    #[serde(alias = "refresh_token")]
    refresh: String,
    #[serde(default)]
    user_id: Option<serde_json::Value>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct RefreshResponse {
    #[serde(alias = "token", alias = "access_token")]
    access: String,
    /// Present when the backend rotates refresh tokens
    #[serde(default)]
    refresh: Option<String>,
}

/// Identity returned by a successful sign-in
#[derive(Debug, Clone, PartialEq)]
pub struct SignedInUser {
    pub user_id: Option<serde_json::Value>,
    pub email: Option<String>,
}

// ============================================================================
// AUTH SESSION
// ============================================================================

pub struct AuthSession {
    http: reqwest::Client,
    api_url: Url,
    store: Arc<dyn TokenStore>,
    refresh_interval: Duration,
    refresher: Mutex<Option<JoinHandle<()>>>,
    /// Serializes refreshes so concurrent callers share one round-trip
    refresh_gate: tokio::sync::Mutex<()>,
}

impl AuthSession {
    pub fn new(config: &ClientConfig, http: reqwest::Client, store: Arc<dyn TokenStore>) -> Arc<Self> {
        Arc::new(Self {
            http,
            api_url: config.api_url.clone(),
            store,
            refresh_interval: config.token_refresh_interval,
            refresher: Mutex::new(None),
            refresh_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// True if a token pair is stored
    pub fn is_signed_in(&self) -> bool {
        matches!(self.store.load(), Ok(Some(_)))
    }

    /// True while the periodic refresh task is alive
    pub fn is_running(&self) -> bool {
        self.refresher
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// `POST /login/` and start the refresh timer
    pub async fn sign_in(self: &Arc<Self>, email: &str, password: &str) -> Result<SignedInUser, AuthError> {
        tracing::info!("Signing in as {}", email);

        let response = self
            .http
            .post(self.api_url.join("login/")?)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::BAD_REQUEST {
            tracing::warn!("Sign-in rejected with {}", status);
            return Err(AuthError::InvalidCredentials);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let login: LoginResponse = response.json().await?;
        self.store.save(&TokenPair {
            access: login.access,
            refresh: login.refresh,
        })?;

        self.start();
        tracing::info!("Signed in (user_id: {:?})", login.user_id);

        Ok(SignedInUser {
            user_id: login.user_id,
            email: login.email.or_else(|| Some(email.to_string())),
        })
    }

    /// Resumes a stored session if its refresh token is still valid
    ///
    /// Mirrors the landing-page check of the web client: a dead refresh token
    /// clears the store so the user lands on the login screen.
    pub fn restore(self: &Arc<Self>) -> Result<bool, AuthError> {
        let Some(tokens) = self.store.load()? else {
            return Ok(false);
        };

        if token::is_expired(&tokens.refresh) {
            tracing::info!("Stored refresh token expired, clearing session");
            self.store.clear()?;
            return Ok(false);
        }

        self.start();
        Ok(true)
    }

    /// `POST /login/logout/`, then forget the tokens and stop the timer
    ///
    /// Local state is cleared even if the server call fails.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.stop();

        let Some(tokens) = self.store.load()? else {
            return Ok(());
        };

        let result = self
            .http
            .post(self.api_url.join("login/logout/")?)
            .bearer_auth(&tokens.access)
            .json(&serde_json::json!({ "refresh": tokens.refresh }))
            .send()
            .await;

        self.store.clear()?;

        let response = result?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Logout returned {}: {}", status, body);
            return Err(AuthError::Status { status, body });
        }

        tracing::info!("Signed out");
        Ok(())
    }

    /// Current access token, refreshed first if it has expired
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let tokens = self.store.load()?.ok_or(AuthError::NotSignedIn)?;
        if !token::is_expired(&tokens.access) {
            return Ok(tokens.access);
        }

        let _gate = self.refresh_gate.lock().await;
        // Another caller may have refreshed while we waited
        let tokens = self.store.load()?.ok_or(AuthError::NotSignedIn)?;
        if !token::is_expired(&tokens.access) {
            return Ok(tokens.access);
        }

        tracing::info!("Access token expired, refreshing");
        self.refresh_locked(tokens).await
    }

    /// `POST /token/generate-access-token/` unconditionally
    pub async fn refresh(&self) -> Result<String, AuthError> {
        let _gate = self.refresh_gate.lock().await;
        let tokens = self.store.load()?.ok_or(AuthError::NotSignedIn)?;
        self.refresh_locked(tokens).await
    }

    async fn refresh_locked(&self, tokens: TokenPair) -> Result<String, AuthError> {
        let response = self
            .http
            .post(self.api_url.join("token/generate-access-token/")?)
            .json(&serde_json::json!({ "refresh": tokens.refresh }))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            tracing::warn!("Refresh token rejected ({}), clearing session", status);
            self.store.clear()?;
            return Err(AuthError::SessionExpired);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let refreshed: RefreshResponse = response.json().await?;
        self.store.save(&TokenPair {
            access: refreshed.access.clone(),
            refresh: refreshed.refresh.unwrap_or(tokens.refresh),
        })?;

        tracing::debug!("Access token refreshed");
        Ok(refreshed.access)
    }

    /// Starts the periodic refresh task; returns false if it already runs
    pub fn start(self: &Arc<Self>) -> bool {
        let mut refresher = self.refresher.lock();
        if refresher.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.refresh_interval;

        *refresher = Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            loop {
                interval.tick().await;

                let Some(session) = weak.upgrade() else {
                    break;
                };

                match session.refresh().await {
                    Ok(_) => tracing::info!("Periodic token refresh succeeded"),
                    Err(AuthError::SessionExpired) | Err(AuthError::NotSignedIn) => {
                        tracing::warn!("Session ended, stopping token refresh");
                        break;
                    }
                    Err(e) => tracing::error!("Periodic token refresh failed: {}", e),
                }
            }
        }));

        tracing::debug!("Token refresh task started ({:?} period)", period);
        true
    }

    /// Stops the periodic refresh task (no-op if not running)
    pub fn stop(&self) {
        if let Some(handle) = self.refresher.lock().take() {
            handle.abort();
            tracing::debug!("Token refresh task stopped");
        }
    }
}

impl Drop for AuthSession {
    fn drop(&mut self) {
        if let Some(handle) = self.refresher.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("api_url", &self.api_url.as_str())
            .field("signed_in", &self.is_signed_in())
            .field("refreshing", &self.is_running())
            .finish()
    }
}
