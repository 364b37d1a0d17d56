//! REST Client
//!
//! Thin wrapper over reqwest that attaches the bearer token and maps every
//! failure onto `ApiError`. A 401 on an authenticated request triggers one
//! token refresh and a single retry.

use crate::auth::{AuthError, AuthSession};
use crate::config::ClientConfig;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not authorized, please sign in again")]
    Unauthorized,

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ============================================================================
// API CLIENT
// ============================================================================

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    auth: Arc<AuthSession>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, http: reqwest::Client, auth: Arc<AuthSession>) -> Self {
        Self {
            http,
            base: config.api_url.clone(),
            auth,
        }
    }

    pub fn auth(&self) -> &Arc<AuthSession> {
        &self.auth
    }

    /// Resolves `path` (no leading slash) against the API base
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        self.request(Method::GET, url, None, true).await
    }

    /// GET without a bearer token (password-reset links)
    pub(crate) async fn get_public<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        self.request(Method::GET, url, None, false).await
    }

    pub(crate) async fn get_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut().extend_pairs(query);
        self.request(Method::GET, url, None, true).await
    }

    pub(crate) async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, url, Some(body), true).await
    }

    /// POST without a bearer token (registration)
    pub(crate) async fn post_public<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, url, Some(body), false).await
    }

    pub(crate) async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        let body = serde_json::to_value(body)?;
        self.request(Method::PATCH, url, Some(body), true).await
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let url = self.endpoint(path)?;
        let _: serde_json::Value = self.request(Method::DELETE, url, None, true).await?;
        Ok(())
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
        authenticated: bool,
    ) -> Result<T, ApiError> {
        let mut retried = false;

        loop {
            tracing::debug!("{} {}", method, url.path());

            let mut request = self.http.request(method.clone(), url.clone());
            if authenticated {
                request = request.bearer_auth(self.auth.access_token().await?);
            }
            if let Some(body) = &body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                if authenticated && !retried {
                    tracing::info!("{} {} returned 401, refreshing token", method, url.path());
                    self.auth.refresh().await?;
                    retried = true;
                    continue;
                }
                return Err(ApiError::Unauthorized);
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!("{} {} failed with {}: {}", method, url.path(), status, body);
                return Err(ApiError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let bytes = response.bytes().await?;
            // 204 and empty 200 bodies decode as JSON null
            let payload: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
                b"null"
            } else {
                &bytes
            };
            return Ok(serde_json::from_slice(payload)?);
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base", &self.base.as_str())
            .finish()
    }
}

/// Percent-encodes one path segment
pub(crate) fn segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
