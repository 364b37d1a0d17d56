//! JWT Inspection
//!
//! The client never verifies signatures (that is the backend's job). It only
//! decodes the payload to read `exp` and decide whether a refresh is due.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Malformed token: expected 3 segments, got {0}")]
    Malformed(usize),

    #[error("Failed to decode token payload: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("Failed to parse token claims: {0}")]
    Claims(#[from] serde_json::Error),
}

// ============================================================================
// CLAIMS
// ============================================================================

/// The subset of SimpleJWT claims the client cares about
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<serde_json::Value>,
}

impl Claims {
    /// True once `exp` is at or before `now` (unix seconds). No `exp` means expired.
    pub fn is_expired_at(&self, now: i64) -> bool {
        match self.exp {
            Some(exp) => exp <= now,
            None => true,
        }
    }
}

/// Decodes the payload segment of a JWT
pub fn decode_claims(token: &str) -> Result<Claims, TokenError> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 3 {
        return Err(TokenError::Malformed(segments.len()));
    }

    // Some issuers keep the '=' padding, the URL-safe engine here does not accept it
    let payload = BASE64URL.decode(segments[1].trim_end_matches('='))?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Undecodable tokens count as expired so the caller falls back to a refresh
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now().timestamp())
}

pub fn is_expired_at(token: &str, now: i64) -> bool {
    match decode_claims(token) {
        Ok(claims) => claims.is_expired_at(now),
        Err(e) => {
            tracing::warn!("Treating undecodable token as expired: {}", e);
            true
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
pub(crate) fn forge_token(exp: i64) -> String {
    let header = BASE64URL.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = BASE64URL.encode(
        serde_json::json!({ "exp": exp, "token_type": "access", "user_id": 7 })
            .to_string()
            .as_bytes(),
    );
    format!("{header}.{payload}.signature")
}
