//! Registration, profile and password reset

use super::client::{segment, ApiClient, ApiError};
use super::models::{PasswordResetConfirm, PasswordResetRequest, Profile, ProfileUpdate, Registration};

impl ApiClient {
    /// `POST /userauth/register/` (no bearer token)
    pub async fn register(&self, registration: &Registration) -> Result<serde_json::Value, ApiError> {
        if registration.email.trim().is_empty() || registration.password.is_empty() {
            return Err(ApiError::InvalidInput("Email and password are required.".into()));
        }
        self.post_public("userauth/register/", registration).await
    }

    pub async fn profile(&self) -> Result<Profile, ApiError> {
        self.get("userauth/profile/update/").await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, ApiError> {
        self.patch("userauth/profile/update/", update).await
    }

    // ========================================================================
    // PASSWORD RESET
    // ========================================================================

    /// `POST /userauth/password-reset/`: the backend mails a reset link
    pub async fn request_password_reset(&self, email: &str) -> Result<serde_json::Value, ApiError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ApiError::InvalidInput("Please enter your email address.".into()));
        }

        let body = PasswordResetRequest {
            email: email.to_string(),
        };
        let response = self.post_public("userauth/password-reset/", &body).await?;
        tracing::info!("Password reset requested");
        Ok(response)
    }

    /// `GET /userauth/password-reset/verify/{uid}/{token}/`: checks the mailed link
    pub async fn verify_password_reset(&self, uid: &str, token: &str) -> Result<serde_json::Value, ApiError> {
        if uid.is_empty() || token.is_empty() {
            return Err(ApiError::InvalidInput("Invalid or expired reset link.".into()));
        }

        let path = format!("userauth/password-reset/verify/{}/{}/", segment(uid), segment(token));
        self.get_public(&path).await
    }

    /// `POST /userauth/password-reset/confirm/` with the new password
    pub async fn reset_password(
        &self,
        uid: &str,
        token: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<serde_json::Value, ApiError> {
        if password.is_empty() {
            return Err(ApiError::InvalidInput("Please enter a new password.".into()));
        }
        if password != confirm_password {
            return Err(ApiError::InvalidInput("Passwords do not match!".into()));
        }

        let body = PasswordResetConfirm {
            uid: uid.to_string(),
            token: token.to_string(),
            new_password: password.to_string(),
        };
        let response = self.post_public("userauth/password-reset/confirm/", &body).await?;
        tracing::info!("Password reset completed");
        Ok(response)
    }
}
