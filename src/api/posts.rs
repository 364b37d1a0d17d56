//! Feed: posts, likes, reposts, reports and comments

use super::client::{ApiClient, ApiError};
use super::models::{Comment, Id, Post};
use serde_json::json;

impl ApiClient {
    pub async fn posts(&self) -> Result<Vec<Post>, ApiError> {
        self.get("posts/").await
    }

    pub async fn create_post(&self, content: &str) -> Result<Post, ApiError> {
        if content.trim().is_empty() {
            return Err(ApiError::InvalidInput("Post content cannot be empty!".into()));
        }
        self.post("posts/", &json!({ "content": content })).await
    }

    /// Toggles the like; the backend answers with the new like state
    pub async fn like_post(&self, post_id: Id) -> Result<serde_json::Value, ApiError> {
        self.post(&format!("posts/{post_id}/like/"), &json!({})).await
    }

    pub async fn repost(&self, post_id: Id) -> Result<serde_json::Value, ApiError> {
        self.post(&format!("posts/{post_id}/repost/"), &json!({})).await
    }

    pub async fn report_post(&self, post_id: Id, reason: Option<&str>) -> Result<serde_json::Value, ApiError> {
        let body = match reason {
            Some(reason) => json!({ "reason": reason }),
            None => json!({}),
        };
        self.post(&format!("posts/{post_id}/report/"), &body).await
    }

    pub async fn comment(&self, post_id: Id, content: &str) -> Result<Comment, ApiError> {
        if content.trim().is_empty() {
            return Err(ApiError::InvalidInput("Comment cannot be empty!".into()));
        }
        self.post(&format!("posts/{post_id}/comment/"), &json!({ "content": content }))
            .await
    }

    pub async fn comments(&self, post_id: Id) -> Result<Vec<Comment>, ApiError> {
        self.get(&format!("posts/{post_id}/comments/")).await
    }
}
