//! Direct messaging

use super::client::{ApiClient, ApiError};
use super::models::{Conversation, Id, Message};
use serde_json::json;

impl ApiClient {
    pub async fn create_conversation(&self, participants: &[Id]) -> Result<Conversation, ApiError> {
        if participants.is_empty() {
            return Err(ApiError::InvalidInput("A conversation needs participants.".into()));
        }
        self.post("conversations/", &json!({ "participants": participants }))
            .await
    }

    pub async fn conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        self.get("conversations/").await
    }

    pub async fn conversation(&self, conversation_id: Id) -> Result<Conversation, ApiError> {
        self.get(&format!("conversations/{conversation_id}/")).await
    }

    pub async fn delete_conversation(&self, conversation_id: Id) -> Result<(), ApiError> {
        self.delete(&format!("conversations/{conversation_id}/")).await
    }

    pub async fn messages(&self, conversation_id: Id) -> Result<Vec<Message>, ApiError> {
        self.get(&format!("conversations/{conversation_id}/messages/"))
            .await
    }

    pub async fn send_message(&self, conversation_id: Id, content: &str) -> Result<Message, ApiError> {
        if content.trim().is_empty() {
            return Err(ApiError::InvalidInput("Message cannot be empty.".into()));
        }
        self.post(
            "messages/",
            &json!({ "conversation": conversation_id, "content": content }),
        )
        .await
    }

    pub async fn mark_message_read(&self, message_id: Id) -> Result<Message, ApiError> {
        self.patch(&format!("messages/{message_id}/"), &json!({ "is_read": true }))
            .await
    }
}
