//! Classifieds marketplace

use super::client::{ApiClient, ApiError};
use super::models::{Advertisement, Id, NewAdvertisement, SellerMessage};
use serde_json::json;

impl ApiClient {
    pub async fn advertisements(&self) -> Result<Vec<Advertisement>, ApiError> {
        self.get("adds/").await
    }

    pub async fn create_advertisement(&self, ad: &NewAdvertisement) -> Result<Advertisement, ApiError> {
        if ad.title.trim().is_empty() {
            return Err(ApiError::InvalidInput("An advertisement needs a title.".into()));
        }
        self.post("adds/create/", ad).await
    }

    pub async fn advertisement(&self, ad_id: Id) -> Result<Advertisement, ApiError> {
        self.get(&format!("adds/{ad_id}/")).await
    }

    pub async fn message_seller(&self, ad_id: Id, message: &str) -> Result<SellerMessage, ApiError> {
        if message.trim().is_empty() {
            return Err(ApiError::InvalidInput("Message cannot be empty.".into()));
        }
        self.post(&format!("adds/messages/{ad_id}/"), &json!({ "message": message }))
            .await
    }

    /// Messages buyers sent about the signed-in user's ads
    pub async fn seller_messages(&self) -> Result<Vec<SellerMessage>, ApiError> {
        self.get("adds/messages/").await
    }

    pub async fn seller_replies(&self, ad_id: Id) -> Result<Vec<SellerMessage>, ApiError> {
        self.get(&format!("adds/messages/{ad_id}/replies/")).await
    }
}
