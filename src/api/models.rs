//! Response and request bodies of the REST backend
//!
//! The backend's serializers differ between endpoints, so most fields are
//! optional and unknown fields are kept in `extra` instead of failing decode.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Id = i64;

// ============================================================================
// ROOMS
// ============================================================================

/// A named call room, as returned by create/join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "room_name", alias = "name")]
    pub name: String,
}

// ============================================================================
// ACCOUNT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub id: Option<Id>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of the reset-link request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// Body that sets the new password; `uid`/`token` come from the mailed link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordResetConfirm {
    pub uid: String,
    pub token: String,
    pub new_password: String,
}

/// Partial profile update; unset fields are left untouched
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
}

// ============================================================================
// POSTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Post {
    pub id: Id,
    #[serde(default)]
    pub author: Option<Value>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, alias = "likes")]
    pub likes_count: Option<i64>,
    #[serde(default, alias = "isLiked")]
    pub is_liked: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Comment {
    pub id: Id,
    #[serde(default)]
    pub post: Option<Id>,
    #[serde(default)]
    pub author: Option<Value>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// FRIENDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FriendRequest {
    pub id: Id,
    #[serde(default, alias = "from_user_id")]
    pub sender: Option<Value>,
    #[serde(default, alias = "to_user_id")]
    pub receiver: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserSummary {
    pub id: Id,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// MESSAGING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Conversation {
    pub id: Id,
    #[serde(default)]
    pub participants: Vec<Value>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    pub id: Id,
    #[serde(default)]
    pub conversation: Option<Id>,
    #[serde(default)]
    pub sender: Option<Value>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub is_read: Option<bool>,
    #[serde(default, alias = "timestamp")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// MARKET
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Advertisement {
    pub id: Id,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Decimal prices arrive as strings or numbers depending on the serializer
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default, alias = "imageURL", alias = "image")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub seller: Option<Value>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewAdvertisement {
    pub title: String,
    pub description: String,
    pub price: String,
    #[serde(rename = "imageURL", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SellerMessage {
    pub id: Id,
    #[serde(default, alias = "adId", alias = "ad")]
    pub advertisement: Option<Id>,
    #[serde(default)]
    pub sender: Option<Value>,
    #[serde(default, alias = "content")]
    pub message: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
