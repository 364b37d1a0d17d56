//! Friend requests, friends list and user search

use super::client::{ApiClient, ApiError};
use super::models::{FriendRequest, FriendRequestStatus, Id, UserSummary};
use serde_json::json;

impl ApiClient {
    pub async fn friend_requests(&self) -> Result<Vec<FriendRequest>, ApiError> {
        self.get("requests/friend-requests/").await
    }

    pub async fn send_friend_request(&self, receiver: Id) -> Result<FriendRequest, ApiError> {
        self.post("requests/friend-requests/", &json!({ "receiver": receiver }))
            .await
    }

    pub async fn respond_friend_request(
        &self,
        request_id: Id,
        status: FriendRequestStatus,
    ) -> Result<FriendRequest, ApiError> {
        self.patch(
            &format!("requests/friend-requests/{request_id}/"),
            &json!({ "status": status }),
        )
        .await
    }

    pub async fn friends(&self) -> Result<Vec<UserSummary>, ApiError> {
        self.get("requests/friends/").await
    }

    pub async fn search_users(&self, query: &str) -> Result<Vec<UserSummary>, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.get_query("requests/search/", &[("q", query)]).await
    }
}
