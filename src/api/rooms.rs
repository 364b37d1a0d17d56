//! Call rooms: `POST /call/create-room/`, `POST /call/join-room/{room}/`

use super::client::{segment, ApiClient, ApiError};
use super::models::Room;

impl ApiClient {
    /// Asks the backend for a fresh room name
    pub async fn create_room(&self) -> Result<Room, ApiError> {
        let room: Room = self.post("call/create-room/", &serde_json::json!({})).await?;
        tracing::info!("Created room {}", room.name);
        Ok(room)
    }

    /// Joins an existing room by name
    pub async fn join_room(&self, room_name: &str) -> Result<Room, ApiError> {
        let room_name = room_name.trim();
        if room_name.is_empty() {
            return Err(ApiError::InvalidInput("Please enter a room name.".into()));
        }

        let path = format!("call/join-room/{}/", segment(room_name));
        let room: Room = self.post(&path, &serde_json::json!({})).await?;
        tracing::info!("Joined room {}", room.name);
        Ok(room)
    }
}
