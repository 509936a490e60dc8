//! The signed-in landing endpoint.

use axum::Json;
use serde::{Deserialize, Serialize};

use super::extract::AuthenticatedUser;

/// What the chat page needs to open its socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedResponse {
    /// Token subject.
    pub username: String,
    /// Socket path for this user.
    pub channel: String,
}

/// GET /feed
pub async fn feed(AuthenticatedUser(username): AuthenticatedUser) -> Json<FeedResponse> {
    let channel = format!("/ws/{username}");
    Json(FeedResponse { username, channel })
}
