use serde::{Deserialize, Serialize};

use feedcloud_core::view::{EntryView, FeedView};

#[derive(Debug, Clone, Deserialize)]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFeedRequest {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedListResponse {
    pub feeds: Vec<FeedView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryListResponse {
    pub entries: Vec<EntryView>,
}

/// `?status=` filter: `read`, `unread`, or omitted for all.
#[derive(Debug, Clone, Deserialize)]
pub struct EntryListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntryStatusRequest {
    pub status: String,
}
