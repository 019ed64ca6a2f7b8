use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ItemStatus, ItemType, Message, Role};

// -- JWT Claims --

/// Per-request session context, carried as a JWT and inserted into request
/// extensions by the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

/// Public registration carries no role field: everyone self-registers as a
/// student, and `deny_unknown_fields` rejects payloads that try to smuggle
/// one in. Admin accounts are only created through the admin surface.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: i64,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub token: String,
}

/// What the auth module hands back on a successful login. The password hash
/// never leaves the persistence boundary.
#[derive(Debug, Clone, Serialize)]
pub struct SessionUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub email: Option<String>,
}

// -- Items --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateItemRequest {
    pub title: String,
    pub description: String,
    pub item_type: ItemType,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateItemResponse {
    pub item_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateItemRequest {
    pub title: String,
    pub description: String,
    pub status: ItemStatus,
}

#[derive(Debug, Serialize)]
pub struct UploadImageResponse {
    pub image_url: String,
}

/// Item counts for the admin overview.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ItemStats {
    pub total: i64,
    pub lost: i64,
    pub found: i64,
    pub active: i64,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub receiver_id: i64,
    /// When absent, the most recent message in the thread donates its item
    /// context (sticky until a different item is referenced).
    #[serde(default)]
    pub item_id: Option<i64>,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message_id: i64,
}

/// All messages exchanged with one partner, regardless of item. Produced by
/// conversation grouping; always holds at least one message.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub partner_id: i64,
    pub partner_username: String,
    pub last_activity: DateTime<Utc>,
    pub unread: u32,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub partner_id: i64,
    pub partner_username: String,
    pub last_activity: DateTime<Utc>,
    pub unread: u32,
}

/// One conversation as returned by the thread view; may be empty when the
/// viewer has never exchanged messages with the partner.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationThread {
    pub partner_id: i64,
    pub partner_username: String,
    pub messages: Vec<Message>,
}
