use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ConversationId, MessageId, Role, UserId};

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: UserId,
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
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
    pub token: String,
}

// -- Presence --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetPresenceRequest {
    pub is_online: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PresenceResponse {
    pub is_online: bool,
    /// `None` when the user has never been seen.
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
    pub presence: PresenceResponse,
    pub presence_degraded: bool,
}

// -- Contacts --

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub user_id: UserId,
    pub username: String,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ContactListResponse {
    pub contacts: Vec<ContactResponse>,
    pub status_degraded: bool,
    pub unread_degraded: bool,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountsResponse {
    /// Peer user id -> unread messages from that peer. Peers with nothing
    /// unread are omitted.
    pub counts: BTreeMap<UserId, i64>,
    pub degraded: bool,
}

// -- Conversations & messages --

#[derive(Debug, Serialize)]
pub struct PeerResponse {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct OpenConversationResponse {
    pub conversation_id: ConversationId,
    pub peer: PeerResponse,
    pub messages: Vec<MessageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub id: MessageId,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct EditMessageResponse {
    pub id: MessageId,
    pub edited_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_read: bool,
}

#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub messages: Vec<MessageResponse>,
}

// -- Errors --

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
