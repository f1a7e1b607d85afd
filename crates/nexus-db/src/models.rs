/// Database row types, mapped straight from SQLite rows.
/// Distinct from nexus-types API models to keep the DB layer independent.
use chrono::{DateTime, Utc};
use nexus_types::models::{ConversationId, MessageId, Role, UserId};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: UserId,
    pub username: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRow {
    pub id: UserId,
    pub username: String,
}

/// Presence as stored in `user_status`. A user with no row reads as
/// `Presence::default()`: offline, never seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Presence {
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub id: MessageId,
    pub sent_at: DateTime<Utc>,
}

/// What opening a conversation hands back. `messages` reflects read-state
/// from before the peer's messages were marked read.
#[derive(Debug, Clone)]
pub struct OpenedConversation {
    pub conversation_id: ConversationId,
    pub messages: Vec<MessageRow>,
    pub marked_read: usize,
}
