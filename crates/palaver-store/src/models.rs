//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be projected
//! into wire payloads without an intermediate mapping layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use palaver_shared::protocol::MessageKind;
use palaver_shared::types::{ChatId, MessageId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A known user identity. Credentials live elsewhere; this record only holds
/// what the messaging core needs for projections and presence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
    /// Last time any session of this user disconnected (or connected).
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A conversation. Direct chats have exactly two members; groups may carry
/// admins and the admins-only send restriction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: ChatId,
    pub is_group: bool,
    /// Display name, meaningful for groups only.
    pub name: Option<String>,
    pub only_admins_can_send: bool,
    pub last_message_id: Option<MessageId>,
    pub created_at: DateTime<Utc>,
}

/// Membership row with per-member flags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMember {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub is_admin: bool,
    /// Whether the member has accepted the conversation (sending implies
    /// acceptance).
    pub accepted: bool,
    pub blocked: bool,
    pub pinned: bool,
}

impl ChatMember {
    /// Plain member with no flags set.
    pub fn member(chat_id: ChatId, user_id: UserId) -> Self {
        Self {
            chat_id,
            user_id,
            is_admin: false,
            accepted: false,
            blocked: false,
            pinned: false,
        }
    }

    /// Member with the admin flag set.
    pub fn admin(chat_id: ChatId, user_id: UserId) -> Self {
        Self {
            is_admin: true,
            ..Self::member(chat_id, user_id)
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Lifecycle state of a message. `Deleted` is terminal; per-viewer
/// "deleted for me" is tracked separately in the receipt sets and does not
/// change this state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageState {
    Active,
    Edited { edited_at: DateTime<Utc> },
    Deleted,
}

impl MessageState {
    pub fn is_deleted(&self) -> bool {
        matches!(self, MessageState::Deleted)
    }
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub url: Option<String>,
    pub reply_to: Option<MessageId>,
    pub state: MessageState,
    pub created_at: DateTime<Utc>,
}

/// The three independent per-user sets attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptKind {
    Delivered,
    Read,
    DeletedFor,
}

impl ReceiptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptKind::Delivered => "delivered",
            ReceiptKind::Read => "read",
            ReceiptKind::DeletedFor => "deleted_for",
        }
    }
}

/// A reaction entry. At most one per user per message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reaction {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}
