//! WebSocket wire protocol.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! [`ClientEvent`] covers everything a client may send after the handshake;
//! [`ServerEvent`] covers everything the server emits. Event names use the
//! `domain:action` convention (`message:send`, `user:online`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ChatId, MessageId, UserId};

/// Content type of a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    File,
    Audio,
}

impl Default for MessageKind {
    fn default() -> Self {
        Self::Text
    }
}

/// Scope of a message deletion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeleteType {
    #[serde(rename = "forMe")]
    ForMe,
    #[serde(rename = "forEveryone")]
    ForEveryone,
}

// ---------------------------------------------------------------------------
// Client -> server payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub chat_id: ChatId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub chat_id: ChatId,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub reply_to: Option<MessageId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub message_id: MessageId,
    pub chat_id: ChatId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactToMessage {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub emoji: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMessage {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub delete_type: DeleteType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditMessage {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOffer {
    pub to_user_id: UserId,
    /// Opaque SDP offer; the server relays it without inspection.
    pub offer: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAnswer {
    pub to_user_id: UserId,
    pub answer: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallCandidate {
    pub to_user_id: UserId,
    pub candidate: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHangup {
    pub to_user_id: UserId,
}

/// All events a client may send after the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Subscribe to a conversation room. The payload is the bare chat id.
    #[serde(rename = "chat:join")]
    ChatJoin(ChatId),
    #[serde(rename = "typing:start")]
    TypingStart(TypingPayload),
    #[serde(rename = "typing:stop")]
    TypingStop(TypingPayload),
    #[serde(rename = "message:send")]
    MessageSend(SendMessage),
    #[serde(rename = "message:delivered")]
    MessageDelivered(MessageRef),
    #[serde(rename = "message:read")]
    MessageRead(MessageRef),
    #[serde(rename = "message:react")]
    MessageReact(ReactToMessage),
    #[serde(rename = "message:delete")]
    MessageDelete(DeleteMessage),
    #[serde(rename = "message:edit")]
    MessageEdit(EditMessage),
    #[serde(rename = "call:start")]
    CallStart(CallOffer),
    #[serde(rename = "call:answer")]
    CallAnswer(CallAnswer),
    #[serde(rename = "call:ice-candidate")]
    CallIceCandidate(CallCandidate),
    #[serde(rename = "call:end")]
    CallEnd(CallHangup),
}

// ---------------------------------------------------------------------------
// Server -> client payloads
// ---------------------------------------------------------------------------

/// Limited profile projection attached to message payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
}

/// Projection of a reply target carried inside `message:new`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPreview {
    pub id: MessageId,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: Option<String>,
    pub url: Option<String>,
    pub sender_name: String,
}

/// A freshly created message as delivered to the conversation room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender: UserProfile,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: Option<String>,
    pub url: Option<String>,
    pub reply_to: Option<ReplyPreview>,
    pub read_by: Vec<UserId>,
    pub delivered_to: Vec<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOnline {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOffline {
    pub user_id: UserId,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub chat_id: ChatId,
    pub message: MessagePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub chat_id: ChatId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionApplied {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub emoji: String,
    pub chat_id: ChatId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeleted {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub delete_type: DeleteType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEdited {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub content: String,
    pub is_edited: bool,
    pub edited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallIncoming {
    pub from: UserId,
    pub offer: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAccepted {
    pub from: UserId,
    pub answer: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallCandidateRelay {
    pub from: UserId,
    pub candidate: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEnded {
    pub from: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typing {
    pub user_id: UserId,
    pub chat_id: ChatId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub message: String,
}

/// All events the server emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Snapshot of currently online users, sent once per new session.
    #[serde(rename = "online:users")]
    OnlineUsers(Vec<UserId>),
    #[serde(rename = "user:online")]
    UserOnline(UserOnline),
    #[serde(rename = "user:offline")]
    UserOffline(UserOffline),
    #[serde(rename = "message:new")]
    MessageNew(NewMessage),
    #[serde(rename = "message:delivered")]
    MessageDelivered(Receipt),
    #[serde(rename = "message:read")]
    MessageRead(Receipt),
    #[serde(rename = "message:react")]
    MessageReact(ReactionApplied),
    #[serde(rename = "message:deleted")]
    MessageDeleted(MessageDeleted),
    #[serde(rename = "message:edited")]
    MessageEdited(MessageEdited),
    #[serde(rename = "call:incoming")]
    CallIncoming(CallIncoming),
    #[serde(rename = "call:accepted")]
    CallAccepted(CallAccepted),
    #[serde(rename = "call:ice-candidate")]
    CallIceCandidate(CallCandidateRelay),
    #[serde(rename = "call:ended")]
    CallEnded(CallEnded),
    #[serde(rename = "call:failed")]
    CallFailed(ErrorEvent),
    #[serde(rename = "typing:start")]
    TypingStart(Typing),
    #[serde(rename = "typing:stop")]
    TypingStop(Typing),
    #[serde(rename = "error")]
    Error(ErrorEvent),
}
