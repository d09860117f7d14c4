//! Message lifecycle operations.
//!
//! Each operation runs with the database lock held across its writes and the
//! fan-out that announces them, so events arrive at a room in write order.
//!
//! Authorization failures (not a member, not the sender, admins-only chat)
//! drop the event silently; only violations of the edit/delete window produce
//! an explicit `error` frame, matching what clients surface to the user.

use chrono::{Duration, Utc};
use tracing::debug;

use palaver_shared::constants::EDIT_WINDOW_SECS;
use palaver_shared::protocol::{
    DeleteMessage, DeleteType, EditMessage, ErrorEvent, MessageDeleted, MessageEdited,
    MessagePayload, MessageRef, NewMessage, ReactToMessage, ReactionApplied, Receipt,
    ReplyPreview, SendMessage, ServerEvent, Typing, UserProfile,
};
use palaver_shared::types::{ChatId, MessageId, UserId};
use palaver_store::{Database, Message, MessageState, ReceiptKind, StoreError};

use crate::hub::SessionId;
use crate::state::AppState;

const EDIT_WINDOW_ERROR: &str = "Can only edit messages within 2 minutes";
const DELETE_WINDOW_ERROR: &str = "Can only delete for everyone within 2 minutes";

/// Subscribe the session to a conversation room after a membership check.
/// Unknown chats and non-members are dropped silently.
pub async fn chat_join(
    state: &AppState,
    session: SessionId,
    user_id: UserId,
    chat_id: ChatId,
) -> Result<(), StoreError> {
    let db = state.db.lock().await;

    match db.get_chat(chat_id) {
        Ok(_) => {}
        Err(StoreError::NotFound) => {
            debug!(chat = %chat_id, "join for unknown chat ignored");
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    if !db.is_member(chat_id, user_id)? {
        debug!(chat = %chat_id, user = %user_id, "join from non-member ignored");
        return Ok(());
    }

    state.hub.subscribe(session, chat_id);
    Ok(())
}

/// Create a message and fan it out to the conversation room.
///
/// Sending implies acceptance of the conversation, and the sender is seeded
/// into both receipt sets so counters start consistent on every client.
pub async fn message_send(
    state: &AppState,
    _session: SessionId,
    user_id: UserId,
    payload: SendMessage,
) -> Result<(), StoreError> {
    let db = state.db.lock().await;

    let chat = match db.get_chat(payload.chat_id) {
        Ok(chat) => chat,
        Err(StoreError::NotFound) => {
            debug!(chat = %payload.chat_id, "send to unknown chat ignored");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    if !db.is_member(chat.id, user_id)? {
        debug!(chat = %chat.id, user = %user_id, "send from non-member ignored");
        return Ok(());
    }

    if chat.is_group && chat.only_admins_can_send && !db.is_admin(chat.id, user_id)? {
        debug!(chat = %chat.id, user = %user_id, "send blocked by admins-only flag");
        return Ok(());
    }

    db.mark_accepted(chat.id, user_id)?;

    let message = Message {
        id: MessageId::new(),
        chat_id: chat.id,
        sender_id: user_id,
        kind: payload.kind,
        content: payload.content,
        url: payload.url,
        reply_to: payload.reply_to,
        state: MessageState::Active,
        created_at: Utc::now(),
    };
    db.insert_message(&message)?;
    db.add_receipt(message.id, user_id, ReceiptKind::Read)?;
    db.add_receipt(message.id, user_id, ReceiptKind::Delivered)?;
    db.set_last_message(chat.id, message.id)?;

    let sender = db.get_user(user_id)?;
    let reply_to = match message.reply_to {
        Some(target) => reply_preview(&db, target)?,
        None => None,
    };

    let event = ServerEvent::MessageNew(NewMessage {
        chat_id: chat.id,
        message: MessagePayload {
            id: message.id,
            chat_id: chat.id,
            sender: UserProfile {
                id: sender.id,
                name: sender.name,
                email: sender.email,
                avatar_url: sender.avatar_url,
            },
            kind: message.kind,
            content: message.content,
            url: message.url,
            reply_to,
            read_by: vec![user_id],
            delivered_to: vec![user_id],
            created_at: message.created_at,
        },
    });
    state.hub.send_to_chat(chat.id, &event);

    Ok(())
}

/// Project the reply target into the preview carried by `message:new`.
/// A dangling reply reference degrades to no preview rather than an error.
fn reply_preview(db: &Database, target: MessageId) -> Result<Option<ReplyPreview>, StoreError> {
    let original = match db.get_message(target) {
        Ok(msg) => msg,
        Err(StoreError::NotFound) => return Ok(None),
        Err(e) => return Err(e),
    };
    let sender = db.get_user(original.sender_id)?;

    Ok(Some(ReplyPreview {
        id: original.id,
        kind: original.kind,
        content: original.content,
        url: original.url,
        sender_name: sender.name,
    }))
}

/// Record a delivery receipt and notify the rest of the room.
pub async fn message_delivered(
    state: &AppState,
    session: SessionId,
    user_id: UserId,
    payload: MessageRef,
) -> Result<(), StoreError> {
    receipt(state, session, user_id, payload, ReceiptKind::Delivered).await
}

/// Record a read receipt and notify the rest of the room.
pub async fn message_read(
    state: &AppState,
    session: SessionId,
    user_id: UserId,
    payload: MessageRef,
) -> Result<(), StoreError> {
    receipt(state, session, user_id, payload, ReceiptKind::Read).await
}

async fn receipt(
    state: &AppState,
    session: SessionId,
    user_id: UserId,
    payload: MessageRef,
    kind: ReceiptKind,
) -> Result<(), StoreError> {
    let db = state.db.lock().await;

    match db.get_message(payload.message_id) {
        Ok(_) => {}
        Err(StoreError::NotFound) => {
            debug!(message = %payload.message_id, "receipt for unknown message ignored");
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    // Idempotent: a repeated receipt inserts nothing and emits nothing.
    if !db.add_receipt(payload.message_id, user_id, kind)? {
        return Ok(());
    }

    let receipt = Receipt {
        message_id: payload.message_id,
        user_id,
        chat_id: payload.chat_id,
    };
    let event = match kind {
        ReceiptKind::Read => ServerEvent::MessageRead(receipt),
        _ => ServerEvent::MessageDelivered(receipt),
    };
    state.hub.send_to_chat_except(payload.chat_id, session, &event);

    Ok(())
}

/// Set the user's reaction (one per user, last write wins) and fan it out to
/// the whole room, the actor included.
pub async fn message_react(
    state: &AppState,
    _session: SessionId,
    user_id: UserId,
    payload: ReactToMessage,
) -> Result<(), StoreError> {
    let db = state.db.lock().await;

    match db.get_message(payload.message_id) {
        Ok(_) => {}
        Err(StoreError::NotFound) => {
            debug!(message = %payload.message_id, "reaction for unknown message ignored");
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    let reaction = db.set_reaction(payload.message_id, user_id, &payload.emoji)?;

    let event = ServerEvent::MessageReact(ReactionApplied {
        message_id: payload.message_id,
        user_id,
        emoji: reaction.emoji,
        chat_id: payload.chat_id,
    });
    state.hub.send_to_chat(payload.chat_id, &event);

    Ok(())
}

/// Edit a message. Only the sender may edit, only while the message is not
/// deleted, and only within the fixed window after creation.
pub async fn message_edit(
    state: &AppState,
    session: SessionId,
    user_id: UserId,
    payload: EditMessage,
) -> Result<(), StoreError> {
    let db = state.db.lock().await;

    let message = match db.get_message(payload.message_id) {
        Ok(msg) => msg,
        Err(StoreError::NotFound) => return Ok(()),
        Err(e) => return Err(e),
    };

    if message.sender_id != user_id || message.state.is_deleted() {
        debug!(message = %message.id, user = %user_id, "edit rejected silently");
        return Ok(());
    }

    let now = Utc::now();
    if now - message.created_at >= Duration::seconds(EDIT_WINDOW_SECS) {
        state.hub.send_to_session(
            session,
            &ServerEvent::Error(ErrorEvent {
                message: EDIT_WINDOW_ERROR.into(),
            }),
        );
        return Ok(());
    }

    let content = payload.content.trim().to_string();
    db.apply_edit(message.id, &content, now)?;

    let event = ServerEvent::MessageEdited(MessageEdited {
        message_id: message.id,
        chat_id: payload.chat_id,
        content,
        is_edited: true,
        edited_at: now,
    });
    state.hub.send_to_chat(payload.chat_id, &event);

    Ok(())
}

/// Delete a message. Both variants are sender-only.
///
/// `forMe` hides it for the acting user only and confirms to their session
/// alone. `forEveryone` is additionally bound by the same window as edits
/// and replaces the message with a tombstone for the whole room.
pub async fn message_delete(
    state: &AppState,
    session: SessionId,
    user_id: UserId,
    payload: DeleteMessage,
) -> Result<(), StoreError> {
    let db = state.db.lock().await;

    let message = match db.get_message(payload.message_id) {
        Ok(msg) => msg,
        Err(StoreError::NotFound) => return Ok(()),
        Err(e) => return Err(e),
    };

    if message.sender_id != user_id {
        debug!(message = %message.id, user = %user_id, "delete by non-sender ignored");
        return Ok(());
    }

    match payload.delete_type {
        DeleteType::ForMe => {
            db.add_receipt(message.id, user_id, ReceiptKind::DeletedFor)?;

            let event = ServerEvent::MessageDeleted(MessageDeleted {
                message_id: message.id,
                chat_id: payload.chat_id,
                delete_type: DeleteType::ForMe,
            });
            state.hub.send_to_session(session, &event);
        }
        DeleteType::ForEveryone => {
            if Utc::now() - message.created_at >= Duration::seconds(EDIT_WINDOW_SECS) {
                state.hub.send_to_session(
                    session,
                    &ServerEvent::Error(ErrorEvent {
                        message: DELETE_WINDOW_ERROR.into(),
                    }),
                );
                return Ok(());
            }

            db.delete_for_everyone(message.id)?;

            let event = ServerEvent::MessageDeleted(MessageDeleted {
                message_id: message.id,
                chat_id: payload.chat_id,
                delete_type: DeleteType::ForEveryone,
            });
            state.hub.send_to_chat(payload.chat_id, &event);
        }
    }

    Ok(())
}

/// Relay a typing indicator to everyone else in the room. No persistence.
pub fn typing(state: &AppState, session: SessionId, user_id: UserId, chat_id: ChatId, started: bool) {
    let typing = Typing { user_id, chat_id };
    let event = if started {
        ServerEvent::TypingStart(typing)
    } else {
        ServerEvent::TypingStop(typing)
    };
    state.hub.send_to_chat_except(chat_id, session, &event);
}
