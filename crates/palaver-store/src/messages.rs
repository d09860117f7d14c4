//! CRUD operations for [`Message`] records, receipt sets, and reactions.

use chrono::{DateTime, Utc};
use rusqlite::params;

use palaver_shared::constants::DELETED_MESSAGE_TOMBSTONE;
use palaver_shared::protocol::MessageKind;
use palaver_shared::types::{ChatId, MessageId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Message, MessageState, Reaction, ReceiptKind};
use crate::users::{parse_ts, parse_uuid};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new message.
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        let (state, edited_at) = state_columns(&message.state);
        self.conn().execute(
            "INSERT INTO messages (id, chat_id, sender_id, kind, content, url, reply_to, state, edited_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                message.id.to_string(),
                message.chat_id.to_string(),
                message.sender_id.to_string(),
                kind_to_str(message.kind),
                message.content,
                message.url,
                message.reply_to.map(|m| m.to_string()),
                state,
                edited_at.map(|t| t.to_rfc3339()),
                message.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single message by id.
    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                "SELECT id, chat_id, sender_id, kind, content, url, reply_to, state, edited_at, created_at
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Recent messages of a chat, newest first. Used by the reconnect
    /// reconciliation fetch.
    pub fn messages_for_chat(&self, chat_id: ChatId, limit: u32) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, chat_id, sender_id, kind, content, url, reply_to, state, edited_at, created_at
             FROM messages
             WHERE chat_id = ?1
             ORDER BY created_at DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![chat_id.to_string(), limit], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    // ------------------------------------------------------------------
    // Receipt sets
    // ------------------------------------------------------------------

    /// Add the user to one of the message's receipt sets. Idempotent;
    /// returns `true` if the row was newly inserted.
    pub fn add_receipt(&self, message_id: MessageId, user_id: UserId, kind: ReceiptKind) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO message_receipts (message_id, user_id, kind)
             VALUES (?1, ?2, ?3)",
            params![message_id.to_string(), user_id.to_string(), kind.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// All users in the given receipt set of a message.
    pub fn receipt_users(&self, message_id: MessageId, kind: ReceiptKind) -> Result<Vec<UserId>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM message_receipts WHERE message_id = ?1 AND kind = ?2",
        )?;

        let rows = stmt.query_map(params![message_id.to_string(), kind.as_str()], |row| {
            let id_str: String = row.get(0)?;
            Ok(UserId(parse_uuid(&id_str, 0)?))
        })?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    // ------------------------------------------------------------------
    // Reactions
    // ------------------------------------------------------------------

    /// Set the user's reaction on a message, replacing any previous one
    /// (one reaction per user per message, last write wins).
    pub fn set_reaction(&self, message_id: MessageId, user_id: UserId, emoji: &str) -> Result<Reaction> {
        let now = Utc::now();
        self.conn().execute(
            "INSERT OR REPLACE INTO message_reactions (message_id, user_id, emoji, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                message_id.to_string(),
                user_id.to_string(),
                emoji,
                now.to_rfc3339(),
            ],
        )?;

        Ok(Reaction {
            message_id,
            user_id,
            emoji: emoji.to_string(),
            created_at: now,
        })
    }

    /// All reactions on a message, oldest first.
    pub fn reactions_for_message(&self, message_id: MessageId) -> Result<Vec<Reaction>> {
        let mut stmt = self.conn().prepare(
            "SELECT message_id, user_id, emoji, created_at
             FROM message_reactions WHERE message_id = ?1 ORDER BY created_at ASC",
        )?;

        let rows = stmt.query_map(params![message_id.to_string()], |row| {
            let msg_str: String = row.get(0)?;
            let user_str: String = row.get(1)?;
            let emoji: String = row.get(2)?;
            let ts_str: String = row.get(3)?;

            Ok(Reaction {
                message_id: MessageId(parse_uuid(&msg_str, 0)?),
                user_id: UserId(parse_uuid(&user_str, 1)?),
                emoji,
                created_at: parse_ts(&ts_str, 3)?,
            })
        })?;

        let mut reactions = Vec::new();
        for row in rows {
            reactions.push(row?);
        }
        Ok(reactions)
    }

    // ------------------------------------------------------------------
    // Lifecycle mutations
    // ------------------------------------------------------------------

    /// Apply an edit: replace the content and move the message to the
    /// `Edited` state. Re-editing keeps the state and refreshes `edited_at`.
    pub fn apply_edit(&self, id: MessageId, content: &str, edited_at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "UPDATE messages SET content = ?1, state = 'edited', edited_at = ?2 WHERE id = ?3",
            params![content, edited_at.to_rfc3339(), id.to_string()],
        )?;
        Ok(())
    }

    /// Delete for everyone: terminal tombstone. Content is replaced with the
    /// fixed placeholder, the kind forced back to text, and the url cleared.
    pub fn delete_for_everyone(&self, id: MessageId) -> Result<()> {
        self.conn().execute(
            "UPDATE messages
             SET state = 'deleted', content = ?1, kind = 'text', url = NULL, edited_at = NULL
             WHERE id = ?2",
            params![DELETED_MESSAGE_TOMBSTONE, id.to_string()],
        )?;
        Ok(())
    }
}

fn kind_to_str(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Text => "text",
        MessageKind::Image => "image",
        MessageKind::File => "file",
        MessageKind::Audio => "audio",
    }
}

fn kind_from_str(s: &str, col: usize) -> rusqlite::Result<MessageKind> {
    match s {
        "text" => Ok(MessageKind::Text),
        "image" => Ok(MessageKind::Image),
        "file" => Ok(MessageKind::File),
        "audio" => Ok(MessageKind::Audio),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            col,
            rusqlite::types::Type::Text,
            format!("unknown message kind: {other}").into(),
        )),
    }
}

fn state_columns(state: &MessageState) -> (&'static str, Option<DateTime<Utc>>) {
    match state {
        MessageState::Active => ("active", None),
        MessageState::Edited { edited_at } => ("edited", Some(*edited_at)),
        MessageState::Deleted => ("deleted", None),
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let chat_str: String = row.get(1)?;
    let sender_str: String = row.get(2)?;
    let kind_str: String = row.get(3)?;
    let content: Option<String> = row.get(4)?;
    let url: Option<String> = row.get(5)?;
    let reply_str: Option<String> = row.get(6)?;
    let state_str: String = row.get(7)?;
    let edited_str: Option<String> = row.get(8)?;
    let created_str: String = row.get(9)?;

    let state = match (state_str.as_str(), edited_str) {
        ("active", _) => MessageState::Active,
        ("edited", Some(ts)) => MessageState::Edited {
            edited_at: parse_ts(&ts, 8)?,
        },
        ("deleted", _) => MessageState::Deleted,
        (other, _) => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                7,
                rusqlite::types::Type::Text,
                format!("unknown message state: {other}").into(),
            ))
        }
    };

    let reply_to = match reply_str {
        Some(s) => Some(MessageId(parse_uuid(&s, 6)?)),
        None => None,
    };

    Ok(Message {
        id: MessageId(parse_uuid(&id_str, 0)?),
        chat_id: ChatId(parse_uuid(&chat_str, 1)?),
        sender_id: UserId(parse_uuid(&sender_str, 2)?),
        kind: kind_from_str(&kind_str, 3)?,
        content,
        url,
        reply_to,
        state,
        created_at: parse_ts(&created_str, 9)?,
    })
}
