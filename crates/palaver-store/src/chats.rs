//! CRUD operations for [`Chat`] records and membership flags.

use rusqlite::params;

use palaver_shared::types::{ChatId, MessageId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Chat, ChatMember};
use crate::users::{parse_ts, parse_uuid};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new chat.
    pub fn insert_chat(&self, chat: &Chat) -> Result<()> {
        self.conn().execute(
            "INSERT INTO chats (id, is_group, name, only_admins_can_send, last_message_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                chat.id.to_string(),
                chat.is_group,
                chat.name,
                chat.only_admins_can_send,
                chat.last_message_id.map(|m| m.to_string()),
                chat.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Add a member row. Replaces the existing row for the same
    /// (chat, user) pair, so flags can be updated with the same call.
    pub fn add_member(&self, member: &ChatMember) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO chat_members (chat_id, user_id, is_admin, accepted, blocked, pinned)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                member.chat_id.to_string(),
                member.user_id.to_string(),
                member.is_admin,
                member.accepted,
                member.blocked,
                member.pinned,
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single chat by id.
    pub fn get_chat(&self, id: ChatId) -> Result<Chat> {
        self.conn()
            .query_row(
                "SELECT id, is_group, name, only_admins_can_send, last_message_id, created_at
                 FROM chats WHERE id = ?1",
                params![id.to_string()],
                row_to_chat,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Authorization check: does the user belong to the chat?
    pub fn is_member(&self, chat_id: ChatId, user_id: UserId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM chat_members WHERE chat_id = ?1 AND user_id = ?2",
            params![chat_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Whether the user is an admin of the chat.
    pub fn is_admin(&self, chat_id: ChatId, user_id: UserId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM chat_members
             WHERE chat_id = ?1 AND user_id = ?2 AND is_admin = 1",
            params![chat_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Whether the user has accepted the conversation.
    pub fn has_accepted(&self, chat_id: ChatId, user_id: UserId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM chat_members
             WHERE chat_id = ?1 AND user_id = ?2 AND accepted = 1",
            params![chat_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// All member ids of a chat.
    pub fn member_ids(&self, chat_id: ChatId) -> Result<Vec<UserId>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT user_id FROM chat_members WHERE chat_id = ?1")?;

        let rows = stmt.query_map(params![chat_id.to_string()], |row| {
            let id_str: String = row.get(0)?;
            Ok(UserId(parse_uuid(&id_str, 0)?))
        })?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Mark the conversation as accepted by the member (sending implies
    /// acceptance). Idempotent.
    pub fn mark_accepted(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        self.conn().execute(
            "UPDATE chat_members SET accepted = 1 WHERE chat_id = ?1 AND user_id = ?2",
            params![chat_id.to_string(), user_id.to_string()],
        )?;
        Ok(())
    }

    /// Update the chat's last-message pointer.
    pub fn set_last_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        self.conn().execute(
            "UPDATE chats SET last_message_id = ?1 WHERE id = ?2",
            params![message_id.to_string(), chat_id.to_string()],
        )?;
        Ok(())
    }
}

fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let id_str: String = row.get(0)?;
    let is_group: bool = row.get(1)?;
    let name: Option<String> = row.get(2)?;
    let only_admins_can_send: bool = row.get(3)?;
    let last_message_str: Option<String> = row.get(4)?;
    let created_str: String = row.get(5)?;

    let id = ChatId(parse_uuid(&id_str, 0)?);
    let last_message_id = match last_message_str {
        Some(s) => Some(MessageId(parse_uuid(&s, 4)?)),
        None => None,
    };
    let created_at = parse_ts(&created_str, 5)?;

    Ok(Chat {
        id,
        is_group,
        name,
        only_admins_can_send,
        last_message_id,
        created_at,
    })
}
