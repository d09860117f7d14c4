//! v001 -- Initial schema creation.
//!
//! Creates the core tables: `users`, `chats`, `chat_members`, `messages`,
//! `message_receipts`, and `message_reactions`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    email      TEXT NOT NULL UNIQUE,
    name       TEXT NOT NULL,
    avatar_url TEXT,
    last_seen  TEXT,                         -- ISO-8601 / RFC-3339
    created_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Chats (direct or group conversations)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    id                   TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    is_group             INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    name                 TEXT,                       -- groups only
    only_admins_can_send INTEGER NOT NULL DEFAULT 0,
    last_message_id      TEXT,                       -- FK -> messages(id), no constraint (insert order)
    created_at           TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Chat membership with per-member flags
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_members (
    chat_id  TEXT NOT NULL,                  -- FK -> chats(id)
    user_id  TEXT NOT NULL,                  -- FK -> users(id)
    is_admin INTEGER NOT NULL DEFAULT 0,
    accepted INTEGER NOT NULL DEFAULT 0,     -- opt-in for unsolicited DMs
    blocked  INTEGER NOT NULL DEFAULT 0,
    pinned   INTEGER NOT NULL DEFAULT 0,

    PRIMARY KEY (chat_id, user_id),
    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_chat_members_user ON chat_members(user_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id         TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    chat_id    TEXT NOT NULL,                -- FK -> chats(id)
    sender_id  TEXT NOT NULL,                -- FK -> users(id)
    kind       TEXT NOT NULL DEFAULT 'text', -- text|image|file|audio
    content    TEXT,
    url        TEXT,
    reply_to   TEXT,                         -- FK -> messages(id)
    state      TEXT NOT NULL DEFAULT 'active', -- active|edited|deleted
    edited_at  TEXT,                         -- set only when state = 'edited'
    created_at TEXT NOT NULL,

    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE,
    FOREIGN KEY (sender_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_ts
    ON messages(chat_id, created_at DESC);

-- ----------------------------------------------------------------
-- Per-user receipt sets (delivered / read / deleted-for)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS message_receipts (
    message_id TEXT NOT NULL,                -- FK -> messages(id)
    user_id    TEXT NOT NULL,                -- FK -> users(id)
    kind       TEXT NOT NULL,                -- delivered|read|deleted_for

    PRIMARY KEY (message_id, user_id, kind),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Reactions: one per user per message, last write wins
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS message_reactions (
    message_id TEXT NOT NULL,                -- FK -> messages(id)
    user_id    TEXT NOT NULL,                -- FK -> users(id)
    emoji      TEXT NOT NULL,
    created_at TEXT NOT NULL,

    PRIMARY KEY (message_id, user_id),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
