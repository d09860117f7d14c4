//! # palaver-store
//!
//! SQLite persistence for the Palaver messaging server.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model: users, chats (with per-member flags), messages (with receipt sets
//! and reactions). Schema migrations run on open, guarded by the SQLite
//! `user_version` pragma.

pub mod chats;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
