//! # palaver-server
//!
//! Real-time messaging and presence server.
//!
//! Clients connect over a single authenticated WebSocket and exchange
//! JSON events:
//! - **presence**: online/offline broadcasts with per-user session counting
//! - **conversation rooms**: membership-gated fan-out scopes
//! - **message lifecycle**: send, delivery/read receipts, reactions, edits
//!   and soft deletes with a fixed time window
//! - **call signaling**: opaque WebRTC offer/answer/candidate relay
//!
//! Persistence lives in [`palaver_store`]; the wire protocol in
//! [`palaver_shared`].

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod hub;
pub mod presence;
pub mod signaling;
pub mod state;

pub use config::ServerConfig;
pub use state::AppState;
