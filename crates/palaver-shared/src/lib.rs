//! # palaver-shared
//!
//! Types shared between the Palaver server and its clients: identifier
//! newtypes, the WebSocket wire protocol, and domain constants.
//!
//! The wire protocol is JSON text frames with an `{"event", "data"}`
//! envelope; event names are the public contract and never change without a
//! protocol version bump.

pub mod constants;
pub mod protocol;
pub mod types;

pub use protocol::{ClientEvent, ServerEvent};
pub use types::{ChatId, MessageId, UserId};
