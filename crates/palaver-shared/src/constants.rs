/// Application name
pub const APP_NAME: &str = "Palaver";

/// Placeholder content substituted for a message deleted for everyone.
pub const DELETED_MESSAGE_TOMBSTONE: &str = "This message was deleted";

/// Window (in seconds) after creation during which a message may be edited
/// or deleted for everyone.
pub const EDIT_WINDOW_SECS: i64 = 2 * 60;

/// Maximum accepted text frame size in bytes (64 KiB)
pub const MAX_FRAME_SIZE: usize = 65_536;

/// Default HTTP/WebSocket port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;
