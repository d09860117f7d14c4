//! The event dispatcher: connection table, room subscriptions, and fan-out.
//!
//! A [`Hub`] owns every live session's outbound channel plus two indexes:
//! the room subscriber table (conversation id -> sessions) and the per-user
//! session set (the user's private room, also the presence reference count).
//!
//! All emission is fire-and-forget: frames are serialized once per fan-out
//! and `try_send` to each subscriber; a slow or closed session drops frames
//! rather than blocking the sender. Clients reconcile by re-fetching recent
//! messages on reconnect.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

use palaver_shared::protocol::ServerEvent;
use palaver_shared::types::{ChatId, UserId};

/// Outbound buffer per session; frames beyond this are dropped.
pub const SESSION_BUFFER: usize = 64;

/// Identifier of one live connection. A user may hold several at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct SessionHandle {
    user_id: UserId,
    tx: mpsc::Sender<String>,
}

#[derive(Default)]
struct HubInner {
    sessions: HashMap<SessionId, SessionHandle>,
    rooms: HashMap<ChatId, HashSet<SessionId>>,
    user_sessions: HashMap<UserId, HashSet<SessionId>>,
}

/// Process-wide registry of live sessions. Constructed once at startup and
/// injected via [`AppState`](crate::AppState) so tests can run isolated
/// instances.
#[derive(Default)]
pub struct Hub {
    inner: Mutex<HubInner>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Register a new session for `user_id`. Returns the session id and the
    /// number of live sessions the user now has (1 = first connection).
    pub fn register(&self, user_id: UserId, tx: mpsc::Sender<String>) -> (SessionId, usize) {
        let session = SessionId::new();
        let mut inner = self.inner.lock().expect("hub lock poisoned");

        inner.sessions.insert(session, SessionHandle { user_id, tx });
        let live = inner.user_sessions.entry(user_id).or_default();
        live.insert(session);
        let count = live.len();

        (session, count)
    }

    /// Remove a session from the connection table, its user's session set,
    /// and every room it joined. Returns the user id and how many of their
    /// sessions remain (0 = user went offline).
    pub fn unregister(&self, session: SessionId) -> Option<(UserId, usize)> {
        let mut inner = self.inner.lock().expect("hub lock poisoned");

        let handle = inner.sessions.remove(&session)?;
        let user_id = handle.user_id;

        inner.rooms.retain(|_, subscribers| {
            subscribers.remove(&session);
            !subscribers.is_empty()
        });

        let remaining = match inner.user_sessions.get_mut(&user_id) {
            Some(live) => {
                live.remove(&session);
                let n = live.len();
                if n == 0 {
                    inner.user_sessions.remove(&user_id);
                }
                n
            }
            None => 0,
        };

        Some((user_id, remaining))
    }

    /// Subscribe a session to a conversation room. Authorization is the
    /// caller's concern; the hub only tracks fan-out scope.
    pub fn subscribe(&self, session: SessionId, chat_id: ChatId) {
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        if inner.sessions.contains_key(&session) {
            inner.rooms.entry(chat_id).or_default().insert(session);
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Total number of live sessions.
    pub fn session_count(&self) -> usize {
        self.inner.lock().expect("hub lock poisoned").sessions.len()
    }

    /// Whether the user has at least one live session.
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.inner
            .lock()
            .expect("hub lock poisoned")
            .user_sessions
            .contains_key(&user_id)
    }

    /// Snapshot of all currently online users.
    pub fn online_users(&self) -> Vec<UserId> {
        self.inner
            .lock()
            .expect("hub lock poisoned")
            .user_sessions
            .keys()
            .copied()
            .collect()
    }

    // ------------------------------------------------------------------
    // Fan-out primitives
    // ------------------------------------------------------------------

    /// Emit to a single session.
    pub fn send_to_session(&self, session: SessionId, event: &ServerEvent) {
        let Some(frame) = encode(event) else { return };
        let inner = self.inner.lock().expect("hub lock poisoned");
        if let Some(handle) = inner.sessions.get(&session) {
            deliver(handle, &frame);
        }
    }

    /// Emit to every session of one user (their private room).
    pub fn send_to_user(&self, user_id: UserId, event: &ServerEvent) {
        let Some(frame) = encode(event) else { return };
        let inner = self.inner.lock().expect("hub lock poisoned");
        if let Some(live) = inner.user_sessions.get(&user_id) {
            for session in live {
                if let Some(handle) = inner.sessions.get(session) {
                    deliver(handle, &frame);
                }
            }
        }
    }

    /// Emit to every session subscribed to a conversation room.
    pub fn send_to_chat(&self, chat_id: ChatId, event: &ServerEvent) {
        self.send_to_chat_inner(chat_id, None, event);
    }

    /// Emit to a conversation room, excluding the acting session. Used by
    /// receipt and typing events, which confirm to others rather than self.
    pub fn send_to_chat_except(&self, chat_id: ChatId, except: SessionId, event: &ServerEvent) {
        self.send_to_chat_inner(chat_id, Some(except), event);
    }

    fn send_to_chat_inner(&self, chat_id: ChatId, except: Option<SessionId>, event: &ServerEvent) {
        let Some(frame) = encode(event) else { return };
        let inner = self.inner.lock().expect("hub lock poisoned");
        if let Some(subscribers) = inner.rooms.get(&chat_id) {
            for session in subscribers {
                if Some(*session) == except {
                    continue;
                }
                if let Some(handle) = inner.sessions.get(session) {
                    deliver(handle, &frame);
                }
            }
        }
    }

    /// Emit to every live session. Used only for presence transitions.
    pub fn broadcast(&self, event: &ServerEvent) {
        let Some(frame) = encode(event) else { return };
        let inner = self.inner.lock().expect("hub lock poisoned");
        for handle in inner.sessions.values() {
            deliver(handle, &frame);
        }
    }
}

/// Serialize once per fan-out.
fn encode(event: &ServerEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!(error = %e, "failed to encode server event");
            None
        }
    }
}

fn deliver(handle: &SessionHandle, frame: &str) {
    if handle.tx.try_send(frame.to_string()).is_err() {
        debug!(user = %handle.user_id, "dropping frame for slow or closed session");
    }
}
