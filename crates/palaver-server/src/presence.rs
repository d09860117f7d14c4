//! Presence transitions.
//!
//! Online/offline is counted per user, not per connection: a user with two
//! open tabs goes online once (on the first session) and offline once (after
//! the last session closes). Both transitions are broadcast to every live
//! session; the new session additionally receives a snapshot of who is
//! currently online.

use chrono::Utc;
use tracing::{info, warn};

use palaver_shared::protocol::{ServerEvent, UserOffline, UserOnline};
use palaver_shared::types::UserId;

use crate::hub::SessionId;
use crate::state::AppState;

/// Run the connect-time side effects for a freshly registered session.
///
/// `live_sessions` is the user's session count after registration, as
/// returned by [`Hub::register`](crate::hub::Hub::register).
pub async fn session_connected(
    state: &AppState,
    session: SessionId,
    user_id: UserId,
    live_sessions: usize,
) {
    {
        let db = state.db.lock().await;
        if let Err(e) = db.set_last_seen(user_id, Utc::now()) {
            warn!(user = %user_id, error = %e, "failed to record last_seen on connect");
        }
    }

    if live_sessions == 1 {
        info!(user = %user_id, "user online");
        state
            .hub
            .broadcast(&ServerEvent::UserOnline(UserOnline { user_id }));
    }

    state
        .hub
        .send_to_session(session, &ServerEvent::OnlineUsers(state.hub.online_users()));
}

/// Tear down a session and, if it was the user's last, mark them offline.
pub async fn session_disconnected(state: &AppState, session: SessionId) {
    let Some((user_id, remaining)) = state.hub.unregister(session) else {
        return;
    };

    if remaining > 0 {
        return;
    }

    let last_seen = Utc::now();
    {
        let db = state.db.lock().await;
        if let Err(e) = db.set_last_seen(user_id, last_seen) {
            warn!(user = %user_id, error = %e, "failed to record last_seen on disconnect");
        }
    }

    info!(user = %user_id, "user offline");
    state
        .hub
        .broadcast(&ServerEvent::UserOffline(UserOffline { user_id, last_seen }));
}
