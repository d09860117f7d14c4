//! Call signaling relay.
//!
//! The server never inspects SDP or ICE payloads; it forwards them between
//! users' private rooms. Only the initial offer checks presence, so that the
//! caller gets a fast `call:failed` instead of ringing into the void. Later
//! frames relay unconditionally; a vanished peer simply receives nothing.

use tracing::debug;

use palaver_shared::protocol::{
    CallAccepted, CallAnswer, CallCandidate, CallCandidateRelay, CallEnded, CallHangup,
    CallIncoming, CallOffer, ErrorEvent, ServerEvent,
};
use palaver_shared::types::UserId;

use crate::hub::SessionId;
use crate::state::AppState;

const OFFLINE_ERROR: &str = "User is offline";

/// Relay a call offer, or fail fast if the callee has no live session.
pub fn call_start(state: &AppState, session: SessionId, from: UserId, payload: CallOffer) {
    if !state.hub.is_online(payload.to_user_id) {
        debug!(from = %from, to = %payload.to_user_id, "call to offline user");
        state.hub.send_to_session(
            session,
            &ServerEvent::CallFailed(ErrorEvent {
                message: OFFLINE_ERROR.into(),
            }),
        );
        return;
    }

    state.hub.send_to_user(
        payload.to_user_id,
        &ServerEvent::CallIncoming(CallIncoming {
            from,
            offer: payload.offer,
        }),
    );
}

/// Relay the callee's answer back to the caller.
pub fn call_answer(state: &AppState, from: UserId, payload: CallAnswer) {
    state.hub.send_to_user(
        payload.to_user_id,
        &ServerEvent::CallAccepted(CallAccepted {
            from,
            answer: payload.answer,
        }),
    );
}

/// Relay an ICE candidate to the peer.
pub fn call_candidate(state: &AppState, from: UserId, payload: CallCandidate) {
    state.hub.send_to_user(
        payload.to_user_id,
        &ServerEvent::CallIceCandidate(CallCandidateRelay {
            from,
            candidate: payload.candidate,
        }),
    );
}

/// Relay a hangup to the peer.
pub fn call_end(state: &AppState, from: UserId, payload: CallHangup) {
    state
        .hub
        .send_to_user(payload.to_user_id, &ServerEvent::CallEnded(CallEnded { from }));
}
