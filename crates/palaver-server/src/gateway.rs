//! HTTP surface: the WebSocket endpoint and the health probe.
//!
//! Authentication happens before the upgrade so unauthenticated clients get
//! a plain HTTP 401 instead of an immediately closed socket. Each accepted
//! connection runs two tasks: the read loop (this function) and a forward
//! task that drains the session's outbound channel and keeps the socket
//! alive with periodic pings.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use palaver_shared::constants::MAX_FRAME_SIZE;
use palaver_shared::protocol::ClientEvent;

use crate::auth::{self, AuthUser};
use crate::engine;
use crate::error::ServerError;
use crate::hub::{SessionId, SESSION_BUFFER};
use crate::presence;
use crate::signaling;
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// Upgrade handler. Resolves the identity from `?token=` or the
/// `Authorization: Bearer` header, enforces the connection cap, and only
/// then accepts the upgrade.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let token = match bearer_token(&query, &headers) {
        Some(token) => token,
        None => {
            return ServerError::Unauthorized("missing access token".into()).into_response();
        }
    };

    let user = match auth::verify_token(&state.config.jwt_secret, &token) {
        Ok(user) => user,
        Err(e) => {
            debug!(error = %e, "rejecting connection");
            return ServerError::Unauthorized(e.to_string()).into_response();
        }
    };

    let cap = state.config.max_connections;
    if cap > 0 && state.hub.session_count() >= cap {
        warn!(cap, "rejecting connection, server at capacity");
        return ServerError::AtCapacity.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

fn bearer_token(query: &WsQuery, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = &query.token {
        if !token.is_empty() {
            return Some(token.clone());
        }
    }

    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.to_string())
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user: AuthUser) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(SESSION_BUFFER);

    let (session, live_sessions) = state.hub.register(user.id, tx);
    info!(user = %user.id, %session, live_sessions, "session opened");

    let ping_interval = Duration::from_secs(state.config.ws_ping_interval_secs);
    let forward_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        ticker.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                frame = rx.recv() => {
                    let Some(frame) = frame else { break };
                    if sink.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    presence::session_connected(&state, session, user.id, live_sessions).await;

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(%session, error = %e, "socket read error");
                break;
            }
        };

        match frame {
            Message::Text(text) => {
                if text.len() > MAX_FRAME_SIZE {
                    warn!(%session, len = text.len(), "oversized frame dropped");
                    continue;
                }
                let event = match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        debug!(%session, error = %e, "unparseable frame dropped");
                        continue;
                    }
                };
                if let Err(e) = dispatch(&state, session, &user, event).await {
                    warn!(%session, error = %e, "event handler failed");
                }
            }
            Message::Close(_) => break,
            // Pongs and client pings need no handling beyond the transport.
            _ => {}
        }
    }

    info!(user = %user.id, %session, "session closed");
    presence::session_disconnected(&state, session).await;
    forward_task.abort();
}

async fn dispatch(
    state: &AppState,
    session: SessionId,
    user: &AuthUser,
    event: ClientEvent,
) -> Result<(), palaver_store::StoreError> {
    match event {
        ClientEvent::ChatJoin(chat_id) => engine::chat_join(state, session, user.id, chat_id).await,
        ClientEvent::TypingStart(p) => {
            engine::typing(state, session, user.id, p.chat_id, true);
            Ok(())
        }
        ClientEvent::TypingStop(p) => {
            engine::typing(state, session, user.id, p.chat_id, false);
            Ok(())
        }
        ClientEvent::MessageSend(p) => engine::message_send(state, session, user.id, p).await,
        ClientEvent::MessageDelivered(p) => {
            engine::message_delivered(state, session, user.id, p).await
        }
        ClientEvent::MessageRead(p) => engine::message_read(state, session, user.id, p).await,
        ClientEvent::MessageReact(p) => engine::message_react(state, session, user.id, p).await,
        ClientEvent::MessageDelete(p) => engine::message_delete(state, session, user.id, p).await,
        ClientEvent::MessageEdit(p) => engine::message_edit(state, session, user.id, p).await,
        ClientEvent::CallStart(p) => {
            signaling::call_start(state, session, user.id, p);
            Ok(())
        }
        ClientEvent::CallAnswer(p) => {
            signaling::call_answer(state, user.id, p);
            Ok(())
        }
        ClientEvent::CallIceCandidate(p) => {
            signaling::call_candidate(state, user.id, p);
            Ok(())
        }
        ClientEvent::CallEnd(p) => {
            signaling::call_end(state, user.id, p);
            Ok(())
        }
    }
}
