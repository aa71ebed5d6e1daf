//! Realtime HTTP Routes and WebSocket Handler
//!
//! Clients subscribe to invalidation tuples over a WebSocket. A new
//! session sees everything visible to its principal; `subscribe` messages
//! may narrow that interest but never widen it.

use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::Principal;
use crate::errors::MasterError;
use crate::invalidation::{Interest, InvalidationTuple, SessionInfo, SessionKind};

use super::state::{master_error, ApiError, ApiState};

// ==================
// Message Types
// ==================

/// Message from client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Replace the session's interest; must lie within what the principal sees
    Subscribe {
        #[serde(default)]
        interest: Interest,
    },
    Ping,
}

/// Message to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected { session: Uuid, interest: Interest },
    Subscribed { interest: Interest },
    Invalidate { tuple: InvalidationTuple },
    Pong,
    Error { code: String, message: String },
}

// ==================
// Realtime Routes
// ==================

/// Create realtime routes with WebSocket support
pub fn realtime_routes(state: ApiState) -> Router {
    Router::new()
        .route("/invalidations", get(websocket_handler))
        .route("/sessions", get(sessions_handler))
        .with_state(state)
}

/// Connected sessions; global operators only
async fn sessions_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Vec<SessionInfo>>, ApiError> {
    let principal = state.authenticate(&headers)?;
    if !principal.is_global_operator() {
        return Err(master_error(MasterError::deny(format!(
            "{} may not list sessions: not a global operator",
            principal.username
        ))));
    }
    Ok(Json(state.manager.broadcaster().sessions()))
}

// ==================
// WebSocket Handler
// ==================

/// Authenticate, then upgrade
///
/// Browsers cannot set headers on a WebSocket handshake, so the token may
/// also come as `?token=`.
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = match query.get("token") {
        Some(token) => state.authenticate_token(token)?,
        None => state.authenticate(&headers)?,
    };
    let visible = state
        .manager
        .store()
        .read(|t| principal.visible_interest(t))
        .map_err(|e| master_error(e.into()))?
        .map_err(master_error)?;

    Ok(ws.on_upgrade(move |socket| handle_websocket(socket, state, principal, visible)))
}

/// Handle individual WebSocket connection
async fn handle_websocket(socket: WebSocket, state: ApiState, principal: Principal, visible: Interest) {
    let broadcaster = state.manager.broadcaster().clone();
    let (session, mut tuples) = broadcaster.connect(
        SessionKind::Client {
            username: principal.username.clone(),
        },
        visible.clone(),
    );

    let (mut sender, mut receiver) = socket.split();

    let welcome = ServerMessage::Connected {
        session,
        interest: visible.clone(),
    };
    if send(&mut sender, &welcome).await.is_err() {
        broadcaster.disconnect(session);
        return;
    }

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let reply = match incoming {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Subscribe { interest }) => {
                            match visible.narrow(&interest) {
                                Ok(narrowed) => match broadcaster.set_interest(session, narrowed.clone()) {
                                    Ok(()) => ServerMessage::Subscribed { interest: narrowed },
                                    Err(e) => ServerMessage::Error {
                                        code: e.code().to_string(),
                                        message: e.to_string(),
                                    },
                                },
                                Err(e) => ServerMessage::Error {
                                    code: e.code().to_string(),
                                    message: e.to_string(),
                                },
                            }
                        }
                        Ok(ClientMessage::Ping) => ServerMessage::Pong,
                        Err(e) => ServerMessage::Error {
                            code: "INVALID_MESSAGE".to_string(),
                            message: format!("Invalid message format: {}", e),
                        },
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                if send(&mut sender, &reply).await.is_err() {
                    break;
                }
            }

            tuple = tuples.recv() => {
                match tuple {
                    Some(tuple) => {
                        if send(&mut sender, &ServerMessage::Invalidate { tuple }).await.is_err() {
                            break;
                        }
                    }
                    // dropped by the broadcaster
                    None => break,
                }
            }
        }
    }

    broadcaster.disconnect(session);
}

async fn send<S>(sender: &mut S, message: &ServerMessage) -> Result<(), ()>
where
    S: futures_util::Sink<Message> + Unpin,
{
    let json = serde_json::to_string(message).map_err(|_| ())?;
    sender.send(Message::Text(json)).await.map_err(|_| ())
}
