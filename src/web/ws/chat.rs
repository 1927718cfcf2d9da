//! Chat WebSocket handler.
//!
//! Each socket gets one [`ChatSession`]. Inbound frames drive the session;
//! pushes arrive through the session's outbox and are written with a
//! bounded timeout. Every way out of the socket loop disconnects the
//! session.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::time::{sleep, Instant, MissedTickBehavior};

use crate::chat::{outbox, ChatSession, Identity};
use crate::web::dto::WsQuery;
use crate::web::error::ApiError;
use crate::web::handlers::{AppState, WsSettings};

use super::messages::{ClientMessage, ServerMessage, INVALID_MESSAGE, UNAVAILABLE};

type WsSink = SplitSink<WebSocket, Message>;

/// WebSocket chat handler.
///
/// GET /ws?token={jwt}
///
/// The token is verified before the upgrade; a missing or invalid token
/// answers 401 and no session is created.
pub async fn chat_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .ok_or_else(|| ApiError::unauthorized("Missing token"))?;
    let claims = state.jwt.verify(&token).map_err(|e| {
        tracing::debug!("WebSocket connection rejected: {}", e);
        ApiError::unauthorized("Invalid or expired token")
    })?;

    tracing::info!(
        "WebSocket connection from user {} ({})",
        claims.username,
        claims.sub
    );

    let identity = claims.identity();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, identity)))
}

/// Why the socket loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    ClientClosed,
    TransportError,
    IdleTimeout,
    WriteFailed,
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, identity: Identity) {
    let settings = state.ws;

    // Timers first: nothing between registration and the loop may fail.
    let mut heartbeat = tokio::time::interval_at(
        Instant::now() + settings.heartbeat_interval,
        settings.heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let idle = sleep(settings.idle_timeout);
    tokio::pin!(idle);

    let (tx, mut inbox) = outbox(settings.outbox_capacity);
    let mut session = ChatSession::new(Arc::clone(&state.service));
    let conn = session.id();
    let user = identity.user_id;

    if let Err(e) = session.authenticate(identity, tx).await {
        tracing::error!(conn = %conn, user, error = %e, "Failed to register connection");
        return;
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let reason = loop {
        tokio::select! {
            frame = ws_receiver.next() => {
                let Some(frame) = frame else {
                    break CloseReason::ClientClosed;
                };
                idle.as_mut().reset(Instant::now() + settings.idle_timeout);

                match frame {
                    Ok(Message::Text(text)) => {
                        if let Some(reply) = handle_client_frame(&session, &text).await {
                            if !write_json(&mut ws_sender, &reply, &settings).await {
                                break CloseReason::WriteFailed;
                            }
                        }
                    }
                    Ok(Message::Ping(data)) => {
                        let pong = Message::Pong(data);
                        if !write(&mut ws_sender, pong, settings.push_timeout).await {
                            break CloseReason::WriteFailed;
                        }
                    }
                    Ok(Message::Close(_)) => break CloseReason::ClientClosed,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(conn = %conn, "WebSocket error: {}", e);
                        break CloseReason::TransportError;
                    }
                }
            }

            Some(event) = inbox.recv() => {
                let push = ServerMessage::message_received(&event);
                if !write_json(&mut ws_sender, &push, &settings).await {
                    break CloseReason::WriteFailed;
                }
            }

            _ = heartbeat.tick() => {
                let ping = Message::Ping(Vec::new());
                if !write(&mut ws_sender, ping, settings.push_timeout).await {
                    break CloseReason::WriteFailed;
                }
            }

            _ = &mut idle => break CloseReason::IdleTimeout,
        }
    };

    session.disconnect().await;
    if reason != CloseReason::TransportError {
        let _ = tokio::time::timeout(settings.push_timeout, ws_sender.close()).await;
    }
    tracing::debug!(conn = %conn, user, ?reason, "WebSocket session ended");
}

/// Apply one client frame. Returns the reply to write, if any.
///
/// Ignored outcomes produce no reply.
async fn handle_client_frame(session: &ChatSession, text: &str) -> Option<ServerMessage> {
    let msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(conn = %session.id(), "Failed to parse client message: {}", e);
            return Some(ServerMessage::error(INVALID_MESSAGE, "Invalid message format"));
        }
    };

    let result = match msg {
        ClientMessage::Join { chat_id } => session.join(&chat_id).await.map(|_| ()),
        ClientMessage::Leave { chat_id } => session.leave(&chat_id).await.map(|_| ()),
        ClientMessage::Send { chat_id, text } => session.send(&chat_id, &text).await.map(|_| ()),
        ClientMessage::Ping => return Some(ServerMessage::Pong),
    };

    match result {
        Ok(()) => None,
        Err(e) => {
            tracing::warn!(conn = %session.id(), error = %e, "Chat operation failed");
            Some(ServerMessage::error(UNAVAILABLE, "Service temporarily unavailable"))
        }
    }
}

async fn write_json(ws_sender: &mut WsSink, msg: &ServerMessage, settings: &WsSettings) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => write(ws_sender, Message::Text(json), settings.push_timeout).await,
        Err(e) => {
            tracing::error!("Failed to serialize server message: {}", e);
            true
        }
    }
}

/// Write one frame within `limit`. Returns false if the connection should close.
async fn write(ws_sender: &mut WsSink, msg: Message, limit: Duration) -> bool {
    match tokio::time::timeout(limit, ws_sender.send(msg)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!("WebSocket write failed: {}", e);
            false
        }
        Err(_) => {
            tracing::warn!("WebSocket write timed out after {:?}", limit);
            false
        }
    }
}
