//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::time;

use crate::db::store::NewMessage;
use crate::AppState;

use super::events::{InboundEvent, OutboundEvent, HEARTBEAT_INTERVAL_MS};
use super::registry::ConnectionHandle;

/// Close codes (4000-range for application-level).
const CLOSE_UNKNOWN_ERROR: u16 = 4000;
const CLOSE_NOT_JOINED: u16 = 4003;
const CLOSE_JOIN_FAILED: u16 = 4004;
const CLOSE_SUPERSEDED: u16 = 4005;
const CLOSE_TOO_SLOW: u16 = 4008;
const CLOSE_SESSION_TIMEOUT: u16 = 4009;

/// Timeout for receiving `join` after connection (seconds).
const JOIN_TIMEOUT_SECS: u64 = 10;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Step 1: the first frame must be `join`.
    let joined = time::timeout(Duration::from_secs(JOIN_TIMEOUT_SECS), await_join(&mut ws_rx)).await;
    let user_id = match joined {
        Ok(Ok(user_id)) => user_id,
        Ok(Err((code, reason))) => {
            tracing::debug!(%reason, "join handshake failed");
            let _ = send_close(&mut ws_tx, code, reason).await;
            return;
        }
        Err(_timeout) => {
            let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Handshake timeout").await;
            return;
        }
    };

    // Step 2: bind the connection. READY is the first queued event.
    let handle = state.hub.join(&user_id);
    tracing::info!(
        connection_id = %handle.id,
        user_id = %handle.user_id,
        "gateway connection established"
    );

    run_connection(&state, &handle, ws_tx, ws_rx).await;

    // Step 3: cleanup. A no-op if this connection was superseded.
    state.hub.connection_closed(&handle.id);
    tracing::info!(
        connection_id = %handle.id,
        user_id = %handle.user_id,
        dropped_events = handle.outbox().dropped(),
        "gateway connection ended"
    );
}

async fn await_join(ws_rx: &mut WsStream) -> Result<String, (u16, &'static str)> {
    while let Some(frame) = ws_rx.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => return Err((CLOSE_JOIN_FAILED, "Client closed")),
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(?e, "ws read error during join");
                return Err((CLOSE_JOIN_FAILED, "Read error"));
            }
        };

        return match serde_json::from_str::<InboundEvent>(&text) {
            Ok(InboundEvent::Join { user_id }) if !user_id.trim().is_empty() => {
                Ok(user_id.trim().to_string())
            }
            Ok(InboundEvent::Join { .. }) => Err((CLOSE_JOIN_FAILED, "User ID is required")),
            Ok(_) => Err((CLOSE_NOT_JOINED, "Expected join")),
            Err(_) => Err((CLOSE_UNKNOWN_ERROR, "Invalid event")),
        };
    }
    Err((CLOSE_JOIN_FAILED, "Connection closed before join"))
}

/// What the read side asks the loop to do next.
enum Flow {
    Continue,
    Leave,
}

/// Main connection loop: route client events to the hub, drain the outbox
/// to the socket, enforce the heartbeat deadline.
async fn run_connection(
    state: &AppState,
    handle: &Arc<ConnectionHandle>,
    mut ws_tx: WsSink,
    mut ws_rx: WsStream,
) {
    // Heartbeat deadline: client must heartbeat within 1.5× the interval.
    let heartbeat_deadline = Duration::from_millis(HEARTBEAT_INTERVAL_MS * 3 / 2);
    let mut heartbeat_timer = time::interval(heartbeat_deadline);
    heartbeat_timer.tick().await; // First tick fires immediately; skip it.
    let mut got_heartbeat = true;

    loop {
        tokio::select! {
            // Client sends us an event.
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let event = match serde_json::from_str::<InboundEvent>(&text) {
                            Ok(event) => event,
                            Err(e) => {
                                tracing::warn!(connection_id = %handle.id, error = %e, "malformed event dropped");
                                continue;
                            }
                        };
                        if matches!(event, InboundEvent::Heartbeat { .. }) {
                            got_heartbeat = true;
                        }
                        if let Flow::Leave = handle_event(state, handle, event) {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %handle.id, "ws read error");
                        break;
                    }
                    Some(Ok(_)) => continue,
                }
            }

            // Outbound event queued by the hub.
            next = handle.outbox().recv() => {
                match next {
                    Some(event) => {
                        let json = match event.to_json() {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::warn!(connection_id = %handle.id, error = %e, "outbound event not serializable");
                                continue;
                            }
                        };
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        // Outbox closed by the hub and fully drained.
                        let (code, reason) = if handle.is_superseded() {
                            (CLOSE_SUPERSEDED, "Session superseded")
                        } else {
                            (CLOSE_TOO_SLOW, "Outbound queue overflow")
                        };
                        let _ = send_close(&mut ws_tx, code, reason).await;
                        break;
                    }
                }
            }

            // Heartbeat timeout check.
            _ = heartbeat_timer.tick() => {
                if !got_heartbeat {
                    tracing::debug!(connection_id = %handle.id, "heartbeat timeout, closing connection");
                    let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Heartbeat timeout").await;
                    break;
                }
                got_heartbeat = false;
            }
        }
    }
}

/// Route one client event. Events acting for another user are dropped.
fn handle_event(state: &AppState, handle: &ConnectionHandle, event: InboundEvent) -> Flow {
    if let Some(actor) = event.actor() {
        if actor != handle.user_id {
            tracing::warn!(
                connection_id = %handle.id,
                user_id = %handle.user_id,
                actor = %actor,
                event = event.name(),
                "event for another user dropped"
            );
            return Flow::Continue;
        }
    }

    let draft = match &event {
        InboundEvent::SendMessage {
            room_id,
            sender_id,
            payload,
        } => NewMessage::from_payload(room_id, sender_id, payload),
        _ => None,
    };

    match event {
        InboundEvent::Heartbeat { seq } => {
            let _ = handle.deliver(Arc::new(OutboundEvent::HeartbeatAck { seq }));
        }
        InboundEvent::Join { .. } => {
            tracing::warn!(connection_id = %handle.id, "duplicate join dropped");
        }
        InboundEvent::Disconnect { .. } => return Flow::Leave,
        other => {
            let name = other.name();
            let delivered = state.hub.dispatch(other);
            tracing::debug!(connection_id = %handle.id, event = name, delivered, "event dispatched");
        }
    }

    // Persist after fan-out; delivery never waits on the store.
    if let Some(draft) = draft {
        let store = state.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.append(draft).await {
                tracing::error!(error = %e.message, "failed to persist realtime message");
            }
        });
    }

    Flow::Continue
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
