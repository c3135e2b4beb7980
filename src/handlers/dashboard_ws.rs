//! WebSocket fan-out of dashboard events
//!
//! `GET /ws` streams every `DashboardEvent` as `{"type": ..., "data": ...}`.
//! Clients may send `{"action": "ping"}` and get `{"type": "pong"}` back.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::AppState;

const HEARTBEAT_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct ClientMessage {
    action: String,
}

/// Control frames sent outside the event stream
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ControlMessage {
    Connected { tracking_active: usize },
    Pong,
}

/// GET /ws
pub async fn dashboard_websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    // Subscribe before greeting so nothing published in between is lost
    let mut events = state.events.subscribe();

    info!(subscribers = state.events.subscriber_count(), "Dashboard WebSocket connected");

    let hello = ControlMessage::Connected {
        tracking_active: state.tracking.active_count(),
    };
    if send_json(&mut sender, &hello).await.is_err() {
        return;
    }

    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));

    loop {
        tokio::select! {
            result = events.recv() => {
                match result {
                    Ok(event) => {
                        if let Err(e) = send_json(&mut sender, &event).await {
                            debug!("WebSocket send error: {}", e);
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Dashboard client missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Event bus closed");
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if let Err(e) = sender.send(Message::Ping(axum::body::Bytes::new())).await {
                    debug!("Heartbeat failed: {}", e);
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(req) = serde_json::from_str::<ClientMessage>(&text) {
                            if req.action == "ping" && send_json(&mut sender, &ControlMessage::Pong).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Dashboard WebSocket closed by client");
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket receive error: {}", e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }
        }
    }

    debug!("Dashboard WebSocket connection closed");
}

async fn send_json<T: Serialize>(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    value: &T,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(value) {
        Ok(text) => text,
        Err(e) => {
            // Skip the frame, keep the connection
            warn!("Failed to serialize WebSocket message: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}
