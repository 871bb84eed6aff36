//! WebSocket handler for real-time session status.
//!
//! Clients connect to `/ws/events`, immediately receive the current status,
//! then every `session:status` event from the EventBus. The payload is the
//! same [`StatusSummary`] that `/api/status` serves. Anything else on the bus
//! stays off the socket, and client messages are ignored.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use linkbot_core::event_bus::{BroadcastEvent, STATUS_EVENT};
use linkbot_core::session::StatusSummary;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::AppState;

/// WebSocket event message sent to client.
#[derive(Serialize)]
struct WsEvent {
    event_type: String,
    payload: serde_json::Value,
}

impl From<BroadcastEvent> for WsEvent {
    fn from(event: BroadcastEvent) -> Self {
        Self {
            event_type: event.event_type,
            payload: event.payload,
        }
    }
}

/// Handler for GET /ws/events
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

fn is_forwarded(event: &BroadcastEvent) -> bool {
    event.event_type == STATUS_EVENT
}

/// The current status, framed like a bus event.
fn initial_event(state: &AppState) -> Option<WsEvent> {
    let summary: StatusSummary = state.store.snapshot().summary();
    serde_json::to_value(summary)
        .map(|payload| WsEvent {
            event_type: STATUS_EVENT.to_string(),
            payload,
        })
        .map_err(|e| log::warn!("Failed to serialize status snapshot: {}", e))
        .ok()
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before taking the snapshot so no change slips in between.
    let mut event_rx = state.event_bus.subscribe();

    if let Some(event) = initial_event(&state) {
        if let Ok(json) = serde_json::to_string(&event) {
            if sender.send(Message::Text(json.into())).await.is_err() {
                return;
            }
        }
    }

    // Drain client frames so close and ping are handled.
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    let send_task = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    if !is_forwarded(&event) {
                        continue;
                    }
                    if let Ok(json) = serde_json::to_string(&WsEvent::from(event)) {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break; // Client disconnected
                        }
                    }
                }
                Err(RecvError::Lagged(count)) => {
                    log::warn!("WebSocket client lagged by {} events", count);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::select! {
        _ = recv_task => {},
        _ = send_task => {},
    }

    log::debug!("WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkbot_core::event_bus::EventBus;
    use linkbot_core::session::{SessionState, SessionStatus, StatusStore};

    fn state_with(status: SessionStatus) -> AppState {
        let store = StatusStore::new();
        store.publish(status);
        AppState::new(store, Arc::new(EventBus::new()))
    }

    #[test]
    fn only_status_events_are_forwarded() {
        let status = BroadcastEvent::new(STATUS_EVENT, serde_json::json!({"state": "ready"}));
        let other = BroadcastEvent::new("session:message", serde_json::json!({"from": "1@c.us"}));
        assert!(is_forwarded(&status));
        assert!(!is_forwarded(&other));
    }

    #[test]
    fn ws_event_from_broadcast() {
        let event = BroadcastEvent::new(STATUS_EVENT, serde_json::json!({"state": "disconnected"}));
        let json = serde_json::to_value(WsEvent::from(event)).unwrap();
        assert_eq!(json["event_type"], "session:status");
        assert_eq!(json["payload"]["state"], "disconnected");
    }

    #[test]
    fn initial_event_is_current_status() {
        let state = state_with(SessionStatus::new());
        let event = initial_event(&state).unwrap();
        assert_eq!(event.event_type, STATUS_EVENT);
        assert_eq!(event.payload["state"], "uninitialized");
        assert_eq!(event.payload["qr_pending"], false);
    }

    #[test]
    fn initial_event_matches_api_status_projection() {
        let status = SessionStatus {
            state: SessionState::AwaitingQr,
            pending_qr: Some("secret-qr".to_string()),
            ..SessionStatus::new()
        };
        let expected = serde_json::to_value(status.summary()).unwrap();
        let state = state_with(status);

        let event = initial_event(&state).unwrap();
        assert_eq!(event.payload, expected);
        assert_eq!(event.payload["qr_pending"], true);
        assert!(event.payload.get("pending_qr").is_none());
        assert!(!event.payload.to_string().contains("secret-qr"));
    }
}
