//! Broadcast of session activity to live observers.
//!
//! The session manager publishes every status change here; the HTTP layer
//! forwards them to WebSocket clients. Events
//! are fire-and-forget: with no subscribers they are simply dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Event type for a new [`crate::session::StatusSummary`].
pub const STATUS_EVENT: &str = "session:status";

/// Slow subscribers lag (and lose events) once this many are buffered.
const DEFAULT_CAPACITY: usize = 256;

/// An event type plus its JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl BroadcastEvent {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }
}

pub struct EventBus {
    sender: broadcast::Sender<BroadcastEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Serialize `payload` and send it to every subscriber.
    ///
    /// Returns how many subscribers received it.
    pub fn emit<T: Serialize>(&self, event_type: &str, payload: &T) -> usize {
        match serde_json::to_value(payload) {
            Ok(value) => self
                .sender
                .send(BroadcastEvent::new(event_type, value))
                .unwrap_or(0),
            Err(e) => {
                log::warn!("Failed to serialize {} payload: {}", event_type, e);
                0
            }
        }
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
