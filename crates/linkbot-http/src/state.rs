//! Shared state for the HTTP server.
//!
//! Read-only handles onto the session: the published status and the event
//! bus it is announced on.

use linkbot_core::event_bus::EventBus;
use linkbot_core::session::StatusStore;
use std::sync::Arc;

/// Shared state available to all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Latest session status, written by the session manager.
    pub store: StatusStore,
    /// Status and message events for WebSocket subscribers.
    pub event_bus: Arc<EventBus>,
}

impl AppState {
    pub fn new(store: StatusStore, event_bus: Arc<EventBus>) -> Self {
        Self { store, event_bus }
    }
}
