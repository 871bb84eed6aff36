//! Shared, read-mostly view of the session for status consumers.
//!
//! The manager is the only writer. Every write replaces the whole
//! [`SessionStatus`] under one lock, so readers always see a state and QR
//! payload that belong together.

use super::state::{Session, SessionState};
use crate::client::ClientInfo;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};

/// Point-in-time snapshot of the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub pending_qr: Option<String>,
    pub info: Option<ClientInfo>,
    /// Inbound messages answered since startup.
    pub messages_handled: u64,
    /// Consecutive recoveries since the session was last authenticated.
    pub recovery_attempts: u32,
    /// Last lifecycle problem (auth failure, disconnect, fault), if any.
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SessionStatus {
    pub fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
            pending_qr: None,
            info: None,
            messages_handled: 0,
            recovery_attempts: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    /// Copy the lifecycle fields out of the state machine.
    pub(crate) fn sync_from(&mut self, session: &Session) {
        self.state = session.state();
        self.pending_qr = session.pending_qr().map(str::to_string);
        self.info = session.info().cloned();
        self.updated_at = Utc::now();
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// The view shown to status consumers. The QR payload itself is only
    /// reported as pending, never included.
    pub fn summary(&self) -> StatusSummary {
        StatusSummary {
            state: self.state,
            display_name: self.info.as_ref().map(|i| i.display_name.clone()),
            account_id: self.info.as_ref().and_then(|i| i.id.clone()),
            qr_pending: self.pending_qr.is_some(),
            messages_handled: self.messages_handled,
            recovery_attempts: self.recovery_attempts,
            last_error: self.last_error.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// Public projection of [`SessionStatus`], served by `/api/status` and
/// broadcast as `session:status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSummary {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub qr_pending: bool,
    pub messages_handled: u64,
    pub recovery_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle to the published session status.
#[derive(Debug, Clone, Default)]
pub struct StatusStore {
    inner: Arc<RwLock<SessionStatus>>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a consistent copy of the current status.
    pub fn snapshot(&self) -> SessionStatus {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the published status. In the daemon only the session manager
    /// calls this.
    pub fn publish(&self, status: SessionStatus) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = status;
    }
}
