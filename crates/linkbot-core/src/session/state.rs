//! Session lifecycle state machine.
//!
//! [`Session::apply`] is the only way the lifecycle state changes. It is a pure
//! function of the current state and the incoming [`LifecycleEvent`]; the
//! manager interprets the returned [`Outcome`] (for example by starting the
//! recovery protocol).

use crate::client::ClientInfo;
use serde::{Deserialize, Serialize};

/// Where the session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No client exists yet (startup, or between recovery and recreation).
    Uninitialized,
    /// A client is initializing and waiting for the QR code to be scanned.
    AwaitingQr,
    /// The client is linked and handling messages.
    Authenticated,
    /// The client was lost; recovery is underway.
    Disconnected,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::AwaitingQr => "awaiting_qr",
            SessionState::Authenticated => "authenticated",
            SessionState::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A client was created and asked to initialize.
    Startup,
    Qr(String),
    Ready(ClientInfo),
    AuthFailure(String),
    Disconnected(String),
    /// Process-level failure of the client, valid from any state.
    Fault(String),
    /// Recovery finished tearing down the old client.
    Reset,
}

impl LifecycleEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::Startup => "startup",
            LifecycleEvent::Qr(_) => "qr",
            LifecycleEvent::Ready(_) => "ready",
            LifecycleEvent::AuthFailure(_) => "auth_failure",
            LifecycleEvent::Disconnected(_) => "disconnected",
            LifecycleEvent::Fault(_) => "fault",
            LifecycleEvent::Reset => "reset",
        }
    }

    /// Human-readable problem description carried by failure events.
    pub fn problem(&self) -> Option<String> {
        match self {
            LifecycleEvent::AuthFailure(reason) => Some(format!("authentication failed: {reason}")),
            LifecycleEvent::Disconnected(reason) => Some(format!("disconnected: {reason}")),
            LifecycleEvent::Fault(reason) => Some(format!("session client fault: {reason}")),
            _ => None,
        }
    }
}

/// What the caller must do after applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No transition exists for this (state, event) pair.
    Ignored,
    /// The state (or pending QR) changed.
    Changed,
    /// The state changed and the current client must be torn down and recreated.
    Recover,
}

/// Lifecycle state plus the data that only exists in particular states.
///
/// `pending_qr` is only ever `Some` while the state is `AwaitingQr`, and
/// `info` only while it is `Authenticated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    state: SessionState,
    pending_qr: Option<String>,
    info: Option<ClientInfo>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
            pending_qr: None,
            info: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn pending_qr(&self) -> Option<&str> {
        self.pending_qr.as_deref()
    }

    pub fn info(&self) -> Option<&ClientInfo> {
        self.info.as_ref()
    }

    /// Apply an event and report what the caller has to do next.
    pub fn apply(&mut self, event: LifecycleEvent) -> Outcome {
        use LifecycleEvent as E;
        use SessionState as S;

        match (self.state, event) {
            (S::Uninitialized, E::Startup) => {
                self.enter(S::AwaitingQr, None, None);
                Outcome::Changed
            }
            (S::AwaitingQr, E::Qr(payload)) => {
                self.pending_qr = Some(payload);
                Outcome::Changed
            }
            (S::AwaitingQr, E::Ready(info)) => {
                self.enter(S::Authenticated, None, Some(info));
                Outcome::Changed
            }
            (S::AwaitingQr, E::AuthFailure(_)) => {
                self.pending_qr = None;
                Outcome::Changed
            }
            (S::Authenticated, E::Disconnected(_)) | (_, E::Fault(_)) => {
                self.enter(S::Disconnected, None, None);
                Outcome::Recover
            }
            (S::Disconnected, E::Reset) => {
                self.enter(S::Uninitialized, None, None);
                Outcome::Changed
            }
            _ => Outcome::Ignored,
        }
    }

    fn enter(&mut self, state: SessionState, pending_qr: Option<String>, info: Option<ClientInfo>) {
        self.state = state;
        self.pending_qr = pending_qr;
        self.info = info;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
