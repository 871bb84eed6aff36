//! SessionManager - owns the session client and keeps it alive.
//!
//! The manager runs one dispatch loop per client. It creates the client with
//! a fresh event channel, initializes it, and feeds every event through the
//! state machine in [`super::state`]. When the state machine asks for
//! recovery the client is destroyed (errors are logged and ignored), the
//! manager waits the settling delay, and a new client bound to the same
//! identity takes its place.

use super::state::{LifecycleEvent, Outcome, Session, SessionState};
use super::store::{SessionStatus, StatusStore};
use crate::client::{ClientError, ClientEvent, ClientFactory, InboundMessage, SessionClient, SessionIdentity};
use crate::event_bus::{EventBus, STATUS_EVENT};
use crate::reply::ReplyEngine;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// Buffered client events before the client's sends start waiting.
const EVENT_CAPACITY: usize = 64;

/// Default wait before recreating a client, so the previous one can release
/// its browser profile lock and file handles.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// How the manager retries after losing its client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub settle_delay: Duration,
    /// Give up after this many consecutive recoveries without reaching
    /// `Authenticated`. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            max_attempts: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Gave up recreating the session client after {0} consecutive attempts")]
    RecoveryExhausted(u32),
}

/// Why a client's dispatch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientExit {
    Recover,
    Shutdown,
}

/// Drives a single session client through its lifecycle.
///
/// Owns the lifecycle state exclusively; readers go through the
/// [`StatusStore`] returned by [`SessionManager::status_store`].
pub struct SessionManager {
    identity: SessionIdentity,
    factory: Arc<dyn ClientFactory>,
    engine: ReplyEngine,
    policy: RecoveryPolicy,
    send_timeout: Option<Duration>,
    session: Session,
    status: SessionStatus,
    store: StatusStore,
    event_bus: Arc<EventBus>,
}

impl SessionManager {
    pub fn new(identity: SessionIdentity, factory: Arc<dyn ClientFactory>, engine: ReplyEngine) -> Self {
        Self {
            identity,
            factory,
            engine,
            policy: RecoveryPolicy::default(),
            send_timeout: None,
            session: Session::new(),
            status: SessionStatus::new(),
            store: StatusStore::new(),
            event_bus: Arc::new(EventBus::new()),
        }
    }

    pub fn with_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bound every outbound send. Unbounded by default.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn status_store(&self) -> StatusStore {
        self.store.clone()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    /// Run until `shutdown` flips to `true`.
    ///
    /// Only returns an error when a `max_attempts` cap is configured and
    /// exhausted; otherwise the manager recovers forever.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), SessionError> {
        log::info!(
            "Session manager starting for client '{}' (data dir {})",
            self.identity.client_id,
            self.identity.data_dir.display()
        );

        loop {
            if self.run_client(&mut shutdown).await == ClientExit::Shutdown {
                log::info!("Session manager stopped");
                return Ok(());
            }

            if let Some(max) = self.policy.max_attempts {
                if self.status.recovery_attempts >= max {
                    log::error!("Session client failed {} times in a row, giving up", max);
                    return Err(SessionError::RecoveryExhausted(max));
                }
            }
            self.status.recovery_attempts += 1;
            self.publish();

            log::info!(
                "Recreating session client in {:?} (attempt {})",
                self.policy.settle_delay,
                self.status.recovery_attempts
            );
            tokio::select! {
                _ = tokio::time::sleep(self.policy.settle_delay) => {}
                _ = wait_for_shutdown(&mut shutdown) => {
                    log::info!("Session manager stopped during recovery");
                    return Ok(());
                }
            }

            self.apply(LifecycleEvent::Reset);
        }
    }

    /// Create, initialize and serve one client until it needs replacing.
    async fn run_client(&mut self, shutdown: &mut watch::Receiver<bool>) -> ClientExit {
        let (tx, mut rx) = mpsc::channel(EVENT_CAPACITY);

        let mut client = match self.factory.create(&self.identity, tx) {
            Ok(client) => client,
            Err(e) => {
                log::error!("Failed to create session client: {}", e);
                self.apply(LifecycleEvent::Fault(e.to_string()));
                return ClientExit::Recover;
            }
        };

        self.apply(LifecycleEvent::Startup);

        if let Err(e) = client.initialize().await {
            log::error!("Failed to initialize session client: {}", e);
            self.apply(LifecycleEvent::Fault(e.to_string()));
            release(client).await;
            return ClientExit::Recover;
        }

        let exit = loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else {
                        self.apply(LifecycleEvent::Fault("event stream closed".to_string()));
                        break ClientExit::Recover;
                    };
                    if self.handle_event(client.as_mut(), event).await == Outcome::Recover {
                        break ClientExit::Recover;
                    }
                }
                _ = wait_for_shutdown(shutdown) => break ClientExit::Shutdown,
            }
        };

        release(client).await;
        exit
    }

    async fn handle_event(&mut self, client: &mut dyn SessionClient, event: ClientEvent) -> Outcome {
        log::debug!("Session client event: {}", event.kind());

        let lifecycle = match event {
            ClientEvent::Message(message) => {
                self.handle_message(client, message).await;
                return Outcome::Ignored;
            }
            ClientEvent::Qr(payload) => {
                log::info!("QR code received, waiting for scan");
                LifecycleEvent::Qr(payload)
            }
            ClientEvent::Ready(info) => {
                log::info!("Session client ready as '{}'", info.display_name);
                LifecycleEvent::Ready(info)
            }
            ClientEvent::AuthFailure(reason) => {
                log::warn!("Authentication failed: {} (waiting for a new QR)", reason);
                LifecycleEvent::AuthFailure(reason)
            }
            ClientEvent::Disconnected(reason) => {
                log::warn!("Session client disconnected: {}", reason);
                LifecycleEvent::Disconnected(reason)
            }
            ClientEvent::Fault(reason) => {
                log::error!("Session client fault: {}", reason);
                LifecycleEvent::Fault(reason)
            }
        };

        self.apply(lifecycle)
    }

    async fn handle_message(&mut self, client: &mut dyn SessionClient, message: InboundMessage) {
        if !message.wants_reply() {
            log::debug!("Skipping message from {} (own, status or empty)", message.from);
            return;
        }

        let reply = self.engine.respond(&message.body);
        log::debug!("Replying to {}", message.from);

        let sent = match self.send_timeout {
            Some(limit) => tokio::time::timeout(limit, client.send_message(&message.from, &reply))
                .await
                .unwrap_or(Err(ClientError::Timeout(limit))),
            None => client.send_message(&message.from, &reply).await,
        };

        if let Err(e) = sent {
            log::warn!("Failed to send reply to {}: {}", message.from, e);
            return;
        }

        self.status.messages_handled += 1;
        self.publish();
    }

    /// Feed an event to the state machine and publish the result.
    fn apply(&mut self, event: LifecycleEvent) -> Outcome {
        let from = self.session.state();
        let kind = event.kind();
        let problem = event.problem();

        let outcome = self.session.apply(event);
        if outcome == Outcome::Ignored {
            log::debug!("Ignoring {} event in state {}", kind, from);
            return outcome;
        }

        let to = self.session.state();
        if from != to {
            log::info!("Session state {} -> {}", from, to);
        }
        if to == SessionState::Authenticated {
            self.status.recovery_attempts = 0;
            self.status.last_error = None;
        }
        if problem.is_some() {
            self.status.last_error = problem;
        }

        self.publish();
        outcome
    }

    fn publish(&mut self) {
        self.status.sync_from(&self.session);
        self.store.publish(self.status.clone());
        self.event_bus.emit(STATUS_EVENT, &self.status.summary());
    }
}

/// Best-effort teardown; the follow-on recreation proceeds regardless.
async fn release(mut client: Box<dyn SessionClient>) {
    if let Err(e) = client.destroy().await {
        log::warn!("Failed to destroy session client, continuing: {}", e);
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // Sender gone: nobody can ask us to stop any more.
            std::future::pending::<()>().await;
        }
    }
}
