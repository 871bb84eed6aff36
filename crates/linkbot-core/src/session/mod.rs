//! Session lifecycle: the state machine, the manager that drives it, and the
//! status store the HTTP layer reads from.

mod manager;
mod state;
mod store;

pub use manager::{RecoveryPolicy, SessionError, SessionManager, DEFAULT_SETTLE_DELAY};
pub use state::{LifecycleEvent, Outcome, Session, SessionState};
pub use store::{SessionStatus, StatusStore, StatusSummary};
