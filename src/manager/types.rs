//! Manager state types.
//!
//! # State Transitions
//!
//! ```text
//!              start()
//! Created ─────────────→ Running
//!    │                      │
//!    │ shutdown()           │ shutdown()
//!    ↓                      ↓
//!    └──────────────→ ShuttingDown ───→ Stopped
//! ```
//!
//! - **Created**: entries may be registered but nothing is scheduled.
//! - **Running**: the scheduler loop is armed whenever the registry is non-empty.
//! - **ShuttingDown**: scheduler and config watcher are being joined.
//! - **Stopped**: no further ticks; `add_connection` fails with `Shutdown`.

use crate::registry::ConnectionState;

/// Lifecycle state of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManagerState {
    #[default]
    Created,
    Running,
    ShuttingDown,
    Stopped,
}

impl ManagerState {
    /// Whether the manager no longer accepts new entries.
    pub fn is_terminating(&self) -> bool {
        matches!(self, ManagerState::ShuttingDown | ManagerState::Stopped)
    }
}

impl std::fmt::Display for ManagerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagerState::Created => write!(f, "Created"),
            ManagerState::Running => write!(f, "Running"),
            ManagerState::ShuttingDown => write!(f, "ShuttingDown"),
            ManagerState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Point-in-time summary of the manager for monitoring endpoints.
///
/// Built from in-memory state only; no I/O.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagerHealth {
    pub state: ManagerState,
    pub endpoints_total: usize,
    pub endpoints_enabled: usize,
    pub closed: usize,
    pub connecting: usize,
    pub connected: usize,
    pub rejected: usize,
    pub errored: usize,
    /// Whether a scheduler loop is currently armed
    pub scheduler_armed: bool,
}

impl ManagerHealth {
    pub(crate) fn count(&mut self, state: ConnectionState) {
        match state {
            ConnectionState::Closed => self.closed += 1,
            ConnectionState::Connecting => self.connecting += 1,
            ConnectionState::Connected => self.connected += 1,
            ConnectionState::Rejected => self.rejected += 1,
            ConnectionState::Errored => self.errored += 1,
        }
    }

    /// Running and holding at least one connected peer.
    pub fn healthy(&self) -> bool {
        self.state == ManagerState::Running && self.connected > 0
    }
}
