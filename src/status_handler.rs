//! Maps transport status events onto registry entries.
//!
//! | Status | `closed` | New state |
//! |--------|----------|-----------|
//! | bad, reverse-connect rejection | any | `Rejected` (reject time = now) |
//! | bad, any other code | any | `Closed` |
//! | good | `false` | `Connected` |
//! | good | `true` | `Closed` |
//!
//! The status is stored on the entry in every case.

use crate::registry::{ConnectionState, Registry};
use crate::status::ChannelStatus;
use tokio::time::Instant;
use url::Url;

/// A status change reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub endpoint_url: Url,
    pub channel_status: ChannelStatus,
    pub closed: bool,
}

/// Outcome of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    /// No entry for the URL; nothing changed.
    UnknownEndpoint,
    Applied {
        previous: ConnectionState,
        current: ConnectionState,
    },
}

/// State an entry moves to for the given status.
pub fn next_state(status: &ChannelStatus, closed: bool) -> ConnectionState {
    if status.is_bad() {
        if status.code.is_reverse_connect_rejection() {
            ConnectionState::Rejected
        } else {
            ConnectionState::Closed
        }
    } else if closed {
        ConnectionState::Closed
    } else {
        ConnectionState::Connected
    }
}

/// Apply `event` to the matching entry, stamping rejections with `now`.
pub fn apply(registry: &mut Registry, event: &StatusEvent, now: Instant) -> StatusOutcome {
    let Some(entry) = registry.get_mut(&event.endpoint_url) else {
        return StatusOutcome::UnknownEndpoint;
    };

    let previous = entry.state;
    let current = next_state(&event.channel_status, event.closed);
    if current == ConnectionState::Rejected {
        entry.reject_time = Some(now);
    }
    entry.state = current;
    entry.last_status = Some(event.channel_status.clone());

    StatusOutcome::Applied { previous, current }
}
