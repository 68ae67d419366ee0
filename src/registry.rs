// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connection registry: configured peers and their runtime state.
//!
//! # Entry Lifecycle
//!
//! ```text
//!            connect Ok            status good
//! Closed ─────────────→ Connecting ────────────→ Connected
//!   ↑  │                  │    │                    │
//!   │  │ connect Err      │    │ status bad         │ closed
//!   │  ↓                  │    │ (rejection)        │
//!   │ Errored             │    ↓                    │
//!   │                     │  Rejected               │
//!   │   status bad/closed │    │ cooldown elapsed   │
//!   └─────────────────────┴────┴────────────────────┘
//! ```
//!
//! The registry itself is a plain map. All access goes through the manager's
//! [`Monitor`], the single lock shared by the scheduler, the status handler and
//! the runtime API.

use crate::error::{ReverseConnectError, Result};
use crate::status::ChannelStatus;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Connection state of one entry.
///
/// See module docs for the transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection and no attempt in flight (initial state).
    Closed,
    /// Attempt started, waiting for the transport to report back.
    Connecting,
    /// Peer accepted the reverse connection.
    Connected,
    /// Peer refused the reverse connection; waiting out the cooldown.
    Rejected,
    /// The transport refused to start the attempt.
    Errored,
}

impl ConnectionState {
    /// Lowercase label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Rejected => "rejected",
            ConnectionState::Errored => "errored",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Closed => write!(f, "Closed"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Rejected => write!(f, "Rejected"),
            ConnectionState::Errored => write!(f, "Errored"),
        }
    }
}

/// One registered reverse-connect peer.
#[derive(Debug, Clone, PartialEq)]
pub struct ReverseConnectionEntry {
    /// Peer endpoint (registry key).
    pub url: Url,
    /// Connect timeout override. Zero uses the manager default.
    pub timeout: Duration,
    /// Session ceiling. `0` means unconstrained.
    pub max_session_count: u32,
    /// Whether the scheduler may attempt this entry.
    pub enabled: bool,
    /// `true` if loaded from configuration (replaced on reload),
    /// `false` if added through the API (kept across reloads).
    pub config_entry: bool,
    pub state: ConnectionState,
    /// When the peer last rejected us.
    pub reject_time: Option<Instant>,
    /// Most recent status reported for this entry.
    pub last_status: Option<ChannelStatus>,
}

impl ReverseConnectionEntry {
    pub fn new(
        url: Url,
        timeout: Duration,
        max_session_count: u32,
        enabled: bool,
        config_entry: bool,
    ) -> Self {
        Self {
            url,
            timeout,
            max_session_count,
            enabled,
            config_entry,
            state: ConnectionState::Closed,
            reject_time: None,
            last_status: None,
        }
    }

    /// Timeout for the next attempt, falling back to the manager default.
    pub fn effective_timeout(&self, default: Duration) -> Duration {
        if self.timeout.is_zero() {
            default
        } else {
            self.timeout
        }
    }

    /// Whether a rejected entry has waited out its cooldown at `now`.
    ///
    /// A rejected entry without a recorded reject time is treated as elapsed.
    pub fn cooldown_elapsed(&self, now: Instant, reject_timeout: Duration) -> bool {
        if self.state != ConnectionState::Rejected {
            return false;
        }
        match self.reject_time {
            Some(rejected_at) => now >= rejected_at + reject_timeout,
            None => true,
        }
    }

    /// Whether the scheduler should attempt this entry given the server's
    /// current session count.
    ///
    /// A single-session peer is only retried from `Closed`; an `Errored`
    /// single-session peer therefore stays put until something else moves it.
    pub fn is_eligible(&self, session_count: usize) -> bool {
        if !self.enabled {
            return false;
        }
        match self.max_session_count {
            0 => true,
            1 => self.state == ConnectionState::Closed,
            max => max as usize > session_count,
        }
    }

    /// Last status if it was a failure.
    pub fn last_error(&self) -> Option<&ChannelStatus> {
        self.last_status.as_ref().filter(|status| status.is_bad())
    }
}

/// The url → entry table.
///
/// Ordered by URL so every pass visits entries in the same order.
#[derive(Debug, Default)]
pub struct Registry {
    entries: BTreeMap<Url, ReverseConnectionEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new entry. Fails without mutation if the URL is present.
    pub fn insert(&mut self, entry: ReverseConnectionEntry) -> Result<()> {
        if self.entries.contains_key(&entry.url) {
            return Err(ReverseConnectError::DuplicateEntry {
                url: entry.url.to_string(),
            });
        }
        self.entries.insert(entry.url.clone(), entry);
        Ok(())
    }

    pub fn remove(&mut self, url: &Url) -> Option<ReverseConnectionEntry> {
        self.entries.remove(url)
    }

    pub fn contains(&self, url: &Url) -> bool {
        self.entries.contains_key(url)
    }

    pub fn get(&self, url: &Url) -> Option<&ReverseConnectionEntry> {
        self.entries.get(url)
    }

    pub fn get_mut(&mut self, url: &Url) -> Option<&mut ReverseConnectionEntry> {
        self.entries.get_mut(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReverseConnectionEntry> {
        self.entries.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ReverseConnectionEntry> {
        self.entries.values_mut()
    }

    /// Copy of the current table.
    pub fn snapshot(&self) -> BTreeMap<Url, ReverseConnectionEntry> {
        self.entries.clone()
    }

    /// Drop every configuration-originated entry. Returns how many were removed.
    pub fn clear_config_entries(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.config_entry);
        before - self.entries.len()
    }
}

/// The one lock around manager state.
///
/// A panic inside a critical section poisons the mutex; the state is still
/// consistent entry by entry, so the guard is recovered instead of propagating.
#[derive(Debug, Default)]
pub struct Monitor<T> {
    inner: Mutex<T>,
}

impl<T> Monitor<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
