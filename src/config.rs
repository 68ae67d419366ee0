// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the reverse-connect manager.
//!
//! The host server loads this from its own configuration file and hands it to
//! [`ReverseConnectManager::new()`](crate::ReverseConnectManager::new). Later
//! reloads are pushed through the `watch` channel given at construction.
//!
//! # Configuration Structure
//!
//! ```text
//! ReverseConnectConfig
//! ├── connect_interval_ms: i64   # Scheduler period
//! ├── connect_timeout_ms: i64    # Default per-attempt timeout
//! ├── reject_timeout_ms: i64     # Cooldown after a peer rejects us
//! └── clients: Vec<ClientConfig> # Peers to reverse-connect to
//! ```
//!
//! Interval values ≤ 0 fall back to their defaults, see [`ManagerSettings`].
//!
//! # YAML Example
//!
//! ```yaml
//! connect_interval_ms: 15000
//! connect_timeout_ms: 30000
//! reject_timeout_ms: 60000
//! clients:
//!   - endpoint_url: "opc.tcp://client1:4840"
//!     timeout_ms: 5000
//!     max_session_count: 1
//!     enabled: true
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default scheduler period (15 seconds).
pub const DEFAULT_CONNECT_INTERVAL: Duration = Duration::from_millis(15_000);

/// Default connect attempt timeout (30 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Default cooldown after a rejection (60 seconds).
pub const DEFAULT_REJECT_TIMEOUT: Duration = Duration::from_millis(60_000);

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// Reverse-connect section of the server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseConnectConfig {
    /// How often the scheduler walks the registry (ms).
    #[serde(default = "default_connect_interval_ms")]
    pub connect_interval_ms: i64,

    /// Connect timeout for entries without their own override (ms).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: i64,

    /// How long a rejected entry waits before it is retried (ms).
    #[serde(default = "default_reject_timeout_ms")]
    pub reject_timeout_ms: i64,

    /// Peers to reverse-connect to.
    #[serde(default)]
    pub clients: Vec<ClientConfig>,
}

fn default_connect_interval_ms() -> i64 {
    DEFAULT_CONNECT_INTERVAL.as_millis() as i64
}

fn default_connect_timeout_ms() -> i64 {
    DEFAULT_CONNECT_TIMEOUT.as_millis() as i64
}

fn default_reject_timeout_ms() -> i64 {
    DEFAULT_REJECT_TIMEOUT.as_millis() as i64
}

impl Default for ReverseConnectConfig {
    fn default() -> Self {
        Self {
            connect_interval_ms: default_connect_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reject_timeout_ms: default_reject_timeout_ms(),
            clients: Vec::new(),
        }
    }
}

impl ReverseConnectConfig {
    /// Create a config with the given clients and default intervals.
    pub fn with_clients(clients: Vec<ClientConfig>) -> Self {
        Self {
            clients,
            ..Default::default()
        }
    }

    /// Resolve the manager-wide intervals.
    pub fn settings(&self) -> ManagerSettings {
        ManagerSettings::from_config(self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ClientConfig: one entry per peer
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for a single reverse-connect peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Peer endpoint, e.g. `"opc.tcp://client1:4840"`.
    /// Entries that fail to parse are dropped at load time.
    pub endpoint_url: String,

    /// Per-peer connect timeout (ms). `0` uses the manager default.
    #[serde(default)]
    pub timeout_ms: u64,

    /// Session ceiling for this peer. `0` means unconstrained.
    #[serde(default)]
    pub max_session_count: u32,

    /// Whether the scheduler may connect to this peer.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl ClientConfig {
    /// Client config for testing: default timeout, unconstrained, enabled.
    pub fn for_testing(endpoint_url: &str) -> Self {
        Self {
            endpoint_url: endpoint_url.to_string(),
            timeout_ms: 0,
            max_session_count: 0,
            enabled: true,
        }
    }

    /// Per-peer timeout as a Duration (zero = manager default).
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ManagerSettings: resolved intervals
// ═══════════════════════════════════════════════════════════════════════════════

/// Manager-wide intervals after default resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    pub connect_interval: Duration,
    pub connect_timeout: Duration,
    pub reject_timeout: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            connect_interval: DEFAULT_CONNECT_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reject_timeout: DEFAULT_REJECT_TIMEOUT,
        }
    }
}

impl ManagerSettings {
    /// Resolve settings from config. Values ≤ 0 use the defaults.
    pub fn from_config(config: &ReverseConnectConfig) -> Self {
        Self {
            connect_interval: millis_or(config.connect_interval_ms, DEFAULT_CONNECT_INTERVAL),
            connect_timeout: millis_or(config.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT),
            reject_timeout: millis_or(config.reject_timeout_ms, DEFAULT_REJECT_TIMEOUT),
        }
    }
}

fn millis_or(value: i64, fallback: Duration) -> Duration {
    if value > 0 {
        Duration::from_millis(value as u64)
    } else {
        fallback
    }
}
