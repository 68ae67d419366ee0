//! Shared test utilities for integration and property tests.
//!
//! This module provides:
//! - A recording transport with configurable failures
//! - A settable session counter
//! - URL and config helpers

pub mod mock_host;

pub use mock_host::*;

use reverse_connect::ReverseConnectConfig;
use url::Url;

/// Parse a URL, panicking on bad test input.
pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

/// Config with explicit intervals in milliseconds and no clients.
#[allow(dead_code)]
pub fn config_with_intervals(connect_interval_ms: i64, connect_timeout_ms: i64, reject_timeout_ms: i64) -> ReverseConnectConfig {
    ReverseConnectConfig {
        connect_interval_ms,
        connect_timeout_ms,
        reject_timeout_ms,
        clients: Vec::new(),
    }
}
