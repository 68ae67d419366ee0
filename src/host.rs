// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Host server integration traits.
//!
//! The manager never talks to the network itself. The host server provides:
//!
//! - a [`ReverseConnectTransport`] that starts a reverse connect attempt, and
//! - a [`SessionCounter`] that reports how many sessions are currently open.
//!
//! In the other direction the transport reports channel status changes back
//! through [`ConnectionStatusListener`], which the manager implements.
//!
//! # Example
//!
//! ```rust
//! use reverse_connect::host::{ReverseConnectTransport, SessionCounter, TransportResult};
//! use std::time::Duration;
//! use url::Url;
//!
//! struct MyServer { /* ... */ }
//!
//! impl ReverseConnectTransport for MyServer {
//!     fn connect(&self, _url: &Url, _timeout: Duration) -> TransportResult<()> {
//!         // Queue the outbound hello; the outcome arrives later as a status event
//!         Ok(())
//!     }
//! }
//!
//! impl SessionCounter for MyServer {
//!     fn current_session_count(&self) -> usize {
//!         0
//!     }
//! }
//! ```

use crate::status::ChannelStatus;
use std::time::Duration;
use url::Url;

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Failure reported synchronously by the transport when starting an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TransportError {}

/// Starts outbound reverse connections.
///
/// `connect` must not block on I/O: it only kicks off the attempt. The real
/// outcome is reported later via [`ConnectionStatusListener::on_status_changed`].
/// It is called without the registry lock held, so an implementation may report
/// status synchronously from inside `connect`.
pub trait ReverseConnectTransport: Send + Sync + 'static {
    fn connect(&self, url: &Url, timeout: Duration) -> TransportResult<()>;
}

/// Reports the number of sessions currently open on the host server.
pub trait SessionCounter: Send + Sync + 'static {
    fn current_session_count(&self) -> usize;
}

/// Receives channel status changes from the transport layer.
///
/// May be called from any thread at any time, including concurrently with a
/// scheduler pass.
pub trait ConnectionStatusListener: Send + Sync {
    fn on_status_changed(&self, url: &Url, status: ChannelStatus, closed: bool);
}

/// Transport that accepts every attempt and never reports back.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpTransport;

impl ReverseConnectTransport for NoOpTransport {
    fn connect(&self, _url: &Url, _timeout: Duration) -> TransportResult<()> {
        Ok(())
    }
}

/// Session counter for a server with no sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSessions;

impl SessionCounter for NoSessions {
    fn current_session_count(&self) -> usize {
        0
    }
}
