//! Capability trait through which a server exposes reverse connect.
//!
//! A server composes a [`ReverseConnectManager`] and forwards this trait to it,
//! so callers can manage reverse connections without knowing the concrete
//! server or manager type.

use crate::error::Result;
use crate::host::{ReverseConnectTransport, SessionCounter};
use crate::manager::ReverseConnectManager;
use crate::registry::ReverseConnectionEntry;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Runtime reverse-connect API.
pub trait ReverseConnectCapable {
    /// Register a peer. Fails if the URL is already registered.
    fn add_connection(&self, url: Url, timeout: Duration, max_session_count: u32, enabled: bool) -> Result<()>;

    /// Remove a peer. Returns whether it was registered.
    fn remove_connection(&self, url: &Url) -> bool;

    /// Copy of every entry, keyed by URL.
    fn snapshot(&self) -> BTreeMap<Url, ReverseConnectionEntry>;

    /// Register a peer with the default timeout, no session ceiling, enabled.
    fn add_default_connection(&self, url: Url) -> Result<()> {
        self.add_connection(url, Duration::ZERO, 0, true)
    }
}

impl<T: ReverseConnectTransport, S: SessionCounter> ReverseConnectCapable for ReverseConnectManager<T, S> {
    fn add_connection(&self, url: Url, timeout: Duration, max_session_count: u32, enabled: bool) -> Result<()> {
        ReverseConnectManager::add_connection(self, url, timeout, max_session_count, enabled)
    }

    fn remove_connection(&self, url: &Url) -> bool {
        ReverseConnectManager::remove_connection(self, url)
    }

    fn snapshot(&self) -> BTreeMap<Url, ReverseConnectionEntry> {
        ReverseConnectManager::snapshot(self)
    }
}
