//! Mock host server collaborators.
//!
//! [`MockTransport`] records every `connect()` call and can be told to fail,
//! panic, or report a status back to the manager from inside `connect()`.
//! [`MockSessions`] returns whatever session count the test sets, and can be
//! told to panic on its next reads.

use reverse_connect::host::{ConnectionStatusListener, ReverseConnectTransport, SessionCounter, TransportResult};
use reverse_connect::{ChannelStatus, TransportError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Weak};
use std::time::Duration;
use url::Url;

/// A recorded connect() call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectCall {
    pub url: Url,
    pub timeout: Duration,
}

/// What connect() does for a given URL.
#[derive(Debug, Clone)]
pub enum Behavior {
    Accept,
    Fail(String),
    Panic(String),
    /// Report this status to the listener before returning Ok
    Report(ChannelStatus),
}

/// Transport that records calls instead of opening sockets.
///
/// # Example
/// ```rust,ignore
/// let transport = Arc::new(MockTransport::new());
/// transport.fail(&url, "refused");
///
/// // Drive the manager...
///
/// assert_eq!(transport.calls_for(&url), 1);
/// ```
#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<ConnectCall>>,
    behaviors: Mutex<HashMap<Url, Behavior>>,
    listener: Mutex<Option<Weak<dyn ConnectionStatusListener>>>,
}

#[allow(dead_code)]
impl MockTransport {
    /// Create a transport that accepts every attempt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listener used by [`Behavior::Report`].
    pub fn set_listener(&self, listener: Weak<dyn ConnectionStatusListener>) {
        *self.listener.lock().unwrap() = Some(listener);
    }

    pub fn set_behavior(&self, url: &Url, behavior: Behavior) {
        self.behaviors.lock().unwrap().insert(url.clone(), behavior);
    }

    /// Make connect() to `url` fail synchronously with `message`.
    pub fn fail(&self, url: &Url, message: &str) {
        self.set_behavior(url, Behavior::Fail(message.to_string()));
    }

    /// Make connect() to `url` panic.
    pub fn panic_on(&self, url: &Url, message: &str) {
        self.set_behavior(url, Behavior::Panic(message.to_string()));
    }

    /// Go back to accepting `url`.
    pub fn accept(&self, url: &Url) {
        self.set_behavior(url, Behavior::Accept);
    }

    /// All recorded calls in order.
    pub fn calls(&self) -> Vec<ConnectCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls made for `url`.
    pub fn calls_for(&self, url: &Url) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| &c.url == url).count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl ReverseConnectTransport for MockTransport {
    fn connect(&self, url: &Url, timeout: Duration) -> TransportResult<()> {
        self.calls.lock().unwrap().push(ConnectCall {
            url: url.clone(),
            timeout,
        });

        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or(Behavior::Accept);

        match behavior {
            Behavior::Accept => Ok(()),
            Behavior::Fail(message) => Err(TransportError::new(message)),
            Behavior::Panic(message) => panic!("{}", message),
            Behavior::Report(status) => {
                let listener = self.listener.lock().unwrap().as_ref().and_then(Weak::upgrade);
                if let Some(listener) = listener {
                    listener.on_status_changed(url, status, false);
                }
                Ok(())
            }
        }
    }
}

/// Session counter the test controls.
#[derive(Debug, Default)]
pub struct MockSessions {
    count: AtomicUsize,
    /// Calls left that panic instead of answering
    panics_remaining: AtomicUsize,
}

#[allow(dead_code)]
impl MockSessions {
    pub fn new(count: usize) -> Self {
        Self {
            count: AtomicUsize::new(count),
            panics_remaining: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, count: usize) {
        self.count.store(count, Ordering::SeqCst);
    }

    /// Make the next `calls` reads panic.
    pub fn panic_next(&self, calls: usize) {
        self.panics_remaining.store(calls, Ordering::SeqCst);
    }
}

impl SessionCounter for MockSessions {
    fn current_session_count(&self) -> usize {
        let armed = self
            .panics_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            panic!("session count unavailable");
        }
        self.count.load(Ordering::SeqCst)
    }
}
