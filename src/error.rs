// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the reverse-connect manager.
//!
//! Errors are returned synchronously from the runtime API. Failures that happen
//! inside a scheduler pass (a connect call that fails, a collaborator that
//! panics) never surface here: they are recorded on the affected entry and
//! logged, and the pass carries on.
//!
//! # Error Categories
//!
//! | Error Type | Description |
//! |------------|-------------|
//! | `DuplicateEntry` | URL already registered |
//! | `InvalidUrl` | Endpoint URL failed to parse |
//! | `Connect` | Transport refused to start a connect attempt |
//! | `InvalidState` | Manager lifecycle violation |
//! | `Shutdown` | Manager is shutting down or stopped |

use thiserror::Error;

/// Result type alias for reverse-connect operations.
pub type Result<T> = std::result::Result<T, ReverseConnectError>;

/// Errors that can occur while managing reverse connections.
#[derive(Error, Debug)]
pub enum ReverseConnectError {
    /// The endpoint URL is already registered.
    ///
    /// Registry is left untouched. Remove the existing entry first.
    #[error("Reverse connection already registered: {url}")]
    DuplicateEntry { url: String },

    /// The endpoint URL could not be parsed.
    #[error("Invalid endpoint URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The transport failed to start a connect attempt.
    #[error("Reverse connect to {url} failed: {message}")]
    Connect { url: String, message: String },

    /// Operation attempted in the wrong lifecycle state
    /// (e.g. calling `start()` twice).
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// The manager has been shut down.
    #[error("Shutdown in progress")]
    Shutdown,
}

impl ReverseConnectError {
    /// Create an `InvalidUrl` error from a parse failure.
    pub fn invalid_url(url: impl Into<String>, source: url::ParseError) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            source,
        }
    }
}
