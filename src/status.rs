//! Channel status codes reported by the transport layer.
//!
//! Codes follow the OPC UA 32-bit layout: the top two bits carry the severity
//! (`00` good, `01` uncertain, `1x` bad). Only the severity and one specific
//! code, [`StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID`], matter to the manager:
//! a peer answers a reverse hello it does not accept with that code.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-bit protocol status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusCode(pub u32);

impl StatusCode {
    pub const GOOD: StatusCode = StatusCode(0x0000_0000);
    pub const BAD_UNEXPECTED_ERROR: StatusCode = StatusCode(0x8001_0000);
    pub const BAD_TIMEOUT: StatusCode = StatusCode(0x800A_0000);
    /// Peer refused the reverse-connect handshake.
    pub const BAD_TCP_MESSAGE_TYPE_INVALID: StatusCode = StatusCode(0x807E_0000);
    pub const BAD_SECURE_CHANNEL_CLOSED: StatusCode = StatusCode(0x8086_0000);
    pub const BAD_NOT_CONNECTED: StatusCode = StatusCode(0x808A_0000);
    pub const BAD_CONNECTION_REJECTED: StatusCode = StatusCode(0x80AC_0000);

    const SEVERITY_MASK: u32 = 0xC000_0000;

    pub fn is_good(self) -> bool {
        self.0 & Self::SEVERITY_MASK == 0
    }

    pub fn is_bad(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    pub fn is_uncertain(self) -> bool {
        self.0 & Self::SEVERITY_MASK == 0x4000_0000
    }

    /// Whether the peer actively refused the reverse connection.
    pub fn is_reverse_connect_rejection(self) -> bool {
        self == Self::BAD_TCP_MESSAGE_TYPE_INVALID
    }

    fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::GOOD => "Good",
            Self::BAD_UNEXPECTED_ERROR => "BadUnexpectedError",
            Self::BAD_TIMEOUT => "BadTimeout",
            Self::BAD_TCP_MESSAGE_TYPE_INVALID => "BadTcpMessageTypeInvalid",
            Self::BAD_SECURE_CHANNEL_CLOSED => "BadSecureChannelClosed",
            Self::BAD_NOT_CONNECTED => "BadNotConnected",
            Self::BAD_CONNECTION_REJECTED => "BadConnectionRejected",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

/// Status of a channel as reported by the transport, with optional detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub code: StatusCode,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ChannelStatus {
    pub fn good() -> Self {
        Self {
            code: StatusCode::GOOD,
            reason: None,
        }
    }

    pub fn bad(code: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: Some(reason.into()),
        }
    }

    pub fn is_good(&self) -> bool {
        self.code.is_good()
    }

    pub fn is_bad(&self) -> bool {
        self.code.is_bad()
    }
}

impl From<StatusCode> for ChannelStatus {
    fn from(code: StatusCode) -> Self {
        Self { code, reason: None }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{}: {}", self.code, reason),
            None => write!(f, "{}", self.code),
        }
    }
}
