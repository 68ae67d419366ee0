//! # Reverse Connect
//!
//! Lets a normally-listening server initiate outbound connections toward its
//! peers, typically to get through firewalls or NAT that block inbound
//! connections to those peers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                         ReverseConnectManager                            │
//! │                                                                          │
//! │  config reload ──► ConfigSynchronizer ──┐                                │
//! │  add/remove API ───────────────────────►│                                │
//! │                                         ▼                                │
//! │                              ┌─────────────────────┐                     │
//! │                              │ Registry (one lock) │◄── StatusHandler ◄──┼── transport
//! │                              └─────────────────────┘                     │   status events
//! │                                         ▲                                │
//! │                          Scheduler loop │ tick: cooldown, eligibility    │
//! │                                         └──────► transport.connect() ────┼──► peer
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The manager never blocks on the network. `connect` only starts an attempt;
//! the result comes back later through
//! [`ConnectionStatusListener::on_status_changed`](host::ConnectionStatusListener::on_status_changed).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use reverse_connect::{ReverseConnectManager, ReverseConnectConfig, ClientConfig};
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ReverseConnectConfig::with_clients(vec![
//!         ClientConfig::for_testing("opc.tcp://client1:4840"),
//!     ]);
//!     let (_tx, rx) = watch::channel(config.clone());
//!
//!     let manager = ReverseConnectManager::new(config, rx);
//!     manager.start().await.expect("Failed to start");
//!
//!     // Manager runs until shutdown
//!     manager.shutdown().await;
//! }
//! ```

pub mod capability;
pub mod config;
pub mod config_sync;
pub mod error;
pub mod host;
pub mod manager;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod status;
pub mod status_handler;

// Re-exports for convenience
pub use capability::ReverseConnectCapable;
pub use config::{ClientConfig, ManagerSettings, ReverseConnectConfig};
pub use config_sync::SyncReport;
pub use error::{Result, ReverseConnectError};
pub use host::{ConnectionStatusListener, ReverseConnectTransport, SessionCounter, TransportError};
pub use manager::{ManagerHealth, ManagerState, ReverseConnectManager};
pub use registry::{ConnectionState, ReverseConnectionEntry};
pub use scheduler::TickReport;
pub use status::{ChannelStatus, StatusCode};
pub use status_handler::{StatusEvent, StatusOutcome};
