//! Applies a freshly loaded configuration to the registry.
//!
//! Configuration-originated entries are replaced wholesale; entries added
//! through the API are never touched. A configured URL that collides with an
//! existing entry is skipped, so configuration never overwrites an entry.

use crate::config::{ManagerSettings, ReverseConnectConfig};
use crate::error::ReverseConnectError;
use crate::registry::{Registry, ReverseConnectionEntry};
use tracing::{debug, warn};
use url::Url;

/// Outcome of one synchronization.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Config entries dropped before re-adding
    pub removed: usize,
    /// Config entries inserted
    pub added: usize,
    /// Clients whose URL failed to parse
    pub skipped_invalid: usize,
    /// Clients whose URL was already registered
    pub skipped_duplicate: usize,
}

/// Reconcile `registry` with `config` and return the resolved settings.
pub fn synchronize(registry: &mut Registry, config: &ReverseConnectConfig) -> (ManagerSettings, SyncReport) {
    let mut report = SyncReport {
        removed: registry.clear_config_entries(),
        ..Default::default()
    };

    for client in &config.clients {
        let url = match Url::parse(&client.endpoint_url) {
            Ok(url) => url,
            Err(e) => {
                let err = ReverseConnectError::invalid_url(&client.endpoint_url, e);
                debug!(error = %err, "Dropping malformed reverse connect client");
                report.skipped_invalid += 1;
                continue;
            }
        };

        let entry = ReverseConnectionEntry::new(
            url,
            client.timeout(),
            client.max_session_count,
            client.enabled,
            true,
        );
        match registry.insert(entry) {
            Ok(()) => report.added += 1,
            Err(e) => {
                warn!(error = %e, "Keeping existing entry for configured reverse connect client");
                report.skipped_duplicate += 1;
            }
        }
    }

    (ManagerSettings::from_config(config), report)
}
