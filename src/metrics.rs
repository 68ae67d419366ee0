//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics through the `metrics` facade for:
//! - Connect attempts and their synchronous outcome
//! - Entry state transitions
//! - Scheduler pass duration and faults
//! - Registry size
//! - Status events for unknown endpoints
//!
//! All metrics are prefixed with `reverse_connect_`. No exporter is installed
//! here; the host server decides where metrics go.

use crate::registry::ConnectionState;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a connect call and whether the transport accepted it.
pub fn record_connect_attempt(url: &str, accepted: bool) {
    let outcome = if accepted { "accepted" } else { "error" };
    counter!("reverse_connect_attempts_total", "url" => url.to_string(), "outcome" => outcome).increment(1);
}

/// Record an entry moving into `state`.
pub fn record_state_transition(url: &str, state: ConnectionState) {
    counter!(
        "reverse_connect_state_transitions_total",
        "url" => url.to_string(),
        "state" => state.as_str()
    )
    .increment(1);
}

/// Record a completed scheduler pass.
pub fn record_tick(duration: Duration, attempted: usize, errored: usize) {
    histogram!("reverse_connect_tick_duration_seconds").record(duration.as_secs_f64());
    counter!("reverse_connect_ticks_total").increment(1);
    if errored > 0 {
        counter!("reverse_connect_tick_errors_total").increment(errored as u64);
    }
    gauge!("reverse_connect_last_tick_attempts").set(attempted as f64);
}

/// Record a pass that panicked.
pub fn record_tick_fault() {
    counter!("reverse_connect_tick_faults_total").increment(1);
}

/// Gauge for the number of registered endpoints.
pub fn set_registered_endpoints(count: usize) {
    gauge!("reverse_connect_registered_endpoints").set(count as f64);
}

/// Record a status event for a URL the registry does not know.
pub fn record_unknown_status_event() {
    counter!("reverse_connect_unknown_status_events_total").increment(1);
}

/// Gauge for manager state (0=created, 1=running, 2=shutting_down, 3=stopped).
pub fn set_manager_state(state: &str) {
    let value = match state {
        "Created" => 0.0,
        "Running" => 1.0,
        "ShuttingDown" => 2.0,
        "Stopped" => 3.0,
        _ => -1.0,
    };
    gauge!("reverse_connect_manager_state").set(value);
}
