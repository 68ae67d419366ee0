// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reconciliation scheduler: the background loop that drives connect attempts.
//!
//! # Loop
//!
//! ```text
//!   spawn(first_delay)
//!         │
//!         ▼
//!   sleep(delay) ──shutdown──→ exit
//!         │
//!         ▼
//!   tick() ──None──→ exit       (manager dropped or loop superseded)
//!         │
//!    Some(interval)
//!         └──→ delay = interval, repeat
//! ```
//!
//! One loop exists per armed manager. A tick that panics is caught and logged
//! by the caller via [`catch_pass`]; the loop keeps going.
//!
//! # Pass
//!
//! [`plan_pass`] runs under the registry lock. For each entry it first lifts an
//! expired rejection cooldown, then decides eligibility against the session
//! count read once for the whole pass. Eligible entries move to `Connecting`
//! and are returned as [`ConnectAttempt`]s; the caller invokes the transport
//! after releasing the lock.

use crate::metrics;
use crate::registry::{ConnectionState, Registry};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info_span, Instrument};
use url::Url;

/// Delay before the first firing after a fresh `add_connection`.
pub const FAST_RESTART_DELAY: Duration = Duration::from_millis(1000);

/// A connect call decided by a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt {
    pub url: Url,
    pub timeout: Duration,
}

/// Result of planning a pass.
#[derive(Debug, Default)]
pub struct PassPlan {
    pub attempts: Vec<ConnectAttempt>,
    /// Entries moved from `Rejected` back to `Closed`
    pub cooled_down: usize,
}

/// Statistics from one tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Session count the pass used for eligibility
    pub session_count: usize,
    pub cooled_down: usize,
    /// Connect calls made
    pub attempted: usize,
    /// Connect calls that failed synchronously
    pub errored: usize,
}

/// Walk the registry: lift expired cooldowns and mark eligible entries `Connecting`.
pub fn plan_pass(
    registry: &mut Registry,
    now: Instant,
    session_count: usize,
    connect_timeout: Duration,
    reject_timeout: Duration,
) -> PassPlan {
    let mut plan = PassPlan::default();

    for entry in registry.iter_mut() {
        if entry.cooldown_elapsed(now, reject_timeout) {
            entry.state = ConnectionState::Closed;
            plan.cooled_down += 1;
            metrics::record_state_transition(entry.url.as_str(), ConnectionState::Closed);
            debug!(url = %entry.url, "Rejection cooldown elapsed");
        }

        if entry.is_eligible(session_count) {
            entry.state = ConnectionState::Connecting;
            metrics::record_state_transition(entry.url.as_str(), ConnectionState::Connecting);
            plan.attempts.push(ConnectAttempt {
                url: entry.url.clone(),
                timeout: entry.effective_timeout(connect_timeout),
            });
        }
    }

    plan
}

/// Run one pass, turning a panic into an error message.
pub fn catch_pass<T>(pass: impl FnOnce() -> T) -> std::result::Result<T, String> {
    catch_unwind(AssertUnwindSafe(pass)).map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to a running scheduler loop.
#[derive(Debug)]
pub struct SchedulerHandle {
    generation: u64,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Spawn a loop that first fires after `first_delay`.
    ///
    /// `tick` returns the delay until the next firing, or `None` to stop.
    pub fn spawn<F>(runtime: &Handle, generation: u64, first_delay: Duration, tick: F) -> Self
    where
        F: FnMut() -> Option<Duration> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let span = info_span!("reverse_connect_scheduler", generation);
        let task = runtime.spawn(run_loop(first_delay, shutdown_rx, tick).instrument(span));

        Self {
            generation,
            shutdown_tx,
            task,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the loop to stop. A tick in progress completes; no further tick starts.
    ///
    /// The returned handle may be awaited to join the loop.
    pub fn stop(self) -> JoinHandle<()> {
        let _ = self.shutdown_tx.send(true);
        self.task
    }
}

async fn run_loop<F>(first_delay: Duration, mut shutdown_rx: watch::Receiver<bool>, mut tick: F)
where
    F: FnMut() -> Option<Duration>,
{
    // Mark initial value as seen so changed() only fires on an actual stop
    let _ = shutdown_rx.borrow_and_update();

    let mut delay = first_delay;
    debug!(delay_ms = delay.as_millis() as u64, "Scheduler armed");

    loop {
        tokio::select! {
            biased;

            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }

            _ = tokio::time::sleep(delay) => {}
        }

        match tick() {
            Some(next) => delay = next,
            None => break,
        }
    }

    debug!("Scheduler stopped");
}
