// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reverse-connect manager.
//!
//! Ties together:
//! - the [`Registry`] of peers, behind one [`Monitor`] lock
//! - the reconciliation loop in [`crate::scheduler`]
//! - config reloads via [`crate::config_sync`]
//! - transport status events via [`crate::status_handler`]
//!
//! # Locking
//!
//! Everything mutable (entries, intervals, lifecycle state and the scheduler
//! handle) lives in one `Core` behind one mutex. The runtime API, the scheduler
//! pass and the status listener all take that same lock. Collaborators are
//! never called while it is held, so a transport may report status from
//! inside `connect` without deadlocking.
//!
//! # Scheduler Arming
//!
//! While running, exactly one loop is armed when the registry is non-empty and
//! none when it is empty:
//! - `add_connection` arms with the fast restart delay if nothing is armed
//! - `start()` arms on the normal interval
//! - a config reload keeps the armed loop, re-arming only if the connect
//!   interval changed
//! - removing the last entry (or a reload that empties the registry) disarms
//!
//! Each loop carries a generation number. A pass from a loop that is no longer
//! the armed one does nothing and ends that loop.

mod types;

pub use types::{ManagerHealth, ManagerState};

use crate::config::{ManagerSettings, ReverseConnectConfig};
use crate::config_sync::{self, SyncReport};
use crate::error::{ReverseConnectError, Result};
use crate::host::{
    ConnectionStatusListener, NoOpTransport, NoSessions, ReverseConnectTransport, SessionCounter, TransportError,
};
use crate::metrics;
use crate::registry::{ConnectionState, Monitor, Registry, ReverseConnectionEntry};
use crate::scheduler::{self, catch_pass, SchedulerHandle, TickReport, FAST_RESTART_DELAY};
use crate::status::{ChannelStatus, StatusCode};
use crate::status_handler::{self, StatusEvent, StatusOutcome};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

/// How long `shutdown()` waits for each background task.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// State guarded by the manager lock.
struct Core {
    registry: Registry,
    settings: ManagerSettings,
    /// Most recently applied configuration
    config: ReverseConnectConfig,
    state: ManagerState,
    scheduler: Option<SchedulerHandle>,
    next_generation: u64,
    runtime: Option<Handle>,
}

struct Shared<T, S> {
    core: Monitor<Core>,
    transport: Arc<T>,
    sessions: Arc<S>,
}

/// Manages reverse connections from this server to configured peers.
///
/// Each instance is independent; a process may run several.
///
/// # Example
///
/// ```rust,no_run
/// use reverse_connect::{ReverseConnectManager, ReverseConnectConfig};
/// use std::time::Duration;
/// use tokio::sync::watch;
/// use url::Url;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ReverseConnectConfig::default();
///     let (_tx, rx) = watch::channel(config.clone());
///
///     let manager = ReverseConnectManager::new(config, rx);
///     manager.start().await?;
///     manager.add_connection(Url::parse("opc.tcp://peer:4840")?, Duration::ZERO, 0, true)?;
///
///     manager.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct ReverseConnectManager<T: ReverseConnectTransport = NoOpTransport, S: SessionCounter = NoSessions> {
    shared: Arc<Shared<T, S>>,

    /// Config reloads; taken by the watcher task on `start()`
    config_rx: Mutex<Option<watch::Receiver<ReverseConnectConfig>>>,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,

    /// Background tasks other than the scheduler
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ReverseConnectManager<NoOpTransport, NoSessions> {
    /// Create a manager with no-op collaborators (for testing/standalone).
    pub fn new(config: ReverseConnectConfig, config_rx: watch::Receiver<ReverseConnectConfig>) -> Self {
        Self::with_host(config, config_rx, Arc::new(NoOpTransport), Arc::new(NoSessions))
    }
}

impl<T: ReverseConnectTransport, S: SessionCounter> ReverseConnectManager<T, S> {
    /// Create a manager wired to the host server's transport and session count.
    ///
    /// The manager starts in `Created` state. Call [`start()`](Self::start) to
    /// load `config` and begin scheduling.
    pub fn with_host(
        config: ReverseConnectConfig,
        config_rx: watch::Receiver<ReverseConnectConfig>,
        transport: Arc<T>,
        sessions: Arc<S>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let core = Core {
            registry: Registry::new(),
            settings: config.settings(),
            config,
            state: ManagerState::Created,
            scheduler: None,
            next_generation: 0,
            runtime: None,
        };

        Self {
            shared: Arc::new(Shared {
                core: Monitor::new(core),
                transport,
                sessions,
            }),
            config_rx: Mutex::new(Some(config_rx)),
            shutdown_tx,
            shutdown_rx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Get current lifecycle state.
    pub fn state(&self) -> ManagerState {
        self.shared.core.lock().state
    }

    /// Get the intervals currently in effect.
    pub fn settings(&self) -> ManagerSettings {
        self.shared.core.lock().settings
    }

    /// Whether a scheduler loop is armed.
    pub fn is_scheduler_armed(&self) -> bool {
        self.shared.core.lock().scheduler.is_some()
    }

    /// Get the transport collaborator.
    pub fn transport(&self) -> &Arc<T> {
        &self.shared.transport
    }

    /// Start the manager.
    ///
    /// 1. Applies the configuration given at construction, or the latest
    ///    value on the reload channel if one was published since
    /// 2. Arms the scheduler if any entry is registered
    /// 3. Spawns the config watcher for later reloads
    pub async fn start(&self) -> Result<()> {
        let mut config_rx = self.config_rx.lock().await.take();
        {
            let mut core = self.shared.core.lock();
            if core.state != ManagerState::Created {
                return Err(ReverseConnectError::InvalidState {
                    expected: ManagerState::Created.to_string(),
                    actual: core.state.to_string(),
                });
            }

            core.runtime = Some(Handle::current());
            core.state = ManagerState::Running;
            metrics::set_manager_state("Running");

            // A value published before start() supersedes the construction config
            let config = match config_rx.as_mut() {
                Some(rx) if rx.has_changed().unwrap_or(false) => rx.borrow_and_update().clone(),
                _ => core.config.clone(),
            };
            self.shared.apply_locked(&mut core, config);

            info!(
                endpoints = core.registry.len(),
                connect_interval_ms = core.settings.connect_interval.as_millis() as u64,
                "Reverse connect manager running"
            );
        }

        if let Some(config_rx) = config_rx {
            let weak = Arc::downgrade(&self.shared);
            let shutdown_rx = self.shutdown_rx.clone();
            let handle = tokio::spawn(watch_config(weak, config_rx, shutdown_rx));
            self.tasks.lock().await.push(handle);
            debug!("Spawned config watcher");
        }

        Ok(())
    }

    /// Shut down the manager.
    ///
    /// Stops the scheduler (a pass in flight completes, none follows) and the
    /// config watcher, then waits for both to exit.
    pub async fn shutdown(&self) {
        info!("Shutting down reverse connect manager");

        let scheduler = {
            let mut core = self.shared.core.lock();
            core.state = ManagerState::ShuttingDown;
            core.scheduler.take().map(SchedulerHandle::stop)
        };
        metrics::set_manager_state("ShuttingDown");
        let _ = self.shutdown_tx.send(true);

        let mut handles: Vec<_> = std::mem::take(&mut *self.tasks.lock().await);
        handles.extend(scheduler);

        for (i, handle) in handles.into_iter().enumerate() {
            match tokio::time::timeout(DRAIN_TIMEOUT, handle).await {
                Ok(Ok(())) => debug!(task = i + 1, "Task completed"),
                Ok(Err(e)) => warn!(task = i + 1, error = %e, "Task panicked during shutdown"),
                Err(_) => warn!(task = i + 1, "Task timed out during shutdown"),
            }
        }

        self.shared.core.lock().state = ManagerState::Stopped;
        metrics::set_manager_state("Stopped");
        info!("Reverse connect manager stopped");
    }

    /// Register a peer added through the API.
    ///
    /// Fails with `DuplicateEntry` (registry unchanged) if the URL is already
    /// present. When running, arms the scheduler with the fast restart delay
    /// if it is not armed yet.
    pub fn add_connection(&self, url: Url, timeout: Duration, max_session_count: u32, enabled: bool) -> Result<()> {
        let mut core = self.shared.core.lock();
        if core.state.is_terminating() {
            return Err(ReverseConnectError::Shutdown);
        }

        let entry = ReverseConnectionEntry::new(url.clone(), timeout, max_session_count, enabled, false);
        core.registry.insert(entry)?;
        metrics::set_registered_endpoints(core.registry.len());
        info!(
            url = %url,
            timeout_ms = timeout.as_millis() as u64,
            max_session_count,
            enabled,
            "Reverse connection added"
        );

        if core.state == ManagerState::Running {
            self.shared.arm(&mut core, false);
        }
        Ok(())
    }

    /// Remove a peer. Returns whether it was registered.
    ///
    /// Removing the last entry disarms the scheduler.
    pub fn remove_connection(&self, url: &Url) -> bool {
        let mut core = self.shared.core.lock();
        if core.registry.remove(url).is_none() {
            return false;
        }
        metrics::set_registered_endpoints(core.registry.len());
        info!(url = %url, "Reverse connection removed");

        if core.registry.is_empty() {
            Shared::<T, S>::disarm(&mut core);
        }
        true
    }

    /// Copy of every entry, keyed by URL.
    pub fn snapshot(&self) -> BTreeMap<Url, ReverseConnectionEntry> {
        self.shared.core.lock().registry.snapshot()
    }

    /// Apply a configuration now, as a reload would.
    pub fn apply_config(&self, config: ReverseConnectConfig) -> SyncReport {
        let mut core = self.shared.core.lock();
        self.shared.apply_locked(&mut core, config)
    }

    /// Run one reconciliation pass immediately, outside the schedule.
    ///
    /// A pass that panics is logged and yields an empty report.
    pub fn reconcile_now(&self) -> TickReport {
        match catch_pass(|| self.shared.reconcile(None, Instant::now())) {
            Ok(report) => report.unwrap_or_default(),
            Err(panic) => {
                metrics::record_tick_fault();
                error!(error = %panic, "On-demand reverse connect pass failed");
                TickReport::default()
            }
        }
    }

    /// Apply a transport status event.
    pub fn handle_status_event(&self, event: StatusEvent) -> StatusOutcome {
        self.shared.handle_status_event(&event)
    }

    /// Summarize entry states for health endpoints.
    pub fn health_check(&self) -> ManagerHealth {
        let core = self.shared.core.lock();
        let mut health = ManagerHealth {
            state: core.state,
            endpoints_total: core.registry.len(),
            scheduler_armed: core.scheduler.is_some(),
            ..Default::default()
        };
        for entry in core.registry.iter() {
            if entry.enabled {
                health.endpoints_enabled += 1;
            }
            health.count(entry.state);
        }
        health
    }
}

impl<T: ReverseConnectTransport, S: SessionCounter> ConnectionStatusListener for ReverseConnectManager<T, S> {
    fn on_status_changed(&self, url: &Url, status: ChannelStatus, closed: bool) {
        self.handle_status_event(StatusEvent {
            endpoint_url: url.clone(),
            channel_status: status,
            closed,
        });
    }
}

impl<T: ReverseConnectTransport, S: SessionCounter> Shared<T, S> {
    /// Arm the scheduler.
    ///
    /// Without `force_restart` this is a no-op if a loop is armed; otherwise the
    /// new loop first fires after the fast restart delay. With `force_restart`
    /// any armed loop is replaced by one on the normal interval.
    fn arm(self: &Arc<Self>, core: &mut Core, force_restart: bool) {
        if force_restart {
            Self::disarm(core);
        } else if core.scheduler.as_ref().is_some_and(|s| !s.is_finished()) {
            return;
        }

        let Some(runtime) = core.runtime.clone() else {
            return;
        };
        let delay = if force_restart {
            core.settings.connect_interval
        } else {
            FAST_RESTART_DELAY
        };

        core.next_generation += 1;
        let generation = core.next_generation;
        let weak = Arc::downgrade(self);
        let handle = SchedulerHandle::spawn(&runtime, generation, delay, move || {
            let shared = weak.upgrade()?;
            shared.scheduled_tick(generation)
        });
        core.scheduler = Some(handle);
        debug!(generation, delay_ms = delay.as_millis() as u64, "Reverse connect scheduler armed");
    }

    fn disarm(core: &mut Core) {
        if let Some(handle) = core.scheduler.take() {
            debug!(generation = handle.generation(), "Reverse connect scheduler disarmed");
            // Detached: the loop exits on its own once signalled
            drop(handle.stop());
        }
    }

    /// Apply `config` to the registry and settings.
    ///
    /// A live loop keeps its pending deadline unless the connect interval changed.
    fn apply_locked(self: &Arc<Self>, core: &mut Core, config: ReverseConnectConfig) -> SyncReport {
        let previous_interval = core.settings.connect_interval;
        let (settings, report) = config_sync::synchronize(&mut core.registry, &config);
        core.settings = settings;
        core.config = config;
        metrics::set_registered_endpoints(core.registry.len());

        info!(
            removed = report.removed,
            added = report.added,
            skipped_invalid = report.skipped_invalid,
            skipped_duplicate = report.skipped_duplicate,
            "Reverse connect configuration applied"
        );

        if core.state == ManagerState::Running {
            let armed = core.scheduler.as_ref().is_some_and(|s| !s.is_finished());
            if core.registry.is_empty() {
                Self::disarm(core);
            } else if !armed || core.settings.connect_interval != previous_interval {
                self.arm(core, true);
            }
        }
        report
    }

    /// Apply a reloaded config. Returns `false` once the manager is no longer running.
    fn apply_reload(self: &Arc<Self>, config: ReverseConnectConfig) -> bool {
        let mut core = self.core.lock();
        if core.state != ManagerState::Running {
            return false;
        }
        self.apply_locked(&mut core, config);
        true
    }

    fn scheduled_tick(&self, generation: u64) -> Option<Duration> {
        match catch_pass(|| self.reconcile(Some(generation), Instant::now())) {
            Ok(None) => return None,
            Ok(Some(report)) => {
                if report.attempted > 0 || report.cooled_down > 0 {
                    info!(
                        session_count = report.session_count,
                        cooled_down = report.cooled_down,
                        attempted = report.attempted,
                        errored = report.errored,
                        "Reverse connect pass complete"
                    );
                } else {
                    debug!(session_count = report.session_count, "Reverse connect pass idle");
                }
            }
            Err(panic) => {
                metrics::record_tick_fault();
                error!(error = %panic, "Reverse connect pass failed");
            }
        }
        Some(self.core.lock().settings.connect_interval)
    }

    /// One pass over the registry.
    ///
    /// With a generation, returns `None` without touching anything if that
    /// loop is no longer the armed one.
    fn reconcile(&self, generation: Option<u64>, now: Instant) -> Option<TickReport> {
        let session_count = self.sessions.current_session_count();

        let plan = {
            let mut core = self.core.lock();
            if let Some(generation) = generation {
                if core.scheduler.as_ref().map(SchedulerHandle::generation) != Some(generation) {
                    return None;
                }
            }
            let settings = core.settings;
            scheduler::plan_pass(
                &mut core.registry,
                now,
                session_count,
                settings.connect_timeout,
                settings.reject_timeout,
            )
        };

        let mut report = TickReport {
            session_count,
            cooled_down: plan.cooled_down,
            ..Default::default()
        };

        for attempt in plan.attempts {
            report.attempted += 1;
            let result = catch_pass(|| self.transport.connect(&attempt.url, attempt.timeout))
                .unwrap_or_else(|panic| Err(TransportError(panic)));

            match result {
                Ok(()) => {
                    metrics::record_connect_attempt(attempt.url.as_str(), true);
                    debug!(
                        url = %attempt.url,
                        timeout_ms = attempt.timeout.as_millis() as u64,
                        "Reverse connect attempt started"
                    );
                }
                Err(e) => {
                    report.errored += 1;
                    metrics::record_connect_attempt(attempt.url.as_str(), false);
                    let err = ReverseConnectError::Connect {
                        url: attempt.url.to_string(),
                        message: e.to_string(),
                    };
                    warn!(url = %attempt.url, error = %err, "Reverse connect attempt failed");
                    self.record_connect_error(&attempt.url, e);
                }
            }
        }

        metrics::record_tick(now.elapsed(), report.attempted, report.errored);
        Some(report)
    }

    fn record_connect_error(&self, url: &Url, error: TransportError) {
        let mut core = self.core.lock();
        let Some(entry) = core.registry.get_mut(url) else {
            return;
        };
        // A status event may already have moved the entry on
        if entry.state != ConnectionState::Connecting {
            return;
        }
        entry.state = ConnectionState::Errored;
        entry.last_status = Some(ChannelStatus::bad(StatusCode::BAD_UNEXPECTED_ERROR, error.0));
        metrics::record_state_transition(url.as_str(), ConnectionState::Errored);
    }

    fn handle_status_event(&self, event: &StatusEvent) -> StatusOutcome {
        let outcome = {
            let mut core = self.core.lock();
            status_handler::apply(&mut core.registry, event, Instant::now())
        };

        match outcome {
            StatusOutcome::UnknownEndpoint => {
                metrics::record_unknown_status_event();
                warn!(
                    url = %event.endpoint_url,
                    status = %event.channel_status,
                    "Status change for unknown reverse connection"
                );
            }
            StatusOutcome::Applied { previous, current } => {
                metrics::record_state_transition(event.endpoint_url.as_str(), current);
                info!(
                    url = %event.endpoint_url,
                    status = %event.channel_status,
                    closed = event.closed,
                    from = %previous,
                    to = %current,
                    "Reverse connection status changed"
                );
            }
        }
        outcome
    }
}

/// Apply configuration reloads until shutdown or the sender goes away.
async fn watch_config<T: ReverseConnectTransport, S: SessionCounter>(
    shared: Weak<Shared<T, S>>,
    mut config_rx: watch::Receiver<ReverseConnectConfig>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    // start() has already marked the current config as seen
    let _ = shutdown_rx.borrow_and_update();

    loop {
        tokio::select! {
            biased;

            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            result = config_rx.changed() => {
                if result.is_err() {
                    debug!("Config channel closed, no further reloads");
                    break;
                }
                let config = config_rx.borrow_and_update().clone();
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                if !shared.apply_reload(config) {
                    break;
                }
            }
        }
    }

    debug!("Config watcher stopped");
}
