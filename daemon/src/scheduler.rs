//! Background scheduler driving detection and sync cycles.
//!
//! While running, one supervisor task owns two timers (a short detection
//! cycle and a longer sync cycle) plus the debounced watcher trigger
//! channel, and selects across them. Every cycle runs through the
//! orchestrator's run-in-progress guard, so a timer tick that lands while
//! another cycle is mutating the store skips instead of queueing.
//!
//! Every cycle error is caught, logged, and counted; one failed cycle
//! never stops the process. Shutdown cancels the timers, closes the
//! watcher, and gives an in-flight cycle a bounded drain before the
//! supervisor is abandoned.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskpulse_engine::{EngineConfig, Orchestrator, SuggestedAction};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::DaemonConfig;
use crate::error::Result;
use crate::watch::SourceWatcher;

/// Auto-apply confidence threshold for scheduled (unattended) cycles.
const SCHEDULED_AUTO_APPLY: f64 = 0.8;

/// Bounded drain allowed for an in-flight cycle during shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the watcher trigger channel.
const TRIGGER_CHANNEL_CAPACITY: usize = 8;

/// Lifecycle state of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Shared operational counters and timestamps.
///
/// Updated by the supervisor task, read by the status endpoint. Counter
/// fields are atomics; the timestamp fields sit behind short-lived
/// `std::sync::RwLock`s that are never held across an await.
#[derive(Debug)]
pub struct SchedulerStatus {
    state: RwLock<SchedulerState>,
    started_at: RwLock<Option<Instant>>,
    healthy: AtomicBool,
    detections: AtomicU64,
    auto_completions: AtomicU64,
    errors: AtomicU64,
    last_detection: RwLock<Option<DateTime<Utc>>>,
    last_sync: RwLock<Option<DateTime<Utc>>>,
}

/// Point-in-time view of the scheduler for the status surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub state: SchedulerState,
    pub healthy: bool,
    pub uptime_seconds: u64,
    pub last_detection_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub detections: u64,
    pub auto_completions: u64,
    pub errors: u64,
}

impl SchedulerStatus {
    fn new() -> Self {
        Self {
            state: RwLock::new(SchedulerState::Stopped),
            started_at: RwLock::new(None),
            healthy: AtomicBool::new(true),
            detections: AtomicU64::new(0),
            auto_completions: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            last_detection: RwLock::new(None),
            last_sync: RwLock::new(None),
        }
    }

    /// Builds a consistent snapshot for the status surface.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        let uptime_seconds = self
            .started_at
            .read()
            .expect("status lock")
            .map(|at| at.elapsed().as_secs())
            .unwrap_or(0);

        StatusSnapshot {
            state: *self.state.read().expect("status lock"),
            healthy: self.healthy.load(Ordering::Relaxed),
            uptime_seconds,
            last_detection_at: *self.last_detection.read().expect("status lock"),
            last_sync_at: *self.last_sync.read().expect("status lock"),
            detections: self.detections.load(Ordering::Relaxed),
            auto_completions: self.auto_completions.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn set_state(&self, state: SchedulerState) {
        *self.state.write().expect("status lock") = state;
    }

    pub(crate) fn mark_started(&self) {
        *self.started_at.write().expect("status lock") = Some(Instant::now());
    }

    pub(crate) fn mark_detection(&self, found: u64, auto_applied: u64) {
        self.detections.fetch_add(found, Ordering::Relaxed);
        self.auto_completions.fetch_add(auto_applied, Ordering::Relaxed);
        *self.last_detection.write().expect("status lock") = Some(Utc::now());
    }

    pub(crate) fn mark_sync(&self) {
        *self.last_sync.write().expect("status lock") = Some(Utc::now());
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn mark_unhealthy(&self) {
        self.healthy.store(false, Ordering::Relaxed);
    }
}

/// The background scheduler.
///
/// Owns the supervisor task, the optional filesystem watcher, and the
/// shared status. The state machine runs
/// `Stopped → Starting → Running → Stopping → Stopped`; `start` and
/// `stop` are idempotent.
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    engine_config: EngineConfig,
    config: DaemonConfig,
    status: Arc<SchedulerStatus>,
    shutdown_tx: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    watcher: Mutex<Option<SourceWatcher>>,
}

impl Scheduler {
    /// Creates a stopped scheduler over the orchestrator.
    #[must_use]
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        engine_config: EngineConfig,
        config: DaemonConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            orchestrator,
            engine_config,
            config,
            status: Arc::new(SchedulerStatus::new()),
            shutdown_tx,
            supervisor: Mutex::new(None),
            watcher: Mutex::new(None),
        }
    }

    /// Shared status handle for the HTTP surface.
    #[must_use]
    pub fn status(&self) -> Arc<SchedulerStatus> {
        Arc::clone(&self.status)
    }

    /// Initializes the engine and starts the supervisor task and watcher.
    ///
    /// An engine initialization failure marks the scheduler unhealthy and
    /// is counted, but the timers still start: the service logs and
    /// continues rather than refusing to run.
    pub async fn start(&self) -> Result<()> {
        {
            let supervisor = self.supervisor.lock().await;
            if supervisor.is_some() {
                debug!("scheduler already running");
                return Ok(());
            }
        }

        self.status.set_state(SchedulerState::Starting);

        if let Err(e) = self.orchestrator.initialize().await {
            error!(error = %e, "engine initialization failed");
            self.status.mark_unhealthy();
            self.status.record_error();
        }

        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_CHANNEL_CAPACITY);
        if self.config.watch {
            match SourceWatcher::new(
                self.engine_config.repo_dir.clone(),
                trigger_tx,
                Duration::from_millis(self.config.debounce_ms),
            ) {
                Ok(watcher) => {
                    *self.watcher.lock().await = Some(watcher);
                }
                Err(e) => {
                    warn!(error = %e, "filesystem watcher unavailable, continuing without it");
                    self.status.record_error();
                }
            }
        }

        let _ = self.shutdown_tx.send(false);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(run_supervisor(
            Arc::clone(&self.orchestrator),
            Arc::clone(&self.status),
            self.config.clone(),
            trigger_rx,
            shutdown_rx,
        ));
        *self.supervisor.lock().await = Some(handle);

        self.status.mark_started();
        self.status.set_state(SchedulerState::Running);
        info!(
            detection_interval_secs = self.config.detection_interval_secs,
            sync_interval_secs = self.config.sync_interval_secs,
            watch = self.config.watch,
            "scheduler running"
        );
        Ok(())
    }

    /// Stops the supervisor, closes the watcher, and persists the store.
    ///
    /// Pending timers are cancelled immediately; an in-flight cycle is
    /// given a bounded drain, never force-killed mid-await.
    pub async fn stop(&self) -> Result<()> {
        let handle = {
            let mut supervisor = self.supervisor.lock().await;
            match supervisor.take() {
                Some(handle) => handle,
                None => {
                    debug!("scheduler already stopped");
                    return Ok(());
                }
            }
        };

        self.status.set_state(SchedulerState::Stopping);
        let _ = self.shutdown_tx.send(true);

        // closing the watcher flushes its debouncer and ends the trigger
        // channel
        *self.watcher.lock().await = None;

        match tokio::time::timeout(DRAIN_TIMEOUT, handle).await {
            Ok(Ok(())) => debug!("supervisor drained"),
            Ok(Err(e)) => {
                error!(error = %e, "supervisor task panicked");
                self.status.record_error();
            }
            Err(_) => {
                warn!(timeout = ?DRAIN_TIMEOUT, "supervisor drain timed out, abandoning cycle");
                self.status.record_error();
            }
        }

        if let Err(e) = self.orchestrator.shutdown().await {
            error!(error = %e, "final persist failed");
            self.status.record_error();
        }

        self.status.set_state(SchedulerState::Stopped);
        info!("scheduler stopped");
        Ok(())
    }
}

/// The supervisor select loop.
async fn run_supervisor(
    orchestrator: Arc<Orchestrator>,
    status: Arc<SchedulerStatus>,
    config: DaemonConfig,
    mut trigger_rx: mpsc::Receiver<()>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut detect_timer = interval(Duration::from_secs(config.detection_interval_secs));
    detect_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sync_timer = interval(Duration::from_secs(config.sync_interval_secs));
    sync_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // intervals fire immediately on the first tick; consume those so the
    // first scheduled cycles land one full period after start
    detect_timer.tick().await;
    sync_timer.tick().await;

    debug!("supervisor loop started");

    loop {
        tokio::select! {
            _ = detect_timer.tick() => {
                run_detection_cycle(&orchestrator, &status, "timer").await;
            }
            _ = sync_timer.tick() => {
                run_sync_cycle(&orchestrator, &status).await;
            }
            Some(()) = trigger_rx.recv() => {
                run_detection_cycle(&orchestrator, &status, "watcher").await;
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    debug!("supervisor loop terminated");
}

/// One detection cycle; errors are logged and counted, never propagated.
async fn run_detection_cycle(
    orchestrator: &Orchestrator,
    status: &SchedulerStatus,
    source: &str,
) {
    match orchestrator
        .try_run_completion_detection(SCHEDULED_AUTO_APPLY)
        .await
    {
        Ok(Some(results)) => {
            let auto_applied = results
                .iter()
                .filter(|r| {
                    r.confidence > SCHEDULED_AUTO_APPLY
                        && r.suggested_action == SuggestedAction::MarkCompleted
                })
                .count() as u64;
            status.mark_detection(results.len() as u64, auto_applied);
            if !results.is_empty() {
                info!(
                    source,
                    found = results.len(),
                    auto_applied,
                    "detection cycle finished"
                );
            }
        }
        Ok(None) => debug!(source, "detection cycle skipped, another cycle in progress"),
        Err(e) => {
            error!(source, error = %e, "detection cycle failed");
            status.record_error();
        }
    }
}

/// One sync cycle: re-export the backlog document and log a progress
/// snapshot.
async fn run_sync_cycle(orchestrator: &Orchestrator, status: &SchedulerStatus) {
    if let Err(e) = orchestrator.refresh_backlog().await {
        error!(error = %e, "backlog re-export failed");
        status.record_error();
        return;
    }

    let report = orchestrator.generate_progress_report().await;
    info!(
        total = report.total,
        completed = report.completed,
        velocity = report.velocity,
        "progress snapshot"
    );
    status.mark_sync();
}
