//! Trigger debouncer for coalescing filesystem event bursts.
//!
//! Source-file changes arrive in bursts (editors write temp files, build
//! steps touch many paths at once). The debouncer absorbs every poke and
//! emits a single trigger once the configured quiet period has passed
//! since the last one, so one burst schedules exactly one out-of-band
//! detection cycle.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Default quiet period before a trigger fires.
pub const DEFAULT_DEBOUNCE_MS: u64 = 2_000;

/// Coalesces rapid pokes into single triggers.
///
/// A background task tracks the deadline; each poke pushes it out by the
/// configured interval. When the deadline passes with no new pokes, one
/// `()` is sent on the output channel. Dropping the debouncer flushes a
/// pending trigger and stops the task.
#[derive(Debug)]
pub struct Debouncer {
    input_tx: mpsc::Sender<()>,
    #[allow(dead_code)]
    task_handle: tokio::task::JoinHandle<()>,
}

impl Debouncer {
    /// Creates a debouncer emitting triggers on `output_tx`.
    #[must_use]
    pub fn new(interval: Duration, output_tx: mpsc::Sender<()>) -> Self {
        let (input_tx, input_rx) = mpsc::channel(1024);

        let task_handle = tokio::spawn(async move {
            run_debounce_loop(interval, input_rx, output_tx).await;
        });

        Self {
            input_tx,
            task_handle,
        }
    }

    /// Creates a debouncer with the default 2s quiet period.
    #[must_use]
    pub fn with_default_interval(output_tx: mpsc::Sender<()>) -> Self {
        Self::new(Duration::from_millis(DEFAULT_DEBOUNCE_MS), output_tx)
    }

    /// Registers an event, resetting the quiet-period timer.
    ///
    /// Never blocks; a full input channel is fine because a pending poke
    /// already guarantees a trigger.
    pub fn poke(&self) {
        let _ = self.input_tx.try_send(());
    }

    /// Clone of the input sender, for callers that poke from outside the
    /// async runtime (the notify callback thread).
    #[must_use]
    pub fn input_sender(&self) -> mpsc::Sender<()> {
        self.input_tx.clone()
    }
}

/// Runs the debounce loop until the input channel closes.
async fn run_debounce_loop(
    interval: Duration,
    mut input_rx: mpsc::Receiver<()>,
    output_tx: mpsc::Sender<()>,
) {
    let mut deadline: Option<Instant> = None;

    debug!(interval_ms = interval.as_millis(), "starting debounce loop");

    loop {
        tokio::select! {
            event = input_rx.recv() => {
                match event {
                    Some(()) => {
                        trace!("poke received, resetting deadline");
                        deadline = Some(Instant::now() + interval);
                    }
                    None => {
                        if deadline.is_some() {
                            emit(&output_tx).await;
                        }
                        break;
                    }
                }
            }

            () = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    // no pending trigger: park until a poke arrives
                    None => std::future::pending().await,
                }
            } => {
                deadline = None;
                emit(&output_tx).await;
            }
        }
    }

    debug!("debounce loop terminated");
}

/// Sends one trigger, logging when the receiver is gone.
async fn emit(output_tx: &mpsc::Sender<()>) {
    trace!("emitting debounced trigger");
    if output_tx.send(()).await.is_err() {
        warn!("failed to emit trigger: receiver closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn test_debouncer(interval_ms: u64) -> (Debouncer, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(16);
        (Debouncer::new(Duration::from_millis(interval_ms), tx), rx)
    }

    #[tokio::test]
    async fn single_poke_emits_after_interval() {
        let (debouncer, mut rx) = test_debouncer(50);

        debouncer.poke();

        let result = timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(result.is_ok(), "trigger should arrive within timeout");
    }

    #[tokio::test]
    async fn burst_coalesces_into_one_trigger() {
        let (debouncer, mut rx) = test_debouncer(50);

        for _ in 0..20 {
            debouncer.poke();
        }

        let first = timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(first.is_ok());

        let second = timeout(Duration::from_millis(150), rx.recv()).await;
        assert!(second.is_err(), "burst must produce exactly one trigger");
    }

    #[tokio::test]
    async fn no_trigger_before_quiet_period() {
        let (debouncer, mut rx) = test_debouncer(200);

        debouncer.poke();
        let early = timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(early.is_err(), "no trigger before the quiet period");

        let eventual = timeout(Duration::from_millis(500), rx.recv()).await;
        assert!(eventual.is_ok());
    }

    #[tokio::test]
    async fn sequential_bursts_each_trigger() {
        let (debouncer, mut rx) = test_debouncer(50);

        debouncer.poke();
        assert!(timeout(Duration::from_millis(300), rx.recv()).await.is_ok());

        debouncer.poke();
        assert!(timeout(Duration::from_millis(300), rx.recv()).await.is_ok());
    }

    #[tokio::test]
    async fn pending_trigger_flushes_on_drop() {
        let (tx, mut rx) = mpsc::channel(16);
        let debouncer = Debouncer::new(Duration::from_secs(60), tx);

        debouncer.poke();
        drop(debouncer);

        let flushed = timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(flushed.is_ok(), "pending trigger flushes when dropped");
    }

    #[tokio::test]
    async fn idle_debouncer_emits_nothing() {
        let (_debouncer, mut rx) = test_debouncer(30);
        let nothing = timeout(Duration::from_millis(150), rx.recv()).await;
        assert!(nothing.is_err());
    }
}
