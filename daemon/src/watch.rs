//! Filesystem watcher triggering out-of-band detection cycles.
//!
//! Watches the repository root recursively for source-file changes and
//! forwards them through the [`Debouncer`](crate::debounce::Debouncer) so
//! a burst of writes schedules exactly one detection cycle. Build output
//! and VCS-internal directories are excluded, as are files outside the
//! source-extension allowlist.
//!
//! # Architecture
//!
//! The notify callback is kept lightweight: it only filters paths and
//! pokes the debouncer. The debouncer's background task owns the timing;
//! the scheduler owns the receiving end of the trigger channel.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

use crate::debounce::Debouncer;

/// File extensions considered source files.
const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "py", "go", "java", "rb", "c", "h", "cpp", "md", "toml",
    "json", "yaml", "yml",
];

/// Directory names excluded from watching (build output, VCS internals).
const EXCLUDED_DIRS: &[&str] = &[
    "target",
    "node_modules",
    "dist",
    "build",
    ".git",
    ".hg",
    ".svn",
];

/// Errors that can occur while setting up the source watcher.
#[derive(Error, Debug)]
pub enum WatchError {
    /// Failed to initialize the file system watcher.
    #[error("failed to create watcher: {0}")]
    WatcherInit(#[from] notify::Error),

    /// The watch directory does not exist or is inaccessible.
    #[error("watch directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),
}

/// Result type for watcher operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Recursive source-file watcher feeding the detection trigger channel.
///
/// Dropping the watcher stops the notify subscription and flushes the
/// debouncer.
#[derive(Debug)]
pub struct SourceWatcher {
    /// Kept alive to maintain the watch subscription.
    #[allow(dead_code)]
    watcher: RecommendedWatcher,

    /// Kept alive to keep the debounce task running.
    #[allow(dead_code)]
    debouncer: Debouncer,

    watch_dir: PathBuf,
}

impl SourceWatcher {
    /// Starts watching `watch_dir`, emitting debounced triggers on
    /// `trigger_tx`.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory is missing or the watcher
    /// cannot be initialized.
    pub fn new(
        watch_dir: PathBuf,
        trigger_tx: mpsc::Sender<()>,
        debounce: Duration,
    ) -> Result<Self> {
        if !watch_dir.exists() {
            return Err(WatchError::DirectoryNotFound(watch_dir));
        }

        let debouncer = Debouncer::new(debounce, trigger_tx);
        let poke_tx = debouncer.input_sender();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                handle_notify_event(res, &poke_tx);
            },
            Config::default(),
        )?;
        watcher.watch(&watch_dir, RecursiveMode::Recursive)?;

        info!(
            watch_dir = %watch_dir.display(),
            debounce_ms = debounce.as_millis(),
            "source watcher started"
        );

        Ok(Self {
            watcher,
            debouncer,
            watch_dir,
        })
    }

    /// The directory being watched.
    #[must_use]
    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }
}

/// Filters one notify event, poking the debouncer for relevant changes.
///
/// Runs on notify's thread, so it must not touch the async runtime; the
/// `try_send` into the debouncer's input channel is safe there.
fn handle_notify_event(
    res: std::result::Result<Event, notify::Error>,
    poke_tx: &mpsc::Sender<()>,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "file watcher error");
            return;
        }
    };

    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_)
    ) {
        trace!(kind = ?event.kind, "ignoring event kind");
        return;
    }

    for path in &event.paths {
        if is_relevant(path) {
            debug!(path = %path.display(), "source change detected");
            let _ = poke_tx.try_send(());
            return;
        }
    }
}

/// Whether a changed path should trigger detection.
///
/// The path must carry a source extension and must not sit under an
/// excluded directory.
#[must_use]
pub fn is_relevant(path: &Path) -> bool {
    let has_source_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
    if !has_source_extension {
        return false;
    }

    !path.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| EXCLUDED_DIRS.contains(&name))
    })
}
