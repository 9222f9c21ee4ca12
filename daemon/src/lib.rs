//! TaskPulse Daemon - background completion detection scheduler and
//! status API.
//!
//! # Overview
//!
//! This crate wraps the engine in a long-running service: a
//! [`scheduler::Scheduler`] drives detection and sync cycles on timers
//! and on debounced filesystem events, and a small axum application
//! exposes read-only health, analytics, and progress endpoints.
//!
//! # Modules
//!
//! - [`scheduler`]: the supervisor loop and shared status
//! - [`watch`]: filesystem watcher over the repository
//! - [`debounce`]: trigger coalescing for event bursts
//! - [`routes`]: HTTP status surface
//! - [`config`]: configuration from environment variables
//! - [`error`]: error types for daemon operations

pub mod config;
pub mod debounce;
pub mod error;
pub mod routes;
pub mod scheduler;
pub mod watch;

pub use config::{ConfigError, DaemonConfig};
pub use debounce::{Debouncer, DEFAULT_DEBOUNCE_MS};
pub use error::{DaemonError, Result};
pub use routes::{create_router, AppState};
pub use scheduler::{Scheduler, SchedulerState, SchedulerStatus, StatusSnapshot};
pub use watch::{SourceWatcher, WatchError};
