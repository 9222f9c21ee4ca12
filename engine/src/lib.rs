//! TaskPulse Engine - local-first task tracking with git-based completion
//! detection.
//!
//! # Overview
//!
//! The engine maintains a durable backlog of work items, reconciles
//! ephemeral per-session todo lists against that backlog, and infers when
//! a backlog item is complete by inspecting version-control history and
//! the file system, without a human explicitly marking it done.
//!
//! The [`orchestrator::Orchestrator`] is the sole entry point for callers:
//! it composes the version-control reader, the completion detector, the
//! partitioned todo store, and the analytics engine into sync, detect,
//! complete, suggest, and report operations. The background scheduler in
//! the companion daemon crate drives those operations on timers.
//!
//! # Modules
//!
//! - [`types`]: the shared data model
//! - [`git`]: read-only version-control queries behind the [`git::VcsReader`] seam
//! - [`detect`]: pluggable completion-detection strategies
//! - [`store`]: the four-partition todo store with merge and promotion
//! - [`analytics`]: trends, bottlenecks, and velocity
//! - [`backlog`]: the external future-backlog document
//! - [`orchestrator`]: the engine's entry point
//! - [`config`]: configuration from environment variables
//! - [`error`]: error types for engine operations
//! - [`utils`]: shared text helpers

pub mod analytics;
pub mod backlog;
pub mod config;
pub mod detect;
pub mod error;
pub mod git;
pub mod orchestrator;
pub mod store;
pub mod types;
pub mod utils;

pub use analytics::AnalyticsSnapshot;
pub use config::{ConfigError, EngineConfig};
pub use detect::{CompletionDetector, DetectionStrategy};
pub use error::{EngineError, Result};
pub use git::{GitCli, StaticVcs, VcsReader};
pub use orchestrator::Orchestrator;
pub use store::{StoreError, TodoStore};
pub use types::{
    CompletionPattern, DetectionResult, DetectionType, GitCommitInfo, Partition, PatternKind,
    Priority, ProgressReport, SuggestedAction, Suggestion, SyncResult, Todo, TodoStatus,
};
