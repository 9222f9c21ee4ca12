//! Core data model for TaskPulse.
//!
//! This module defines the shared types used across the engine: the durable
//! [`Todo`] record and its enums, declarative [`CompletionPattern`]s, the
//! per-cycle [`DetectionResult`], and the read-only [`GitCommitInfo`]
//! produced by the version-control reader. All persisted and wire types
//! serialize to camelCase JSON.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of the random alphanumeric suffix in generated todo IDs.
const TODO_ID_SUFFIX_LEN: usize = 16;

/// Prefix for generated todo IDs.
const TODO_ID_PREFIX: &str = "todo_";

/// Lifecycle status of a todo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
    Cancelled,
}

impl TodoStatus {
    /// Whether this status means the todo is still actionable by detection.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

/// Priority of a todo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Ordinal rank used for sorting; higher is more urgent.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

/// Kind of a declarative completion pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    FileExists,
    FileContains,
    CommitMessageMatches,
    BuildSucceeded,
    TestsPassed,
}

/// A declarative rule testing whether a todo is satisfied.
///
/// Patterns are evaluated in declared order by the completion detector;
/// the first passing pattern with confidence above 0.5 wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionPattern {
    /// What the pattern tests.
    pub kind: PatternKind,

    /// Kind-specific pattern text: a path fragment for `FileExists`,
    /// `path::substring` for `FileContains`, a case-insensitive regex for
    /// `CommitMessageMatches`; unused for the build/test kinds.
    pub pattern: String,

    /// Confidence assigned to a match, in `(0, 1]`.
    pub confidence: f64,
}

impl CompletionPattern {
    /// Creates a pattern, clamping `confidence` into `(0, 1]`.
    #[must_use]
    pub fn new(kind: PatternKind, pattern: impl Into<String>, confidence: f64) -> Self {
        Self {
            kind,
            pattern: pattern.into(),
            confidence: confidence.clamp(0.01, 1.0),
        }
    }
}

/// A unit of backlog work.
///
/// Owned by the todo store. Created by reconciliation or backlog-document
/// parsing, mutated by detection or explicit completion, moved to the
/// archived partition on completion, never physically deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Unique identifier. Generated ids have the form `todo_` followed by
    /// 16 lowercase alphanumeric characters.
    pub id: String,

    /// Free-text description of the work.
    pub content: String,

    /// Lifecycle status.
    pub status: TodoStatus,

    /// Priority; defaults to medium.
    #[serde(default)]
    pub priority: Priority,

    /// Optional grouping category, assigned on promotion to the project
    /// partition.
    #[serde(default)]
    pub category: Option<String>,

    /// Free-form tags, including audit tags appended on completion.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,

    /// Completion timestamp, set when the todo reaches `Completed`.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    /// Estimated effort in hours.
    #[serde(default)]
    pub estimated_hours: Option<f64>,

    /// Actual effort in hours, merged in from session records.
    #[serde(default)]
    pub actual_hours: Option<f64>,

    /// Ids of todos that must all complete before this one unblocks.
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Repository paths related to this work item.
    #[serde(default)]
    pub related_files: Vec<String>,

    /// Declarative completion patterns, evaluated in order.
    #[serde(default)]
    pub patterns: Vec<CompletionPattern>,
}

impl Todo {
    /// Creates a pending todo with a generated id and current timestamps.
    #[must_use]
    pub fn new(content: impl Into<String>, priority: Priority) -> Self {
        let now = Utc::now();
        Self {
            id: generate_todo_id(),
            content: content.into(),
            status: TodoStatus::Pending,
            priority,
            category: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            estimated_hours: None,
            actual_hours: None,
            depends_on: Vec::new(),
            related_files: Vec::new(),
            patterns: Vec::new(),
        }
    }

    /// Creates a pending todo with an explicit id.
    #[must_use]
    pub fn with_id(id: impl Into<String>, content: impl Into<String>, priority: Priority) -> Self {
        let mut todo = Self::new(content, priority);
        todo.id = id.into();
        todo
    }
}

/// One of the four disjoint todo collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    /// Ephemeral, per work session.
    Session,
    /// The durable backlog.
    Project,
    /// Parsed from the external backlog document.
    Future,
    /// Terminal; completed todos live here.
    Archived,
}

/// How a detection was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionType {
    /// A declared completion pattern fired.
    Pattern,
    /// Keyword overlap between todo content and a commit message.
    KeywordOverlap,
    /// Commit activity touched the todo's related files.
    FileActivity,
    /// A creation-target phrase matched a changed file.
    CreationTarget,
}

/// Action recommended by a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    MarkCompleted,
    UpdateProgress,
    AddMetadata,
}

/// Result of evaluating one todo against recent repository activity.
///
/// Ephemeral: produced per detection cycle and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    /// The todo this detection refers to.
    pub todo_id: String,

    /// How the detection was produced.
    pub detection_type: DetectionType,

    /// Confidence in `(0, 1]`. Above 0.7 is worth surfacing; above 0.9 is
    /// safe to auto-apply. Thresholds are policy owned by the orchestrator.
    pub confidence: f64,

    /// Human-readable evidence supporting the detection.
    pub evidence: String,

    /// What the caller should do with this detection.
    pub suggested_action: SuggestedAction,
}

/// A commit on the current branch, as reported by the version-control
/// reader.
///
/// Read-only: re-queried each cycle and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitCommitInfo {
    /// Full commit hash.
    pub hash: String,

    /// Commit subject line.
    pub message: String,

    /// Author name.
    pub author: String,

    /// Author timestamp.
    pub timestamp: DateTime<Utc>,

    /// Paths changed by the commit, relative to the repository root.
    pub changed_files: Vec<String>,
}

/// A field-level conflict discovered during sync.
///
/// Conflicts are reported with a recommended resolution but never
/// auto-resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConflict {
    /// The todo the conflict belongs to.
    pub todo_id: String,

    /// Name of the conflicting field.
    pub field: String,

    /// Value currently stored.
    pub existing: String,

    /// Value carried by the incoming session record.
    pub incoming: String,

    /// Recommended resolution.
    pub recommendation: String,
}

/// Outcome of merging a session todo list into the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// Ids newly graduated into the project partition.
    pub added: Vec<String>,

    /// Ids merged into existing project records.
    pub merged: Vec<String>,

    /// Ids on which both sides agree the work is completed.
    pub completed: Vec<String>,

    /// Field conflicts requiring a human decision.
    pub conflicts: Vec<FieldConflict>,
}

/// Progress report over the project and archived partitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    /// All todos counted across project and archived partitions.
    pub total: usize,

    /// Completed todos (the archived partition).
    pub completed: usize,

    /// `completed / total`, or 0 when the store is empty.
    pub completion_rate: f64,

    /// Completions in the trailing 7 days.
    pub velocity: usize,

    /// Mean actual hours across completed todos that recorded effort.
    pub average_completion_hours: Option<f64>,

    /// Linear projection of when the remaining backlog empties.
    pub projected_completion: Option<DateTime<Utc>>,

    /// Top unblocked pending todos by priority, then recency.
    pub top_pending: Vec<Todo>,
}

/// A suggested next todo with the reason it was chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub todo: Todo,
    pub reason: String,
}

/// Generates a todo id of the form `todo_` + 16 lowercase alphanumerics.
fn generate_todo_id() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

    let mut rng = rand::rng();
    let suffix: String = (0..TODO_ID_SUFFIX_LEN)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect();

    format!("{TODO_ID_PREFIX}{suffix}")
}
