//! The persisted, partitioned todo collection.
//!
//! The store owns four disjoint partitions: `session` (ephemeral, per work
//! session), `project` (the durable backlog), `future` (parsed from the
//! external backlog document), and `archived` (terminal). One identifier
//! lives in exactly one partition; completion is the only transition into
//! `archived` and todos are never physically deleted.
//!
//! # Persistence
//!
//! The whole partition set serializes as one versioned JSON document per
//! mutation (the orchestrator saves after each operation). Loading is
//! best-effort: a missing or corrupt store starts empty. Save failures
//! propagate so data loss stays visible.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{
    CompletionPattern, FieldConflict, Partition, PatternKind, SyncResult, Todo, TodoStatus,
};
use crate::utils::text::extract_creation_target;
use crate::utils::text::keywords;

/// Current on-disk schema version.
const STORE_VERSION: u32 = 1;

/// Extensions tried when generating file-exists patterns from a creation
/// target.
const TARGET_EXTENSIONS: &[&str] = &[".rs", ".ts", ".tsx", ".js", ".py", ".go", ".md"];

/// Confidence of generated file-exists patterns.
const GENERATED_FILE_CONFIDENCE: f64 = 0.85;

/// Confidence of generated commit-message patterns.
const GENERATED_COMMIT_CONFIDENCE: f64 = 0.75;

/// Confidence of generated build/test patterns.
const GENERATED_CI_CONFIDENCE: f64 = 0.7;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The id does not exist in the queried partition(s).
    #[error("unknown todo id: {0}")]
    UnknownTodo(String),

    /// The id already exists in some partition.
    #[error("todo id already present: {0}")]
    DuplicateId(String),

    /// The todo is already archived.
    #[error("todo already completed: {0}")]
    AlreadyCompleted(String),

    /// Writing the store document failed.
    #[error("failed to persist store: {0}")]
    Persist(#[source] std::io::Error),

    /// Encoding the store document failed.
    #[error("failed to encode store: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// On-disk envelope for the partition set.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreFile {
    version: u32,
    saved_at: DateTime<Utc>,
    session: Vec<Todo>,
    project: Vec<Todo>,
    future: Vec<Todo>,
    archived: Vec<Todo>,
}

/// The partitioned todo collection.
#[derive(Debug)]
pub struct TodoStore {
    pub(crate) session: Vec<Todo>,
    pub(crate) project: Vec<Todo>,
    pub(crate) future: Vec<Todo>,
    pub(crate) archived: Vec<Todo>,
    default_category: String,
}

impl TodoStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(default_category: impl Into<String>) -> Self {
        Self {
            session: Vec::new(),
            project: Vec::new(),
            future: Vec::new(),
            archived: Vec::new(),
            default_category: default_category.into(),
        }
    }

    /// Loads a store from disk.
    ///
    /// Best-effort: a missing file, unreadable content, or an unknown
    /// schema version yields an empty store with a warning, never an
    /// error.
    #[must_use]
    pub fn load(path: &Path, default_category: impl Into<String>) -> Self {
        let default_category = default_category.into();

        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no prior store, starting empty");
                return Self::new(default_category);
            }
        };

        let file: StoreFile = match serde_json::from_str(&text) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt store, starting empty");
                return Self::new(default_category);
            }
        };

        if file.version != STORE_VERSION {
            warn!(
                path = %path.display(),
                version = file.version,
                expected = STORE_VERSION,
                "unsupported store version, starting empty"
            );
            return Self::new(default_category);
        }

        Self {
            session: file.session,
            project: file.project,
            future: file.future,
            archived: file.archived,
            default_category,
        }
    }

    /// Serializes the whole partition set to `path` as one document.
    ///
    /// When `backup` is set and a store already exists there, the old
    /// document is first copied to `<path>.<timestamp>.bak`.
    ///
    /// # Errors
    ///
    /// Save failures propagate; data loss must be visible to the caller.
    pub fn save(&self, path: &Path, backup: bool) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(StoreError::Persist)?;
        }

        if backup && path.exists() {
            let stamp = Utc::now().format("%Y%m%d%H%M%S");
            let backup_path = path.with_extension(format!("json.{stamp}.bak"));
            fs::copy(path, &backup_path).map_err(StoreError::Persist)?;
            debug!(backup = %backup_path.display(), "wrote store backup");
        }

        let file = StoreFile {
            version: STORE_VERSION,
            saved_at: Utc::now(),
            session: self.session.clone(),
            project: self.project.clone(),
            future: self.future.clone(),
            archived: self.archived.clone(),
        };

        let text = serde_json::to_string_pretty(&file)?;
        fs::write(path, text).map_err(StoreError::Persist)?;
        Ok(())
    }

    /// Todos in one partition, in insertion order.
    #[must_use]
    pub fn partition(&self, partition: Partition) -> &[Todo] {
        match partition {
            Partition::Session => &self.session,
            Partition::Project => &self.project,
            Partition::Future => &self.future,
            Partition::Archived => &self.archived,
        }
    }

    /// Locates an id across all partitions.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<(Partition, &Todo)> {
        for partition in [
            Partition::Session,
            Partition::Project,
            Partition::Future,
            Partition::Archived,
        ] {
            if let Some(todo) = self.partition(partition).iter().find(|t| t.id == id) {
                return Some((partition, todo));
            }
        }
        None
    }

    /// Stages a todo into the session partition.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateId` when the id already lives in any partition.
    pub fn stage(&mut self, todo: Todo) -> Result<()> {
        if self.find(&todo.id).is_some() {
            return Err(StoreError::DuplicateId(todo.id));
        }
        self.session.push(todo);
        Ok(())
    }

    /// Replaces the future partition with todos parsed from the backlog
    /// document. Entries whose id already lives elsewhere are skipped.
    pub fn replace_future(&mut self, todos: Vec<Todo>) {
        self.future.clear();
        for todo in todos {
            match self.find(&todo.id) {
                None => self.future.push(todo),
                Some((partition, _)) => {
                    debug!(id = %todo.id, ?partition, "backlog entry already tracked, skipping");
                }
            }
        }
    }

    /// Merges an incoming session todo list into the store.
    ///
    /// Unknown ids graduate into the project partition (category assigned,
    /// completion patterns generated). Known project ids merge: only
    /// `status` and `actual_hours` are overwritten, everything else is
    /// preserved, `updated_at` is refreshed. Archived records are never
    /// mutated. A todo counts as completed in the result only when both
    /// sides agree; genuine field conflicts are reported, never
    /// auto-resolved.
    pub fn sync_session(&mut self, incoming: Vec<Todo>) -> SyncResult {
        let mut result = SyncResult::default();

        for record in incoming {
            match self.find(&record.id).map(|(p, _)| p) {
                None => {
                    let id = record.id.clone();
                    let graduated = self.graduate(record);
                    if graduated.status == TodoStatus::Completed {
                        // Arrived already finished; archive it immediately so
                        // completed work never lingers in the project partition.
                        self.project.push(graduated);
                        let _ = self.complete(&id, "completed in session sync");
                    } else {
                        self.project.push(graduated);
                    }
                    result.added.push(id);
                }
                Some(Partition::Session) => {
                    let id = record.id.clone();
                    let staged = self.take(Partition::Session, &id);
                    let mut graduated = self.graduate(staged);
                    merge_fields(&mut graduated, &record, &mut result.conflicts);
                    let completed_now = graduated.status == TodoStatus::Completed;
                    self.project.push(graduated);
                    if completed_now {
                        let _ = self.complete(&id, "completed in session sync");
                    }
                    result.merged.push(id);
                }
                Some(Partition::Project) | Some(Partition::Future) => {
                    let id = record.id.clone();
                    let partition = self.find(&id).map(|(p, _)| p).unwrap_or(Partition::Project);
                    let list = match partition {
                        Partition::Future => &mut self.future,
                        _ => &mut self.project,
                    };
                    let stored = list
                        .iter_mut()
                        .find(|t| t.id == id)
                        .expect("id located above");

                    let was_completed = stored.status == TodoStatus::Completed;
                    merge_fields(stored, &record, &mut result.conflicts);
                    let is_completed = stored.status == TodoStatus::Completed;

                    if was_completed && is_completed {
                        result.completed.push(id.clone());
                    }
                    if is_completed {
                        let _ = self.complete(&id, "completed in session sync");
                    }
                    result.merged.push(id);
                }
                Some(Partition::Archived) => {
                    if record.status == TodoStatus::Completed {
                        result.completed.push(record.id.clone());
                    } else {
                        result.conflicts.push(FieldConflict {
                            todo_id: record.id.clone(),
                            field: "status".to_string(),
                            existing: "completed".to_string(),
                            incoming: status_label(record.status).to_string(),
                            recommendation: "keep archived record; completion is terminal"
                                .to_string(),
                        });
                    }
                }
            }
        }

        result
    }

    /// Moves one todo session→project (or future→project), assigning the
    /// category when given.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTodo` when the id is not staged in the session or
    /// future partition; this is a defined error, never a silent no-op.
    pub fn promote(&mut self, id: &str, category: Option<String>) -> Result<Todo> {
        let source = match self.find(id).map(|(p, _)| p) {
            Some(Partition::Session) => Partition::Session,
            Some(Partition::Future) => Partition::Future,
            _ => return Err(StoreError::UnknownTodo(id.to_string())),
        };

        let staged = self.take(source, id);
        let mut graduated = self.graduate(staged);
        if let Some(category) = category {
            graduated.category = Some(category);
        }
        let promoted = graduated.clone();
        self.project.push(graduated);
        Ok(promoted)
    }

    /// Completes a todo: stamps `completed_at`, appends an audit tag,
    /// moves it to the archived partition, and unblocks any project todo
    /// whose dependencies are now all satisfied.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyCompleted` for archived ids and `UnknownTodo` when
    /// the id is in no active partition.
    pub fn complete(&mut self, id: &str, audit_tag: &str) -> Result<Todo> {
        let source = match self.find(id).map(|(p, _)| p) {
            Some(Partition::Archived) => {
                return Err(StoreError::AlreadyCompleted(id.to_string()))
            }
            Some(partition) => partition,
            None => return Err(StoreError::UnknownTodo(id.to_string())),
        };

        let mut todo = self.take(source, id);
        let now = Utc::now();
        todo.status = TodoStatus::Completed;
        todo.completed_at = Some(now);
        todo.updated_at = now;
        todo.tags.push(audit_tag.to_string());
        self.archived.push(todo.clone());

        self.unblock_dependents(id);
        Ok(todo)
    }

    /// Completions within the trailing seven days.
    #[must_use]
    pub fn velocity(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(7);
        self.archived
            .iter()
            .filter(|t| t.completed_at.is_some_and(|at| at > cutoff))
            .count()
    }

    /// Whether every dependency of `todo` is completed.
    #[must_use]
    pub fn dependencies_satisfied(&self, todo: &Todo) -> bool {
        todo.depends_on
            .iter()
            .all(|dep| self.archived.iter().any(|a| a.id == *dep))
    }

    /// Removes a todo from a partition. Panics if absent; callers locate
    /// the id first via [`TodoStore::find`].
    fn take(&mut self, partition: Partition, id: &str) -> Todo {
        let list = match partition {
            Partition::Session => &mut self.session,
            Partition::Project => &mut self.project,
            Partition::Future => &mut self.future,
            Partition::Archived => &mut self.archived,
        };
        let idx = list
            .iter()
            .position(|t| t.id == id)
            .expect("id located before take");
        list.remove(idx)
    }

    /// Prepares a session todo for the project partition: assigns the
    /// default category when none is present, generates completion
    /// patterns, and refreshes `updated_at`.
    fn graduate(&self, mut todo: Todo) -> Todo {
        if todo.category.is_none() {
            todo.category = Some(self.default_category.clone());
        }
        if todo.patterns.is_empty() {
            todo.patterns = generate_patterns(&todo.content);
        }
        todo.updated_at = Utc::now();
        todo
    }

    /// Flips blocked project todos depending on `completed_id` back to
    /// pending when all their dependencies are satisfied.
    fn unblock_dependents(&mut self, completed_id: &str) {
        let archived_ids: Vec<String> = self.archived.iter().map(|t| t.id.clone()).collect();

        for todo in &mut self.project {
            if todo.status != TodoStatus::Blocked {
                continue;
            }
            if !todo.depends_on.iter().any(|dep| dep == completed_id) {
                continue;
            }
            let satisfied = todo
                .depends_on
                .iter()
                .all(|dep| archived_ids.iter().any(|a| a == dep));
            if satisfied {
                debug!(id = %todo.id, unblocked_by = %completed_id, "dependency satisfied");
                todo.status = TodoStatus::Pending;
                todo.updated_at = Utc::now();
            }
        }
    }
}

/// Merges the incoming record into the stored one.
///
/// Only `status` and `actual_hours` are overwritten; differing content or
/// priority is reported as a conflict with a recommendation.
fn merge_fields(stored: &mut Todo, incoming: &Todo, conflicts: &mut Vec<FieldConflict>) {
    if !incoming.content.is_empty() && incoming.content != stored.content {
        conflicts.push(FieldConflict {
            todo_id: stored.id.clone(),
            field: "content".to_string(),
            existing: stored.content.clone(),
            incoming: incoming.content.clone(),
            recommendation: "keep stored content; session wording differs".to_string(),
        });
    }

    if incoming.priority != stored.priority {
        let keep = if incoming.priority.rank() > stored.priority.rank() {
            "incoming"
        } else {
            "stored"
        };
        conflicts.push(FieldConflict {
            todo_id: stored.id.clone(),
            field: "priority".to_string(),
            existing: format!("{:?}", stored.priority).to_lowercase(),
            incoming: format!("{:?}", incoming.priority).to_lowercase(),
            recommendation: format!("keep the higher ({keep})"),
        });
    }

    stored.status = incoming.status;
    if incoming.actual_hours.is_some() {
        stored.actual_hours = incoming.actual_hours;
    }
    stored.updated_at = Utc::now();
}

/// Generates completion patterns from todo content on graduation.
///
/// Creation-shaped content yields file-exists patterns over plausible
/// extensions of the extracted target; implement/build content yields a
/// commit-message pattern from the keywords; deploy/build/CI mentions add
/// a build-succeeded pattern and test mentions a tests-passed pattern.
#[must_use]
pub fn generate_patterns(content: &str) -> Vec<CompletionPattern> {
    let lower = content.to_lowercase();
    let mut patterns = Vec::new();

    if lower.contains("create") || lower.contains("add") {
        if let Some(target) = extract_creation_target(content) {
            for ext in TARGET_EXTENSIONS {
                patterns.push(CompletionPattern::new(
                    PatternKind::FileExists,
                    format!("{target}{ext}"),
                    GENERATED_FILE_CONFIDENCE,
                ));
            }
        }
    }

    if lower.contains("implement") || lower.contains("build") {
        let tokens = keywords(content);
        if !tokens.is_empty() {
            patterns.push(CompletionPattern::new(
                PatternKind::CommitMessageMatches,
                tokens.join("|"),
                GENERATED_COMMIT_CONFIDENCE,
            ));
        }
    }

    if lower.contains("deploy") || lower.contains("build") || lower.contains(" ci") {
        patterns.push(CompletionPattern::new(
            PatternKind::BuildSucceeded,
            String::new(),
            GENERATED_CI_CONFIDENCE,
        ));
    }

    if lower.contains("test") {
        patterns.push(CompletionPattern::new(
            PatternKind::TestsPassed,
            String::new(),
            GENERATED_CI_CONFIDENCE,
        ));
    }

    patterns
}

/// Lowercase label of a status for conflict reports.
fn status_label(status: TodoStatus) -> &'static str {
    match status {
        TodoStatus::Pending => "pending",
        TodoStatus::InProgress => "in_progress",
        TodoStatus::Completed => "completed",
        TodoStatus::Blocked => "blocked",
        TodoStatus::Cancelled => "cancelled",
    }
}
