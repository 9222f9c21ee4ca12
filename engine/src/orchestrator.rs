//! The sole entry point composing the store, detector, reader, and
//! analytics into the engine's operations.
//!
//! An [`Orchestrator`] is an explicit long-lived handle owned by the
//! caller, with an `initialize`/`shutdown` lifecycle. Interior state (the
//! store, the sync watermark, preserved backlog sections) lives behind one
//! `tokio::sync::Mutex`, which doubles as the run-in-progress guard: two
//! detection passes can never mutate the store concurrently, and
//! timer-driven cycles skip instead of queueing when a cycle is already
//! running.
//!
//! # Failure semantics
//!
//! Version-control-dependent operations degrade to empty results (the
//! reader swallows subprocess failures). Unknown-identifier operations
//! return an error to the immediate caller. Persistence save failures
//! propagate so data loss stays visible.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::analytics::{self, AnalyticsSnapshot};
use crate::backlog::{self, RawSection};
use crate::config::EngineConfig;
use crate::detect::CompletionDetector;
use crate::error::{EngineError, Result};
use crate::git::VcsReader;
use crate::store::TodoStore;
use crate::types::{
    DetectionResult, Partition, ProgressReport, Suggestion, SuggestedAction, SyncResult, Todo,
};

/// Detections below this confidence are not surfaced to callers.
const SURFACE_THRESHOLD: f64 = 0.7;

/// Interactive auto-apply threshold for completion detections.
const AUTO_APPLY_THRESHOLD: f64 = 0.9;

/// How far back the first detection window reaches on a fresh start.
const INITIAL_WINDOW_HOURS: i64 = 24;

/// Number of todos included in the progress report's pending list.
const TOP_PENDING_LIMIT: usize = 10;

/// Maximum number of smart suggestions returned.
const SUGGESTION_LIMIT: usize = 5;

/// Mutable engine state behind the run-in-progress guard.
struct Inner {
    store: TodoStore,
    /// Timestamp boundary bounding "recent" commit queries between cycles.
    watermark: DateTime<Utc>,
    /// Backlog sections preserved verbatim across re-exports.
    preserved: Vec<RawSection>,
}

/// Long-lived handle over the task-tracking engine.
pub struct Orchestrator {
    config: EngineConfig,
    vcs: Arc<dyn VcsReader>,
    detector: CompletionDetector,
    inner: Mutex<Inner>,
}

impl Orchestrator {
    /// Creates an orchestrator over the given reader. The store is empty
    /// until [`Orchestrator::initialize`] loads persisted state.
    #[must_use]
    pub fn new(config: EngineConfig, vcs: Arc<dyn VcsReader>) -> Self {
        let watermark = Utc::now() - Duration::hours(INITIAL_WINDOW_HOURS);
        let store = TodoStore::new(config.default_category.clone());
        Self {
            config,
            vcs,
            detector: CompletionDetector::new(),
            inner: Mutex::new(Inner {
                store,
                watermark,
                preserved: Vec::new(),
            }),
        }
    }

    /// Loads persisted state and imports the future-backlog document,
    /// optionally running one detection pass when configured.
    pub async fn initialize(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock().await;
            inner.store =
                TodoStore::load(&self.config.store_path(), self.config.default_category.clone());

            let doc = backlog::load_document(&self.config.backlog_path);
            inner.store.replace_future(doc.todos);
            inner.preserved = doc.preserved;

            info!(
                project = inner.store.partition(Partition::Project).len(),
                future = inner.store.partition(Partition::Future).len(),
                archived = inner.store.partition(Partition::Archived).len(),
                "engine initialized"
            );
        }

        if self.config.detect_on_init {
            let results = self.run_completion_detection().await?;
            debug!(count = results.len(), "startup detection pass finished");
        }
        Ok(())
    }

    /// Persists the store one final time.
    pub async fn shutdown(&self) -> Result<()> {
        let inner = self.inner.lock().await;
        self.save(&inner)?;
        info!("engine shut down");
        Ok(())
    }

    /// Merges a session todo list into the store, persists, re-exports the
    /// backlog document, and advances the sync watermark.
    pub async fn sync_session_todos(&self, list: Vec<Todo>) -> Result<SyncResult> {
        let mut inner = self.inner.lock().await;
        let result = inner.store.sync_session(list);
        self.save(&inner)?;
        self.export_backlog(&inner)?;
        inner.watermark = Utc::now();

        info!(
            added = result.added.len(),
            merged = result.merged.len(),
            completed = result.completed.len(),
            conflicts = result.conflicts.len(),
            "session sync finished"
        );
        Ok(result)
    }

    /// Runs one detection cycle over every pending or in-progress project
    /// todo, auto-applying completions above the interactive threshold.
    ///
    /// Returns all detections worth surfacing (confidence above 0.7).
    pub async fn run_completion_detection(&self) -> Result<Vec<DetectionResult>> {
        let mut inner = self.inner.lock().await;
        self.detect_cycle(&mut inner, AUTO_APPLY_THRESHOLD).await
    }

    /// Timer-friendly detection: returns `Ok(None)` without running when a
    /// cycle already holds the guard.
    pub async fn try_run_completion_detection(
        &self,
        auto_apply_threshold: f64,
    ) -> Result<Option<Vec<DetectionResult>>> {
        let Ok(mut inner) = self.inner.try_lock() else {
            debug!("detection cycle skipped: another cycle is in progress");
            return Ok(None);
        };
        self.detect_cycle(&mut inner, auto_apply_threshold)
            .await
            .map(Some)
    }

    /// Manually completes a todo; the transition is identical to an
    /// auto-applied detection.
    pub async fn mark_todo_completed(&self, id: &str, reason: Option<String>) -> Result<Todo> {
        let mut inner = self.inner.lock().await;
        let audit = match reason {
            Some(reason) => format!("completed: {reason}"),
            None => "completed: manual".to_string(),
        };
        let todo = inner.store.complete(id, &audit)?;
        self.save(&inner)?;
        self.export_backlog(&inner)?;
        info!(id = %todo.id, "todo completed");
        Ok(todo)
    }

    /// Promotes a staged or future todo into the project partition.
    pub async fn promote_todo(&self, id: &str, category: Option<String>) -> Result<Todo> {
        let mut inner = self.inner.lock().await;
        let todo = inner.store.promote(id, category)?;
        self.save(&inner)?;
        self.export_backlog(&inner)?;
        Ok(todo)
    }

    /// Builds the progress report over the project and archived
    /// partitions.
    pub async fn generate_progress_report(&self) -> ProgressReport {
        let inner = self.inner.lock().await;
        let now = Utc::now();
        let store = &inner.store;

        let project = store.partition(Partition::Project);
        let completed = store.partition(Partition::Archived).len();
        let total = project.len() + completed;
        let completion_rate = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64
        };

        let velocity = store.velocity(now);

        let hours: Vec<f64> = store
            .partition(Partition::Archived)
            .iter()
            .filter_map(|t| t.actual_hours)
            .collect();
        let average_completion_hours = if hours.is_empty() {
            None
        } else {
            Some(hours.iter().sum::<f64>() / hours.len() as f64)
        };

        let remaining = project.len();
        let projected_completion = if remaining == 0 {
            None
        } else {
            // linear projection; the divisor is floored at one completion
            // per week so an idle week still yields a date
            let weeks = remaining as f64 / velocity.max(1) as f64;
            let seconds = (weeks * 7.0 * 86_400.0) as i64;
            Some(now + Duration::seconds(seconds))
        };

        let mut top_pending: Vec<Todo> = project
            .iter()
            .filter(|t| t.status == crate::types::TodoStatus::Pending)
            .filter(|t| store.dependencies_satisfied(t))
            .cloned()
            .collect();
        top_pending.sort_by(|a, b| {
            b.priority
                .rank()
                .cmp(&a.priority.rank())
                .then(b.updated_at.cmp(&a.updated_at))
        });
        top_pending.truncate(TOP_PENDING_LIMIT);

        ProgressReport {
            total,
            completed,
            completion_rate,
            velocity,
            average_completion_hours,
            projected_completion,
            top_pending,
        }
    }

    /// Suggests up to five unblocked pending todos, preferring overlap
    /// with the caller's current file paths. When no context is supplied,
    /// the repository's uncommitted paths stand in for it.
    pub async fn get_smart_suggestions(&self, context: &[String]) -> Vec<Suggestion> {
        let context = if context.is_empty() {
            self.vcs.uncommitted_paths().await
        } else {
            context.to_vec()
        };

        let inner = self.inner.lock().await;

        let mut ranked: Vec<(usize, Todo)> = inner
            .store
            .partition(Partition::Project)
            .iter()
            .filter(|t| t.status == crate::types::TodoStatus::Pending)
            .filter(|t| inner.store.dependencies_satisfied(t))
            .map(|t| (context_overlap(t, &context), t.clone()))
            .collect();

        ranked.sort_by(|(oa, a), (ob, b)| {
            ob.cmp(oa)
                .then(b.priority.rank().cmp(&a.priority.rank()))
                .then(b.updated_at.cmp(&a.updated_at))
        });

        ranked
            .into_iter()
            .take(SUGGESTION_LIMIT)
            .map(|(overlap, todo)| {
                let reason = if overlap > 0 {
                    format!("touches {overlap} of your current files")
                } else {
                    format!("{:?} priority, unblocked", todo.priority).to_lowercase()
                };
                Suggestion { todo, reason }
            })
            .collect()
    }

    /// Re-exports the future-backlog document without other changes.
    ///
    /// Used by the scheduler's slower sync cycle to keep the external
    /// document fresh between session syncs.
    pub async fn refresh_backlog(&self) -> Result<()> {
        let inner = self.inner.lock().await;
        self.export_backlog(&inner)
    }

    /// Builds the analytics snapshot.
    pub async fn analytics_snapshot(&self) -> AnalyticsSnapshot {
        let inner = self.inner.lock().await;
        analytics::snapshot(&inner.store, Utc::now())
    }

    /// Lists todos, optionally restricted to one partition.
    pub async fn list_todos(&self, partition: Option<Partition>) -> Vec<(Partition, Todo)> {
        let inner = self.inner.lock().await;
        let partitions = match partition {
            Some(p) => vec![p],
            None => vec![
                Partition::Session,
                Partition::Project,
                Partition::Future,
                Partition::Archived,
            ],
        };

        partitions
            .into_iter()
            .flat_map(|p| {
                inner
                    .store
                    .partition(p)
                    .iter()
                    .map(move |t| (p, t.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// One detection cycle with the guard already held.
    async fn detect_cycle(
        &self,
        inner: &mut Inner,
        auto_apply_threshold: f64,
    ) -> Result<Vec<DetectionResult>> {
        let window = self.vcs.commits_since(inner.watermark).await;
        let branch = self.vcs.current_branch().await;
        debug!(
            commits = window.len(),
            branch = branch.as_deref().unwrap_or("unknown"),
            watermark = %inner.watermark,
            "starting detection cycle"
        );

        let candidates: Vec<Todo> = inner
            .store
            .partition(Partition::Project)
            .iter()
            .filter(|t| t.status.is_active())
            .cloned()
            .collect();

        let mut results = Vec::new();
        for todo in &candidates {
            if let Some(result) = self
                .detector
                .evaluate(todo, &window, self.vcs.as_ref())
                .await
            {
                results.push(result);
            }
        }

        let mut mutated = false;
        for result in &results {
            if result.confidence > auto_apply_threshold
                && result.suggested_action == SuggestedAction::MarkCompleted
            {
                let audit = format!("auto-completed: {}", result.evidence);
                match inner.store.complete(&result.todo_id, &audit) {
                    Ok(done) => {
                        mutated = true;
                        info!(id = %done.id, confidence = result.confidence, "auto-applied completion");
                    }
                    Err(e) => warn!(id = %result.todo_id, error = %e, "auto-apply failed"),
                }
            }
        }

        if mutated {
            self.save(inner)?;
            self.export_backlog(inner)?;
        }

        results.retain(|r| r.confidence > SURFACE_THRESHOLD);
        Ok(results)
    }

    /// Persists the store; save failures are fatal to the calling
    /// operation.
    fn save(&self, inner: &Inner) -> Result<()> {
        inner
            .store
            .save(&self.config.store_path(), self.config.backups)
            .map_err(EngineError::Store)
    }

    /// Rewrites the backlog document from the future partition.
    fn export_backlog(&self, inner: &Inner) -> Result<()> {
        backlog::write_document(
            &self.config.backlog_path,
            inner.store.partition(Partition::Future),
            &inner.preserved,
        )
        .map_err(EngineError::Io)
    }
}

/// Counts related files overlapping the caller-supplied context paths
/// (substring containment in either direction).
fn context_overlap(todo: &Todo, context: &[String]) -> usize {
    todo.related_files
        .iter()
        .filter(|related| {
            context
                .iter()
                .any(|current| current.contains(related.as_str()) || related.contains(current.as_str()))
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::StaticVcs;
    use crate::types::{GitCommitInfo, Priority, TodoStatus};

    fn test_config(dir: &std::path::Path) -> EngineConfig {
        EngineConfig {
            repo_dir: dir.to_path_buf(),
            data_dir: dir.join("data"),
            backlog_path: dir.join("BACKLOG.md"),
            backups: false,
            git_timeout_secs: 5,
            default_category: "general".to_string(),
            detect_on_init: false,
        }
    }

    fn session_todo(id: &str, content: &str) -> Todo {
        Todo::with_id(id, content, Priority::Medium)
    }

    fn commit(hash: &str, message: &str, files: &[&str]) -> GitCommitInfo {
        GitCommitInfo {
            hash: hash.to_string(),
            message: message.to_string(),
            author: "Ada".to_string(),
            timestamp: Utc::now(),
            changed_files: files.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn initialize_imports_backlog_into_future() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        std::fs::write(
            &config.backlog_path,
            "## High Priority\n\n- [ ] Wire the billing webhooks\n",
        )
        .unwrap();

        let orch = Orchestrator::new(config, Arc::new(StaticVcs::new()));
        orch.initialize().await.unwrap();

        let future = orch.list_todos(Some(Partition::Future)).await;
        assert_eq!(future.len(), 1);
        assert_eq!(future[0].1.content, "Wire the billing webhooks");
    }

    #[tokio::test]
    async fn sync_persists_and_rewrites_backlog() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let store_path = config.store_path();
        let backlog_path = config.backlog_path.clone();

        let orch = Orchestrator::new(config, Arc::new(StaticVcs::new()));
        orch.initialize().await.unwrap();

        let result = orch
            .sync_session_todos(vec![session_todo("t1", "create LoginForm component")])
            .await
            .unwrap();
        assert_eq!(result.added, vec!["t1"]);

        assert!(store_path.exists(), "store persisted per mutation");
        assert!(backlog_path.exists(), "backlog re-exported on sync");
    }

    #[tokio::test]
    async fn detection_surfaces_generated_pattern_match() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let vcs = StaticVcs::new()
            .with_tracked("src/components/PricingCalculator.tsx")
            .with_commit(commit(
                "abc",
                "wip",
                &["src/components/PricingCalculator.tsx"],
            ));

        let orch = Orchestrator::new(config, Arc::new(vcs));
        orch.initialize().await.unwrap();
        orch.sync_session_todos(vec![session_todo(
            "t1",
            "create PricingCalculator component",
        )])
        .await
        .unwrap();

        let results = orch.run_completion_detection().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].todo_id, "t1");
        assert_eq!(results[0].suggested_action, SuggestedAction::MarkCompleted);
        assert!(results[0].confidence > SURFACE_THRESHOLD);

        // 0.85 pattern confidence is below the interactive auto-apply bar
        let inner = orch.inner.lock().await;
        assert_eq!(inner.store.find("t1").unwrap().0, Partition::Project);
    }

    #[tokio::test]
    async fn scheduler_threshold_auto_applies_pattern_match() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let vcs = StaticVcs::new().with_tracked("src/components/PricingCalculator.tsx");
        let orch = Orchestrator::new(config, Arc::new(vcs));
        orch.initialize().await.unwrap();
        orch.sync_session_todos(vec![session_todo(
            "t1",
            "create PricingCalculator component",
        )])
        .await
        .unwrap();

        let results = orch
            .try_run_completion_detection(0.8)
            .await
            .unwrap()
            .expect("guard was free");
        assert_eq!(results.len(), 1);

        let inner = orch.inner.lock().await;
        assert_eq!(inner.store.find("t1").unwrap().0, Partition::Archived);
        let archived = inner.store.find("t1").unwrap().1;
        assert!(archived.tags.iter().any(|t| t.starts_with("auto-completed:")));
    }

    #[tokio::test]
    async fn detection_guard_skips_when_held() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let orch = Orchestrator::new(config, Arc::new(StaticVcs::new()));
        orch.initialize().await.unwrap();

        let _guard = orch.inner.lock().await;
        let skipped = orch.try_run_completion_detection(0.8).await.unwrap();
        assert!(skipped.is_none());
    }

    #[tokio::test]
    async fn unknown_id_errors_reach_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let orch = Orchestrator::new(test_config(dir.path()), Arc::new(StaticVcs::new()));
        orch.initialize().await.unwrap();

        let err = orch.mark_todo_completed("ghost", None).await.unwrap_err();
        assert!(err.is_unknown_id());

        let err = orch.promote_todo("ghost", None).await.unwrap_err();
        assert!(err.is_unknown_id());
    }

    #[tokio::test]
    async fn progress_report_rates_and_velocity() {
        let dir = tempfile::tempdir().unwrap();
        let orch = Orchestrator::new(test_config(dir.path()), Arc::new(StaticVcs::new()));
        orch.initialize().await.unwrap();

        let todos: Vec<Todo> = (0..10)
            .map(|i| session_todo(&format!("t{i}"), &format!("work item {i}")))
            .collect();
        orch.sync_session_todos(todos).await.unwrap();

        for id in ["t0", "t1", "t2", "t3"] {
            orch.mark_todo_completed(id, None).await.unwrap();
        }

        // age two completions out of the velocity window
        {
            let mut inner = orch.inner.lock().await;
            for todo in inner.store.archived.iter_mut().take(2) {
                todo.completed_at = Some(Utc::now() - Duration::days(10));
            }
        }

        let report = orch.generate_progress_report().await;
        assert_eq!(report.total, 10);
        assert_eq!(report.completed, 4);
        assert!((report.completion_rate - 0.4).abs() < 1e-9);
        assert_eq!(report.velocity, 2);
        assert!(report.projected_completion.is_some());
        assert_eq!(report.top_pending.len(), 6);
    }

    #[tokio::test]
    async fn report_excludes_blocked_todos_from_top_pending() {
        let dir = tempfile::tempdir().unwrap();
        let orch = Orchestrator::new(test_config(dir.path()), Arc::new(StaticVcs::new()));
        orch.initialize().await.unwrap();

        let mut blocked = session_todo("b", "blocked work");
        blocked.status = TodoStatus::Blocked;
        blocked.depends_on = vec!["missing".to_string()];
        let mut high = session_todo("h", "urgent work");
        high.priority = Priority::Critical;
        orch.sync_session_todos(vec![blocked, high, session_todo("m", "normal work")])
            .await
            .unwrap();

        let report = orch.generate_progress_report().await;
        assert_eq!(report.top_pending.len(), 2);
        assert_eq!(report.top_pending[0].id, "h", "critical first");
    }

    #[tokio::test]
    async fn suggestions_prefer_context_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let orch = Orchestrator::new(test_config(dir.path()), Arc::new(StaticVcs::new()));
        orch.initialize().await.unwrap();

        let mut related = session_todo("r", "refactor the store");
        related.related_files = vec!["src/store.rs".to_string()];
        let mut urgent = session_todo("u", "urgent but elsewhere");
        urgent.priority = Priority::Critical;
        orch.sync_session_todos(vec![related, urgent]).await.unwrap();

        let suggestions = orch
            .get_smart_suggestions(&["src/store.rs".to_string()])
            .await;
        assert_eq!(suggestions[0].todo.id, "r");
        assert!(suggestions[0].reason.contains("current files"));

        let without_context = orch.get_smart_suggestions(&[]).await;
        assert_eq!(without_context[0].todo.id, "u");
    }

    #[tokio::test]
    async fn suggestions_fall_back_to_uncommitted_paths() {
        let dir = tempfile::tempdir().unwrap();
        let vcs = StaticVcs::new().with_uncommitted("src/store.rs");
        let orch = Orchestrator::new(test_config(dir.path()), Arc::new(vcs));
        orch.initialize().await.unwrap();

        let mut related = session_todo("r", "refactor the store");
        related.related_files = vec!["src/store.rs".to_string()];
        let mut urgent = session_todo("u", "urgent but elsewhere");
        urgent.priority = Priority::Critical;
        orch.sync_session_todos(vec![related, urgent]).await.unwrap();

        // no explicit context: the dirty working tree stands in for it
        let suggestions = orch.get_smart_suggestions(&[]).await;
        assert_eq!(suggestions[0].todo.id, "r");
    }

    #[tokio::test]
    async fn shutdown_persists_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let store_path = config.store_path();

        let orch = Orchestrator::new(config.clone(), Arc::new(StaticVcs::new()));
        orch.initialize().await.unwrap();
        orch.sync_session_todos(vec![session_todo("t1", "survives restart")])
            .await
            .unwrap();
        orch.shutdown().await.unwrap();
        assert!(store_path.exists());

        let reloaded = Orchestrator::new(config, Arc::new(StaticVcs::new()));
        reloaded.initialize().await.unwrap();
        let project = reloaded.list_todos(Some(Partition::Project)).await;
        assert_eq!(project.len(), 1);
        assert_eq!(project[0].1.id, "t1");
    }
}
