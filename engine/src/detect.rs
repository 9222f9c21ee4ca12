//! Completion detection against recent repository activity.
//!
//! Detection is organized as a list of pluggable [`DetectionStrategy`]
//! implementations so declared-pattern matching and the fallback heuristics
//! are interchangeable and independently testable. The
//! [`CompletionDetector`] consults them in order and returns the first
//! detection, which means pattern-based detections always win over
//! heuristics for the same todo in the same cycle.
//!
//! Policy thresholds (0.7 "worth surfacing", 0.9 "safe to auto-apply") are
//! owned by the orchestrator, not this module.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use regex::RegexBuilder;
use tracing::debug;

use crate::git::VcsReader;
use crate::types::{
    CompletionPattern, DetectionResult, DetectionType, GitCommitInfo, PatternKind,
    SuggestedAction, Todo,
};
use crate::utils::text::{base_name, extract_creation_target, file_stem, has_completion_verb, keywords};

/// Minimum confidence for a declared pattern to count as a match.
const PATTERN_CONFIDENCE_FLOOR: f64 = 0.5;

/// Minimum keyword-overlap score that produces a detection.
const KEYWORD_SCORE_FLOOR: f64 = 0.6;

/// Keyword-overlap score above which completion is suggested outright.
const KEYWORD_COMPLETE_THRESHOLD: f64 = 0.8;

/// Flat bonus added when a commit message carries a completion verb.
const COMPLETION_VERB_BONUS: f64 = 0.2;

/// Window for build/test success evidence.
const SUCCESS_WINDOW_HOURS: i64 = 24;

/// Base confidence for file-activity overlap.
const FILE_ACTIVITY_BASE: f64 = 0.7;

/// Per-file increment for file-activity overlap.
const FILE_ACTIVITY_STEP: f64 = 0.1;

/// Cap for file-activity confidence.
const FILE_ACTIVITY_CAP: f64 = 0.9;

/// Confidence assigned to creation-target matches.
const CREATION_TARGET_CONFIDENCE: f64 = 0.8;

/// Fixed success phrasings accepted as build/test evidence.
const SUCCESS_PHRASES: &[&str] = &[
    "build success",
    "build succeeded",
    "build passing",
    "tests passing",
    "tests passed",
    "all tests pass",
    "ci green",
];

/// A detection produced by one strategy, before it is tied to a todo id.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub detection_type: DetectionType,
    pub confidence: f64,
    pub evidence: String,
    pub suggested_action: SuggestedAction,
}

/// One way of deciding whether a todo's completion criteria are satisfied.
#[async_trait]
pub trait DetectionStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Evaluates one todo against the recent-commit window.
    async fn evaluate(
        &self,
        todo: &Todo,
        window: &[GitCommitInfo],
        vcs: &dyn VcsReader,
    ) -> Option<Detection>;
}

/// Evaluates the todo's declared completion patterns in order.
pub struct PatternStrategy;

#[async_trait]
impl DetectionStrategy for PatternStrategy {
    fn name(&self) -> &'static str {
        "pattern"
    }

    async fn evaluate(
        &self,
        todo: &Todo,
        window: &[GitCommitInfo],
        vcs: &dyn VcsReader,
    ) -> Option<Detection> {
        for pattern in &todo.patterns {
            if pattern.confidence <= PATTERN_CONFIDENCE_FLOOR {
                continue;
            }
            if let Some(evidence) = check_pattern(pattern, window, vcs).await {
                return Some(Detection {
                    detection_type: DetectionType::Pattern,
                    confidence: pattern.confidence,
                    evidence,
                    suggested_action: SuggestedAction::MarkCompleted,
                });
            }
        }
        None
    }
}

/// Tests a single pattern, returning evidence text on a match.
async fn check_pattern(
    pattern: &CompletionPattern,
    window: &[GitCommitInfo],
    vcs: &dyn VcsReader,
) -> Option<String> {
    match pattern.kind {
        PatternKind::FileExists => {
            if vcs.path_exists(&pattern.pattern).await {
                Some(format!("file exists: {}", pattern.pattern))
            } else {
                None
            }
        }
        PatternKind::FileContains => {
            let (path, needle) = pattern.pattern.split_once("::")?;
            let content = vcs.read_file(path).await?;
            if content.contains(needle) {
                Some(format!("{path} contains \"{needle}\""))
            } else {
                None
            }
        }
        PatternKind::CommitMessageMatches => {
            let re = match RegexBuilder::new(&pattern.pattern)
                .case_insensitive(true)
                .build()
            {
                Ok(re) => re,
                Err(e) => {
                    debug!(pattern = %pattern.pattern, error = %e, "skipping invalid commit-message pattern");
                    return None;
                }
            };
            window
                .iter()
                .find(|c| re.is_match(&c.message))
                .map(|c| format!("commit {} matches /{}/", short_hash(&c.hash), pattern.pattern))
        }
        PatternKind::BuildSucceeded | PatternKind::TestsPassed => {
            let cutoff = Utc::now() - Duration::hours(SUCCESS_WINDOW_HOURS);
            window
                .iter()
                .filter(|c| c.timestamp > cutoff)
                .find(|c| is_success_message(&c.message))
                .map(|c| format!("commit {} reports success: {}", short_hash(&c.hash), c.message))
        }
    }
}

/// Whether a commit message reports a successful build or test run.
fn is_success_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    if SUCCESS_PHRASES.iter().any(|p| lower.contains(p)) {
        return true;
    }
    // "N tests passed" with any count
    lower
        .split_whitespace()
        .collect::<Vec<_>>()
        .windows(3)
        .any(|w| {
            w[0].chars().all(|c| c.is_ascii_digit())
                && !w[0].is_empty()
                && (w[1] == "tests" || w[1] == "test")
                && w[2].starts_with("passed")
        })
}

/// Scores stop-word-filtered keyword overlap between todo content and
/// commit messages.
pub struct KeywordOverlapStrategy;

#[async_trait]
impl DetectionStrategy for KeywordOverlapStrategy {
    fn name(&self) -> &'static str {
        "keyword-overlap"
    }

    async fn evaluate(
        &self,
        todo: &Todo,
        window: &[GitCommitInfo],
        _vcs: &dyn VcsReader,
    ) -> Option<Detection> {
        let tokens = keywords(&todo.content);
        if tokens.is_empty() {
            return None;
        }

        for commit in window {
            let message_lower = commit.message.to_lowercase();
            let matched = tokens
                .iter()
                .filter(|t| message_lower.contains(t.as_str()))
                .count();
            if matched == 0 {
                continue;
            }

            let mut score = matched as f64 / tokens.len() as f64;
            if has_completion_verb(&commit.message) {
                score += COMPLETION_VERB_BONUS;
            }
            let score = score.min(1.0);

            if score > KEYWORD_SCORE_FLOOR {
                let action = if score > KEYWORD_COMPLETE_THRESHOLD {
                    SuggestedAction::MarkCompleted
                } else {
                    SuggestedAction::UpdateProgress
                };
                return Some(Detection {
                    detection_type: DetectionType::KeywordOverlap,
                    confidence: score,
                    evidence: format!(
                        "commit {} \"{}\" matched {}/{} keywords",
                        short_hash(&commit.hash),
                        commit.message,
                        matched,
                        tokens.len()
                    ),
                    suggested_action: action,
                });
            }
        }
        None
    }
}

/// Matches commit activity against the todo's related file paths.
pub struct FileActivityStrategy;

#[async_trait]
impl DetectionStrategy for FileActivityStrategy {
    fn name(&self) -> &'static str {
        "file-activity"
    }

    async fn evaluate(
        &self,
        todo: &Todo,
        window: &[GitCommitInfo],
        _vcs: &dyn VcsReader,
    ) -> Option<Detection> {
        if todo.related_files.is_empty() {
            return None;
        }

        for commit in window {
            let overlapping: Vec<&String> = commit
                .changed_files
                .iter()
                .filter(|changed| {
                    todo.related_files
                        .iter()
                        .any(|related| changed.contains(related) || related.contains(changed.as_str()))
                })
                .collect();

            if overlapping.is_empty() {
                continue;
            }

            let confidence = (FILE_ACTIVITY_BASE
                + FILE_ACTIVITY_STEP * overlapping.len() as f64)
                .min(FILE_ACTIVITY_CAP);
            return Some(Detection {
                detection_type: DetectionType::FileActivity,
                confidence,
                evidence: format!(
                    "commit {} touched related files: {}",
                    short_hash(&commit.hash),
                    overlapping
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                suggested_action: SuggestedAction::UpdateProgress,
            });
        }
        None
    }
}

/// Extracts a creation target from the todo content and looks for a
/// changed file carrying that name.
pub struct CreationTargetStrategy;

#[async_trait]
impl DetectionStrategy for CreationTargetStrategy {
    fn name(&self) -> &'static str {
        "creation-target"
    }

    async fn evaluate(
        &self,
        todo: &Todo,
        window: &[GitCommitInfo],
        _vcs: &dyn VcsReader,
    ) -> Option<Detection> {
        let target = extract_creation_target(&todo.content)?;
        let target_lower = target.to_lowercase();

        for commit in window {
            for changed in &commit.changed_files {
                let base = base_name(changed).to_lowercase();
                let stem = file_stem(changed).to_lowercase();
                if base.contains(&target_lower) || target_lower.contains(&stem) {
                    return Some(Detection {
                        detection_type: DetectionType::CreationTarget,
                        confidence: CREATION_TARGET_CONFIDENCE,
                        evidence: format!(
                            "commit {} added target \"{}\": {}",
                            short_hash(&commit.hash),
                            target,
                            changed
                        ),
                        suggested_action: SuggestedAction::MarkCompleted,
                    });
                }
            }
        }
        None
    }
}

/// Composes the strategies in precedence order.
pub struct CompletionDetector {
    strategies: Vec<Box<dyn DetectionStrategy>>,
}

impl CompletionDetector {
    /// Creates a detector with the default strategy order: declared
    /// patterns first, then keyword overlap, file activity, and the
    /// creation-target heuristic.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: vec![
                Box::new(PatternStrategy),
                Box::new(KeywordOverlapStrategy),
                Box::new(FileActivityStrategy),
                Box::new(CreationTargetStrategy),
            ],
        }
    }

    /// Creates a detector with a custom strategy list.
    #[must_use]
    pub fn with_strategies(strategies: Vec<Box<dyn DetectionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Evaluates one todo against the recent-commit window.
    ///
    /// Returns `None` for todos that are not pending or in progress, and
    /// when no strategy produces a detection.
    pub async fn evaluate(
        &self,
        todo: &Todo,
        window: &[GitCommitInfo],
        vcs: &dyn VcsReader,
    ) -> Option<DetectionResult> {
        if !todo.status.is_active() {
            return None;
        }

        for strategy in &self.strategies {
            if let Some(detection) = strategy.evaluate(todo, window, vcs).await {
                debug!(
                    todo_id = %todo.id,
                    strategy = strategy.name(),
                    confidence = detection.confidence,
                    "detection produced"
                );
                return Some(DetectionResult {
                    todo_id: todo.id.clone(),
                    detection_type: detection.detection_type,
                    confidence: detection.confidence,
                    evidence: detection.evidence,
                    suggested_action: detection.suggested_action,
                });
            }
        }
        None
    }
}

impl Default for CompletionDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// First eight characters of a commit hash.
fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(8)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::StaticVcs;
    use crate::types::{Priority, TodoStatus};

    fn commit(hash: &str, message: &str, files: &[&str]) -> GitCommitInfo {
        GitCommitInfo {
            hash: hash.to_string(),
            message: message.to_string(),
            author: "Ada".to_string(),
            timestamp: Utc::now(),
            changed_files: files.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn todo(content: &str) -> Todo {
        Todo::with_id("t1", content, Priority::Medium)
    }

    #[tokio::test]
    async fn completed_todos_are_skipped() {
        let mut done = todo("create PricingCalculator component");
        done.status = TodoStatus::Completed;

        let detector = CompletionDetector::new();
        let window = vec![commit("a", "add PricingCalculator", &["src/PricingCalculator.tsx"])];
        let result = detector.evaluate(&done, &window, &StaticVcs::new()).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn file_exists_pattern_fires() {
        let mut t = todo("create PricingCalculator component");
        t.patterns.push(CompletionPattern::new(
            PatternKind::FileExists,
            "PricingCalculator.tsx",
            0.85,
        ));

        let vcs = StaticVcs::new().with_tracked("src/components/PricingCalculator.tsx");
        let detector = CompletionDetector::new();

        let result = detector.evaluate(&t, &[], &vcs).await.unwrap();
        assert_eq!(result.detection_type, DetectionType::Pattern);
        assert_eq!(result.suggested_action, SuggestedAction::MarkCompleted);
        assert!((result.confidence - 0.85).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn file_contains_pattern_splits_on_double_colon() {
        let mut t = todo("document the rollout");
        t.patterns.push(CompletionPattern::new(
            PatternKind::FileContains,
            "docs/plan.md::rollout",
            0.8,
        ));

        let hit = StaticVcs::new().with_file("docs/plan.md", "## rollout plan");
        let detector = CompletionDetector::new();
        assert!(detector.evaluate(&t, &[], &hit).await.is_some());

        let miss = StaticVcs::new().with_file("docs/plan.md", "nothing here");
        // keyword fallback must not fire either: commit window is empty
        assert!(detector.evaluate(&t, &[], &miss).await.is_none());
    }

    #[tokio::test]
    async fn commit_message_pattern_is_case_insensitive() {
        let mut t = todo("implement payment retries");
        t.patterns.push(CompletionPattern::new(
            PatternKind::CommitMessageMatches,
            "payment.*retr",
            0.75,
        ));

        let window = vec![commit("abc", "Implement Payment Retries", &[])];
        let detector = CompletionDetector::new();

        let result = detector.evaluate(&t, &window, &StaticVcs::new()).await.unwrap();
        assert_eq!(result.detection_type, DetectionType::Pattern);
        assert!(result.evidence.contains("abc"));
    }

    #[tokio::test]
    async fn invalid_commit_regex_is_skipped_not_fatal() {
        let mut t = todo("implement thing");
        t.patterns.push(CompletionPattern::new(
            PatternKind::CommitMessageMatches,
            "([unclosed",
            0.9,
        ));

        let window = vec![commit("abc", "unrelated chore", &[])];
        let detector = CompletionDetector::new();
        assert!(detector.evaluate(&t, &window, &StaticVcs::new()).await.is_none());
    }

    #[tokio::test]
    async fn tests_passed_pattern_accepts_success_phrasings() {
        let mut t = todo("make the suite green");
        t.patterns.push(CompletionPattern::new(PatternKind::TestsPassed, "", 0.7));

        let window = vec![commit("abc", "ci: 42 tests passed", &[])];
        let detector = CompletionDetector::new();

        let result = detector.evaluate(&t, &window, &StaticVcs::new()).await.unwrap();
        assert_eq!(result.detection_type, DetectionType::Pattern);
    }

    #[test]
    fn success_message_phrasings() {
        assert!(is_success_message("Build success on main"));
        assert!(is_success_message("all tests pass now"));
        assert!(is_success_message("12 tests passed, 0 failed"));
        assert!(is_success_message("1 test passed"));
        assert!(!is_success_message("tests are flaky"));
        assert!(!is_success_message("wip"));
    }

    #[tokio::test]
    async fn low_confidence_patterns_are_ignored() {
        let mut t = todo("nothing in common here");
        t.patterns.push(CompletionPattern::new(
            PatternKind::FileExists,
            "main.rs",
            0.4,
        ));

        let vcs = StaticVcs::new().with_tracked("src/main.rs");
        let detector = CompletionDetector::new();
        assert!(detector.evaluate(&t, &[], &vcs).await.is_none());
    }

    #[tokio::test]
    async fn keyword_overlap_scores_and_suggests() {
        let t = todo("implement websocket reconnect backoff");
        let window = vec![commit(
            "abc",
            "implement websocket reconnect backoff with jitter",
            &[],
        )];

        let detector = CompletionDetector::new();
        let result = detector.evaluate(&t, &window, &StaticVcs::new()).await.unwrap();
        assert_eq!(result.detection_type, DetectionType::KeywordOverlap);
        // full overlap + completion verb, capped at 1.0
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(result.suggested_action, SuggestedAction::MarkCompleted);
    }

    #[tokio::test]
    async fn weak_keyword_overlap_is_no_detection() {
        let t = todo("implement websocket reconnect backoff strategy");
        let window = vec![commit("abc", "tweak websocket logging", &[])];

        let detector = CompletionDetector::new();
        assert!(detector.evaluate(&t, &window, &StaticVcs::new()).await.is_none());
    }

    #[tokio::test]
    async fn moderate_overlap_suggests_progress_update() {
        // 3/4 keywords matched, no completion verb: 0.75
        let t = todo("websocket reconnect backoff jitter");
        let window = vec![commit("abc", "tune reconnect backoff jitter", &[])];

        let detector = CompletionDetector::new();
        let result = detector.evaluate(&t, &window, &StaticVcs::new()).await.unwrap();
        assert_eq!(result.suggested_action, SuggestedAction::UpdateProgress);
        assert!((result.confidence - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn file_activity_confidence_scales_with_overlap() {
        let mut t = todo("migrate the storage layer");
        t.related_files = vec!["src/store.rs".to_string(), "src/migrate.rs".to_string()];

        let window = vec![commit(
            "abc",
            "checkpoint",
            &["src/store.rs", "src/migrate.rs", "README.md"],
        )];

        let detector = CompletionDetector::new();
        let result = detector.evaluate(&t, &window, &StaticVcs::new()).await.unwrap();
        assert_eq!(result.detection_type, DetectionType::FileActivity);
        assert!((result.confidence - 0.9).abs() < 1e-9);
        assert_eq!(result.suggested_action, SuggestedAction::UpdateProgress);
    }

    #[tokio::test]
    async fn creation_target_matches_changed_basename() {
        let t = todo("create PricingCalculator component");
        let window = vec![commit(
            "abc",
            "wip",
            &["src/components/PricingCalculator.tsx"],
        )];

        let detector = CompletionDetector::new();
        let result = detector.evaluate(&t, &window, &StaticVcs::new()).await.unwrap();
        assert_eq!(result.detection_type, DetectionType::CreationTarget);
        assert!((result.confidence - 0.8).abs() < f64::EPSILON);
        assert_eq!(result.suggested_action, SuggestedAction::MarkCompleted);
    }

    #[tokio::test]
    async fn pattern_detection_wins_over_heuristics() {
        // Both a declared pattern and the keyword heuristic would fire;
        // the pattern must win.
        let mut t = todo("implement payment retries");
        t.patterns.push(CompletionPattern::new(
            PatternKind::CommitMessageMatches,
            "payment",
            0.75,
        ));

        let window = vec![commit("abc", "implement payment retries", &[])];
        let detector = CompletionDetector::new();

        let result = detector.evaluate(&t, &window, &StaticVcs::new()).await.unwrap();
        assert_eq!(result.detection_type, DetectionType::Pattern);
    }

    #[tokio::test]
    async fn no_activity_means_no_detection() {
        let t = todo("create PricingCalculator component");
        let detector = CompletionDetector::new();
        assert!(detector.evaluate(&t, &[], &StaticVcs::new()).await.is_none());
    }
}
