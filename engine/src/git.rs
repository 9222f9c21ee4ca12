//! Read-only queries against local repository history and working tree.
//!
//! The [`VcsReader`] trait isolates version-control access behind an
//! interface so the subprocess-based [`GitCli`] can later be swapped for a
//! library-based client without touching the detector or orchestrator.
//!
//! # Degradation
//!
//! Every query degrades to an empty result when the subprocess fails, times
//! out, exits non-zero, or produces unparseable output. Failures are logged
//! at debug level only; callers cannot distinguish "no activity" from "VCS
//! unavailable". Queries never mutate repository state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Command;
use tracing::debug;

use crate::types::GitCommitInfo;
use crate::utils::text::base_name;

/// Field separator used in the commit log pretty format.
const FIELD_SEP: char = '\u{1f}';

/// Record separator used in the commit log pretty format.
const RECORD_SEP: char = '\u{1e}';

/// Read-only access to repository history and the working tree.
#[async_trait]
pub trait VcsReader: Send + Sync {
    /// All commits on the current branch newer than `since`, newest first,
    /// with the paths each commit changed.
    async fn commits_since(&self, since: DateTime<Utc>) -> Vec<GitCommitInfo>;

    /// Name of the currently checked-out branch.
    async fn current_branch(&self) -> Option<String>;

    /// Paths with uncommitted changes in the working tree.
    async fn uncommitted_paths(&self) -> Vec<String>;

    /// Whether `pattern` resolves to an existing working-tree path, or any
    /// tracked file's path contains it (basename-level containment in
    /// either direction).
    async fn path_exists(&self, pattern: &str) -> bool;

    /// Raw content of a file in the working tree.
    async fn read_file(&self, path: &str) -> Option<String>;
}

/// Subprocess-backed [`VcsReader`] shelling out to the `git` binary.
///
/// Each query runs one `git` invocation pinned to the repository root and
/// guarded by a bounded timeout, so a hung subprocess cannot stall the
/// scheduler.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_dir: PathBuf,
    timeout: Duration,
}

impl GitCli {
    /// Creates a reader for the repository at `repo_dir`.
    #[must_use]
    pub fn new(repo_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            timeout,
        }
    }

    /// Runs one git query, returning stdout on success.
    ///
    /// Returns `None` on spawn failure, non-zero exit, or timeout.
    async fn run(&self, args: &[&str]) -> Option<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(out)) if out.status.success() => {
                Some(String::from_utf8_lossy(&out.stdout).to_string())
            }
            Ok(Ok(out)) => {
                debug!(
                    args = ?args,
                    exit_code = out.status.code().unwrap_or(-1),
                    "git query exited non-zero"
                );
                None
            }
            Ok(Err(e)) => {
                debug!(args = ?args, error = %e, "git query failed to run");
                None
            }
            Err(_) => {
                debug!(args = ?args, timeout = ?self.timeout, "git query timed out");
                None
            }
        }
    }
}

#[async_trait]
impl VcsReader for GitCli {
    async fn commits_since(&self, since: DateTime<Utc>) -> Vec<GitCommitInfo> {
        let since_arg = format!("--since={}", since.to_rfc3339());
        let pretty = format!(
            "--pretty=format:{RECORD_SEP}%H{FIELD_SEP}%an{FIELD_SEP}%aI{FIELD_SEP}%s"
        );

        let Some(stdout) = self
            .run(&["log", &since_arg, "--name-only", &pretty])
            .await
        else {
            return Vec::new();
        };

        parse_log(&stdout)
    }

    async fn current_branch(&self) -> Option<String> {
        let stdout = self.run(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        let branch = stdout.trim();
        if branch.is_empty() {
            None
        } else {
            Some(branch.to_string())
        }
    }

    async fn uncommitted_paths(&self) -> Vec<String> {
        let Some(stdout) = self.run(&["status", "--porcelain"]).await else {
            return Vec::new();
        };

        stdout
            .lines()
            .filter(|line| line.len() > 3)
            .map(|line| line[3..].trim().to_string())
            .collect()
    }

    async fn path_exists(&self, pattern: &str) -> bool {
        if self.repo_dir.join(pattern).exists() {
            return true;
        }

        let Some(stdout) = self.run(&["ls-files"]).await else {
            return false;
        };

        stdout
            .lines()
            .any(|path| path_matches(path, pattern))
    }

    async fn read_file(&self, path: &str) -> Option<String> {
        match tokio::fs::read_to_string(self.repo_dir.join(path)).await {
            Ok(content) => Some(content),
            Err(e) => {
                debug!(path = %path, error = %e, "failed to read file");
                None
            }
        }
    }
}

/// Containment test between a tracked path and a pattern.
///
/// Case-insensitive; matches when the full path contains the pattern or
/// the pattern contains the path's base name.
fn path_matches(path: &str, pattern: &str) -> bool {
    let path_l = path.to_lowercase();
    let pattern_l = pattern.to_lowercase();
    let base_l = base_name(&path_l);
    path_l.contains(&pattern_l) || pattern_l.contains(base_l)
}

/// Parses `git log --name-only` output in the record-separated format.
fn parse_log(stdout: &str) -> Vec<GitCommitInfo> {
    let mut commits = Vec::new();

    for record in stdout.split(RECORD_SEP).filter(|r| !r.trim().is_empty()) {
        let mut lines = record.lines();
        let Some(header) = lines.next() else {
            continue;
        };

        let fields: Vec<&str> = header.split(FIELD_SEP).collect();
        if fields.len() != 4 {
            debug!(header = %header, "skipping malformed log record");
            continue;
        }

        let Ok(timestamp) = DateTime::parse_from_rfc3339(fields[2]) else {
            debug!(date = %fields[2], "skipping log record with unparseable date");
            continue;
        };

        let changed_files = lines
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        commits.push(GitCommitInfo {
            hash: fields[0].to_string(),
            author: fields[1].to_string(),
            timestamp: timestamp.with_timezone(&Utc),
            message: fields[3].to_string(),
            changed_files,
        });
    }

    commits
}

/// In-memory [`VcsReader`] returning canned data.
///
/// Used by detector and orchestrator tests, and useful for embedding the
/// engine where no repository is available.
#[derive(Debug, Clone, Default)]
pub struct StaticVcs {
    commits: Vec<GitCommitInfo>,
    tracked: Vec<String>,
    files: Vec<(String, String)>,
    branch: Option<String>,
    uncommitted: Vec<String>,
}

impl StaticVcs {
    /// Creates an empty reader (a repository with no activity).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a commit to the canned history.
    #[must_use]
    pub fn with_commit(mut self, commit: GitCommitInfo) -> Self {
        self.commits.push(commit);
        self
    }

    /// Marks a path as tracked (and existing).
    #[must_use]
    pub fn with_tracked(mut self, path: impl Into<String>) -> Self {
        self.tracked.push(path.into());
        self
    }

    /// Adds a readable file with content.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        self.tracked.push(path.clone());
        self.files.push((path, content.into()));
        self
    }

    /// Sets the current branch name.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Adds an uncommitted path.
    #[must_use]
    pub fn with_uncommitted(mut self, path: impl Into<String>) -> Self {
        self.uncommitted.push(path.into());
        self
    }
}

#[async_trait]
impl VcsReader for StaticVcs {
    async fn commits_since(&self, since: DateTime<Utc>) -> Vec<GitCommitInfo> {
        self.commits
            .iter()
            .filter(|c| c.timestamp > since)
            .cloned()
            .collect()
    }

    async fn current_branch(&self) -> Option<String> {
        self.branch.clone()
    }

    async fn uncommitted_paths(&self) -> Vec<String> {
        self.uncommitted.clone()
    }

    async fn path_exists(&self, pattern: &str) -> bool {
        self.tracked.iter().any(|path| path_matches(path, pattern))
    }

    async fn read_file(&self, path: &str) -> Option<String> {
        self.files
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, content)| content.clone())
    }
}
