//! Trend, bottleneck, and velocity analysis over the todo store.
//!
//! Everything here is derived on demand from the store's partitions and
//! never persisted. The snapshot serializes to camelCase JSON and is
//! forwarded verbatim by the daemon's `/analytics` endpoint.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::store::TodoStore;
use crate::types::{Partition, TodoStatus};

/// Days covered by the completion trend.
const TREND_DAYS: i64 = 14;

/// Age in days after which in-progress work counts as stale.
const STALE_DAYS: i64 = 7;

/// Completions on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub completed: usize,
}

/// A todo holding up other work or going stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bottleneck {
    pub todo_id: String,
    pub content: String,
    pub reason: String,
    /// Dependency ids still incomplete (empty for stale-work entries).
    pub waiting_on: Vec<String>,
}

/// Per-category totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub category: String,
    pub total: usize,
    pub completed: usize,
}

/// Point-in-time analytics over the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub generated_at: DateTime<Utc>,

    /// Completions in the trailing 7 days.
    pub velocity: usize,

    /// Per-day completions for the trailing 14 days, oldest first.
    pub completion_trend: Vec<TrendPoint>,

    /// Blocked and stale work items.
    pub bottlenecks: Vec<Bottleneck>,

    /// Totals per category across project and archived partitions.
    pub categories: Vec<CategoryStats>,

    /// Mean actual hours across completed todos that recorded effort.
    pub average_completion_hours: Option<f64>,
}

/// Builds an analytics snapshot from the store at `now`.
#[must_use]
pub fn snapshot(store: &TodoStore, now: DateTime<Utc>) -> AnalyticsSnapshot {
    AnalyticsSnapshot {
        generated_at: now,
        velocity: store.velocity(now),
        completion_trend: completion_trend(store, now),
        bottlenecks: bottlenecks(store, now),
        categories: categories(store),
        average_completion_hours: average_completion_hours(store),
    }
}

/// Per-day completion counts for the trailing window, oldest first.
fn completion_trend(store: &TodoStore, now: DateTime<Utc>) -> Vec<TrendPoint> {
    let today = now.date_naive();
    (0..TREND_DAYS)
        .rev()
        .map(|back| {
            let date = today - Duration::days(back);
            let completed = store
                .partition(Partition::Archived)
                .iter()
                .filter(|t| t.completed_at.is_some_and(|at| at.date_naive() == date))
                .count();
            TrendPoint { date, completed }
        })
        .collect()
}

/// Blocked todos with their unmet dependencies, plus stale in-progress
/// work.
fn bottlenecks(store: &TodoStore, now: DateTime<Utc>) -> Vec<Bottleneck> {
    let mut out = Vec::new();
    let stale_cutoff = now - Duration::days(STALE_DAYS);

    for todo in store.partition(Partition::Project) {
        match todo.status {
            TodoStatus::Blocked => {
                let waiting_on: Vec<String> = todo
                    .depends_on
                    .iter()
                    .filter(|dep| {
                        store
                            .partition(Partition::Archived)
                            .iter()
                            .all(|a| a.id != **dep)
                    })
                    .cloned()
                    .collect();
                out.push(Bottleneck {
                    todo_id: todo.id.clone(),
                    content: todo.content.clone(),
                    reason: format!("blocked on {} incomplete dependencies", waiting_on.len()),
                    waiting_on,
                });
            }
            TodoStatus::InProgress if todo.updated_at < stale_cutoff => {
                out.push(Bottleneck {
                    todo_id: todo.id.clone(),
                    content: todo.content.clone(),
                    reason: format!("in progress without updates for over {STALE_DAYS} days"),
                    waiting_on: Vec::new(),
                });
            }
            _ => {}
        }
    }

    out
}

/// Per-category totals across project and archived partitions.
fn categories(store: &TodoStore) -> Vec<CategoryStats> {
    let mut stats: Vec<CategoryStats> = Vec::new();

    for (partition, completed) in [(Partition::Project, false), (Partition::Archived, true)] {
        for todo in store.partition(partition) {
            let name = todo.category.as_deref().unwrap_or("uncategorized");
            let entry = match stats.iter_mut().find(|s| s.category == name) {
                Some(entry) => entry,
                None => {
                    stats.push(CategoryStats {
                        category: name.to_string(),
                        total: 0,
                        completed: 0,
                    });
                    stats.last_mut().expect("just pushed")
                }
            };
            entry.total += 1;
            if completed {
                entry.completed += 1;
            }
        }
    }

    stats.sort_by(|a, b| b.total.cmp(&a.total).then(a.category.cmp(&b.category)));
    stats
}

/// Mean actual hours across completed todos that recorded effort.
fn average_completion_hours(store: &TodoStore) -> Option<f64> {
    let hours: Vec<f64> = store
        .partition(Partition::Archived)
        .iter()
        .filter_map(|t| t.actual_hours)
        .collect();

    if hours.is_empty() {
        None
    } else {
        Some(hours.iter().sum::<f64>() / hours.len() as f64)
    }
}
