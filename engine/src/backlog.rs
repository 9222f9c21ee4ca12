//! The external future-backlog document.
//!
//! The backlog is a markdown file with one section per priority
//! (`## High Priority` etc.), parsed into todos for the store's `future`
//! partition and rewritten after every sync and completion. Sections the
//! parser does not recognize are preserved verbatim and re-emitted at the
//! end of the document, so hand-written notes survive round trips.
//!
//! # Item format
//!
//! ```markdown
//! ## High Priority
//!
//! - [ ] Wire the billing webhooks (category: billing | est: 3h | tags: api, stripe)
//! - [x] Already done items are skipped
//! ```
//!
//! Malformed items are skipped with a warning; parsing always continues.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::{Priority, Todo, TodoStatus};

/// Namespace for deterministic backlog item ids, so re-imports of an
/// unchanged title map to the same todo id.
const BACKLOG_NAMESPACE: Uuid = Uuid::from_bytes([
    0x74, 0x61, 0x73, 0x6b, // "task"
    0x70, 0x75, 0x6c, 0x73, // "puls"
    0x65, 0x2d, 0x62, 0x61, // "e-ba"
    0x63, 0x6b, 0x6c, 0x67, // "cklg"
]);

/// Heading line of the rendered document.
const DOCUMENT_TITLE: &str = "# Backlog";

/// A verbatim-preserved section the parser did not recognize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSection {
    /// The heading line, including the leading `##`.
    pub heading: String,
    /// Body lines exactly as read.
    pub body: String,
}

/// Parse result: future todos plus sections preserved verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BacklogDocument {
    pub todos: Vec<Todo>,
    pub preserved: Vec<RawSection>,
}

/// Reads and parses the backlog document at `path`.
///
/// A missing document yields an empty backlog (the file appears on the
/// first export); read failures are logged and treated the same way.
#[must_use]
pub fn load_document(path: &Path) -> BacklogDocument {
    match fs::read_to_string(path) {
        Ok(text) => parse_document(&text),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no backlog document, starting empty");
            BacklogDocument::default()
        }
    }
}

/// Renders and writes the backlog document.
///
/// # Errors
///
/// Write failures propagate; the rewritten backlog is part of the durable
/// state.
pub fn write_document(
    path: &Path,
    todos: &[Todo],
    preserved: &[RawSection],
) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render_document(todos, preserved))
}

/// Parses backlog text into future todos and preserved sections.
#[must_use]
pub fn parse_document(text: &str) -> BacklogDocument {
    let mut doc = BacklogDocument::default();
    let mut current_priority: Option<Priority> = None;
    let mut raw: Option<RawSection> = None;

    for line in text.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            if let Some(section) = raw.take() {
                doc.preserved.push(section);
            }
            match parse_priority_heading(heading) {
                Some(priority) => current_priority = Some(priority),
                None => {
                    current_priority = None;
                    raw = Some(RawSection {
                        heading: line.to_string(),
                        body: String::new(),
                    });
                }
            }
            continue;
        }

        if let Some(section) = raw.as_mut() {
            section.body.push_str(line);
            section.body.push('\n');
            continue;
        }

        let Some(priority) = current_priority else {
            continue;
        };

        let trimmed = line.trim();
        if !trimmed.starts_with('-') {
            continue;
        }
        match parse_item(trimmed, priority) {
            ItemLine::Todo(todo) => doc.todos.push(todo),
            ItemLine::Done => {}
            ItemLine::Malformed => {
                warn!(line = %trimmed, "skipping malformed backlog item");
            }
        }
    }

    if let Some(section) = raw.take() {
        doc.preserved.push(section);
    }

    doc
}

/// Renders the backlog: priority sections from todos, then preserved
/// sections verbatim.
#[must_use]
pub fn render_document(todos: &[Todo], preserved: &[RawSection]) -> String {
    let mut out = String::new();
    out.push_str(DOCUMENT_TITLE);
    out.push('\n');

    for priority in [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ] {
        let items: Vec<&Todo> = todos.iter().filter(|t| t.priority == priority).collect();
        if items.is_empty() {
            continue;
        }

        out.push('\n');
        out.push_str(&format!("## {} Priority\n\n", priority_label(priority)));
        for todo in items {
            out.push_str(&render_item(todo));
            out.push('\n');
        }
    }

    for section in preserved {
        out.push('\n');
        out.push_str(&section.heading);
        out.push('\n');
        out.push_str(section.body.trim_end_matches('\n'));
        out.push('\n');
    }

    out
}

/// Outcome of parsing one bullet line.
enum ItemLine {
    Todo(Todo),
    Done,
    Malformed,
}

/// Parses one `- [ ] Title (meta)` bullet.
fn parse_item(line: &str, priority: Priority) -> ItemLine {
    let rest = line.trim_start_matches('-').trim_start();

    let title = if let Some(unchecked) = rest.strip_prefix("[ ]") {
        unchecked.trim()
    } else if rest.starts_with("[x]") || rest.starts_with("[X]") {
        return ItemLine::Done;
    } else if rest.starts_with('[') {
        // some other checkbox marker the parser does not understand
        return ItemLine::Malformed;
    } else {
        rest
    };

    if title.is_empty() {
        return ItemLine::Malformed;
    }

    let (title, meta) = split_metadata(title);
    if title.is_empty() {
        return ItemLine::Malformed;
    }

    let mut todo = Todo::with_id(backlog_id(title), title, priority);
    todo.status = TodoStatus::Pending;

    for entry in meta {
        let Some((key, value)) = entry.split_once(':') else {
            warn!(entry = %entry, "skipping malformed backlog metadata");
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "category" => todo.category = Some(value.to_string()),
            "est" => todo.estimated_hours = parse_hours(value),
            "tags" => {
                todo.tags = value
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
            }
            other => debug!(key = %other, "ignoring unknown backlog metadata key"),
        }
    }

    ItemLine::Todo(todo)
}

/// Splits a trailing `(k: v | k: v)` metadata group off the title.
fn split_metadata(title: &str) -> (&str, Vec<&str>) {
    let Some(open) = title.rfind('(') else {
        return (title.trim(), Vec::new());
    };
    let Some(rest) = title[open..].strip_prefix('(') else {
        return (title.trim(), Vec::new());
    };
    let Some(inner) = rest.strip_suffix(')') else {
        // unbalanced parens: treat the whole line as the title
        return (title.trim(), Vec::new());
    };

    let meta = inner.split('|').map(str::trim).collect();
    (title[..open].trim(), meta)
}

/// Parses `3h` / `3.5h` / bare-number effort estimates.
fn parse_hours(value: &str) -> Option<f64> {
    value.trim_end_matches('h').trim().parse::<f64>().ok()
}

/// Maps `## <X> Priority` headings to a priority.
fn parse_priority_heading(heading: &str) -> Option<Priority> {
    let name = heading
        .trim()
        .to_lowercase()
        .strip_suffix(" priority")?
        .to_string();
    match name.as_str() {
        "critical" => Some(Priority::Critical),
        "high" => Some(Priority::High),
        "medium" => Some(Priority::Medium),
        "low" => Some(Priority::Low),
        _ => None,
    }
}

/// Display label of a priority for section headings.
fn priority_label(priority: Priority) -> &'static str {
    match priority {
        Priority::Critical => "Critical",
        Priority::High => "High",
        Priority::Medium => "Medium",
        Priority::Low => "Low",
    }
}

/// Renders one todo as a bullet line with its metadata.
fn render_item(todo: &Todo) -> String {
    let mut meta = Vec::new();
    if let Some(category) = &todo.category {
        meta.push(format!("category: {category}"));
    }
    if let Some(est) = todo.estimated_hours {
        meta.push(format!("est: {est}h"));
    }
    if !todo.tags.is_empty() {
        meta.push(format!("tags: {}", todo.tags.join(", ")));
    }

    if meta.is_empty() {
        format!("- [ ] {}", todo.content)
    } else {
        format!("- [ ] {} ({})", todo.content, meta.join(" | "))
    }
}

/// Deterministic id for a backlog title.
fn backlog_id(title: &str) -> String {
    let uuid = Uuid::new_v5(&BACKLOG_NAMESPACE, title.as_bytes());
    format!("todo_{}", uuid.simple())
}
