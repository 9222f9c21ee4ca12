//! Text helpers for the completion heuristics.
//!
//! This module provides the tokenization used by the keyword-overlap
//! heuristic (stop-word filtered, short tokens dropped), the
//! completion-verb test applied to commit messages, and the
//! creation-target extraction used both for pattern generation and the
//! creation-target detection heuristic.
//!
//! # Example
//!
//! ```
//! use taskpulse_engine::utils::text::{extract_creation_target, keywords};
//!
//! let tokens = keywords("Create the PricingCalculator component");
//! assert_eq!(tokens, vec!["create", "pricingcalculator", "component"]);
//!
//! let target = extract_creation_target("create PricingCalculator component");
//! assert_eq!(target.as_deref(), Some("PricingCalculator"));
//! ```

use std::sync::OnceLock;

use regex::Regex;

/// Minimum token length kept by [`keywords`].
const MIN_TOKEN_LEN: usize = 3;

/// Stop words dropped from keyword sets. Sorted for binary search.
const STOP_WORDS: &[&str] = &[
    "about", "after", "all", "and", "are", "been", "before", "but", "can",
    "could", "did", "does", "for", "from", "had", "has", "have", "her",
    "his", "into", "its", "new", "not", "our", "out", "should", "some",
    "that", "the", "their", "them", "then", "they", "this", "use", "was",
    "were", "will", "with", "would", "you", "your",
];

/// Verbs that signal completed work in a commit message.
const COMPLETION_VERBS: &[&str] = &[
    "add", "added", "adds", "build", "built", "complete", "completed",
    "completes", "create", "created", "creates", "done", "finish",
    "finished", "finishes", "fix", "fixed", "fixes", "implement",
    "implemented", "implements",
];

/// Creation-verb + noun-phrase pattern. Captures the first meaningful
/// token after the verb, skipping articles and the filler word "new".
fn creation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:create|add|build|implement|write|make)\s+(?:(?:a|an|the|new)\s+)*([A-Za-z][A-Za-z0-9_./-]*)",
        )
        .expect("creation-target regex is valid")
    })
}

/// Tokenizes free text into lowercase keywords.
///
/// Splits on non-alphanumeric characters, drops tokens shorter than three
/// characters, and filters stop words. Order of first occurrence is
/// preserved; duplicates are removed.
#[must_use]
pub fn keywords(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        if raw.len() < MIN_TOKEN_LEN {
            continue;
        }
        let token = raw.to_lowercase();
        if STOP_WORDS.binary_search(&token.as_str()).is_ok() {
            continue;
        }
        if !seen.contains(&token) {
            seen.push(token);
        }
    }
    seen
}

/// Whether a commit message contains a completion verb.
#[must_use]
pub fn has_completion_verb(message: &str) -> bool {
    message
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| {
            let word = word.to_lowercase();
            COMPLETION_VERBS.contains(&word.as_str())
        })
}

/// Extracts the target phrase from creation-shaped content.
///
/// Returns the first meaningful token following a creation verb, e.g.
/// `"create PricingCalculator component"` yields `"PricingCalculator"`.
/// Returns `None` when the content has no creation shape.
#[must_use]
pub fn extract_creation_target(content: &str) -> Option<String> {
    creation_re()
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// The base name of a slash-separated path.
#[must_use]
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// The base name with any file extension removed.
#[must_use]
pub fn file_stem(path: &str) -> &str {
    let base = base_name(path);
    base.rsplit_once('.').map_or(base, |(stem, _)| stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_filters_stop_words_and_short_tokens() {
        let tokens = keywords("Add the new API for user auth");
        assert_eq!(tokens, vec!["add", "api", "user", "auth"]);
    }

    #[test]
    fn keywords_lowercases_and_dedupes() {
        let tokens = keywords("Parser parser PARSER");
        assert_eq!(tokens, vec!["parser"]);
    }

    #[test]
    fn keywords_splits_on_punctuation() {
        let tokens = keywords("fix: src/parser.rs panics");
        assert_eq!(tokens, vec!["fix", "src", "parser", "panics"]);
    }

    #[test]
    fn empty_content_has_no_keywords() {
        assert!(keywords("").is_empty());
        assert!(keywords("a an of to").is_empty());
    }

    #[test]
    fn completion_verbs_detected() {
        assert!(has_completion_verb("Implemented retry logic"));
        assert!(has_completion_verb("fix flaky watcher test"));
        assert!(has_completion_verb("docs: mark migration done"));
        assert!(!has_completion_verb("refactor config parsing"));
    }

    #[test]
    fn completion_verb_requires_whole_word() {
        // "additional" must not match "add"
        assert!(!has_completion_verb("additional context for review"));
    }

    #[test]
    fn creation_target_extracted() {
        assert_eq!(
            extract_creation_target("create PricingCalculator component").as_deref(),
            Some("PricingCalculator")
        );
        assert_eq!(
            extract_creation_target("Add a new LoginForm to the app").as_deref(),
            Some("LoginForm")
        );
        assert_eq!(
            extract_creation_target("implement rate_limiter").as_deref(),
            Some("rate_limiter")
        );
    }

    #[test]
    fn creation_target_skips_articles() {
        assert_eq!(
            extract_creation_target("build the new deploy pipeline").as_deref(),
            Some("deploy")
        );
    }

    #[test]
    fn non_creation_content_has_no_target() {
        assert!(extract_creation_target("investigate flaky test").is_none());
        assert!(extract_creation_target("").is_none());
    }

    #[test]
    fn base_name_and_stem() {
        assert_eq!(base_name("src/components/PricingCalculator.tsx"), "PricingCalculator.tsx");
        assert_eq!(file_stem("src/components/PricingCalculator.tsx"), "PricingCalculator");
        assert_eq!(base_name("README"), "README");
        assert_eq!(file_stem("README"), "README");
    }

    #[test]
    fn stop_words_are_sorted() {
        let mut sorted = STOP_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOP_WORDS, "binary search requires sorted stop words");
    }
}
