//! Shared utilities for the TaskPulse engine.

pub mod text;

pub use text::{base_name, extract_creation_target, has_completion_verb, keywords};
