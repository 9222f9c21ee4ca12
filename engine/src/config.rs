//! Configuration for the TaskPulse engine.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `TASKPULSE_REPO_DIR` | No | current directory | Repository to inspect |
//! | `TASKPULSE_DATA_DIR` | No | `~/.taskpulse` | Directory for the store file |
//! | `TASKPULSE_BACKLOG_PATH` | No | `<repo>/BACKLOG.md` | Future-backlog document |
//! | `TASKPULSE_BACKUPS` | No | `false` | Timestamped store backups per save |
//! | `TASKPULSE_GIT_TIMEOUT_SECS` | No | 5 | Per-query git subprocess timeout |
//! | `TASKPULSE_DEFAULT_CATEGORY` | No | `general` | Category assigned on graduation |
//! | `TASKPULSE_DETECT_ON_INIT` | No | `false` | Run one detection pass at startup |
//!
//! # Example
//!
//! ```no_run
//! use taskpulse_engine::config::EngineConfig;
//!
//! let config = EngineConfig::from_env().expect("failed to load configuration");
//! println!("store file: {}", config.store_path().display());
//! ```

use std::env;
use std::path::PathBuf;

use directories::BaseDirs;
use thiserror::Error;

/// Default data directory name relative to home.
const DEFAULT_DATA_DIR: &str = ".taskpulse";

/// File name of the persisted store inside the data directory.
const STORE_FILE_NAME: &str = "todos.json";

/// Default backlog document name relative to the repository root.
const DEFAULT_BACKLOG_NAME: &str = "BACKLOG.md";

/// Default per-query git subprocess timeout in seconds.
const DEFAULT_GIT_TIMEOUT_SECS: u64 = 5;

/// Default category assigned when a session todo graduates without one.
const DEFAULT_CATEGORY: &str = "general";

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Configuration for the TaskPulse engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Repository whose history and working tree are inspected.
    pub repo_dir: PathBuf,

    /// Directory holding the persisted store (and its backups).
    pub data_dir: PathBuf,

    /// Path of the external future-backlog document.
    pub backlog_path: PathBuf,

    /// Whether to write a timestamped backup before each store save.
    pub backups: bool,

    /// Bounded timeout for each git subprocess query.
    pub git_timeout_secs: u64,

    /// Category assigned to session todos graduating without one.
    pub default_category: String,

    /// Whether `initialize()` runs one detection pass after loading.
    pub detect_on_init: bool,
}

impl EngineConfig {
    /// Creates an `EngineConfig` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the home directory cannot be determined
    /// (needed for the default data dir) or a numeric/boolean variable
    /// fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
        let home_dir = base_dirs.home_dir();

        let repo_dir = env::var("TASKPULSE_REPO_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let data_dir = env::var("TASKPULSE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home_dir.join(DEFAULT_DATA_DIR));

        let backlog_path = env::var("TASKPULSE_BACKLOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| repo_dir.join(DEFAULT_BACKLOG_NAME));

        let backups = parse_bool("TASKPULSE_BACKUPS", false)?;
        let detect_on_init = parse_bool("TASKPULSE_DETECT_ON_INIT", false)?;

        let git_timeout_secs = match env::var("TASKPULSE_GIT_TIMEOUT_SECS") {
            Ok(val) => {
                let secs = val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                    key: "TASKPULSE_GIT_TIMEOUT_SECS".to_string(),
                    message: format!("expected positive integer, got '{val}'"),
                })?;
                if secs == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "TASKPULSE_GIT_TIMEOUT_SECS".to_string(),
                        message: "timeout must be at least 1 second".to_string(),
                    });
                }
                secs
            }
            Err(_) => DEFAULT_GIT_TIMEOUT_SECS,
        };

        let default_category = env::var("TASKPULSE_DEFAULT_CATEGORY")
            .unwrap_or_else(|_| DEFAULT_CATEGORY.to_string());

        Ok(Self {
            repo_dir,
            data_dir,
            backlog_path,
            backups,
            git_timeout_secs,
            default_category,
            detect_on_init,
        })
    }

    /// Path of the persisted store file inside the data directory.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE_NAME)
    }
}

impl Default for EngineConfig {
    /// Test- and embedding-friendly defaults rooted in the current
    /// directory. Production callers should prefer [`EngineConfig::from_env`].
    fn default() -> Self {
        Self {
            repo_dir: PathBuf::from("."),
            data_dir: PathBuf::from(".taskpulse"),
            backlog_path: PathBuf::from("BACKLOG.md"),
            backups: false,
            git_timeout_secs: DEFAULT_GIT_TIMEOUT_SECS,
            default_category: DEFAULT_CATEGORY.to_string(),
            detect_on_init: false,
        }
    }
}

/// Parses an optional boolean environment variable.
fn parse_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(val) => match val.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected true/false, got '{other}'"),
            }),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    /// Clears every TASKPULSE_* variable touched by these tests.
    fn clear_env() {
        for key in [
            "TASKPULSE_REPO_DIR",
            "TASKPULSE_DATA_DIR",
            "TASKPULSE_BACKLOG_PATH",
            "TASKPULSE_BACKUPS",
            "TASKPULSE_GIT_TIMEOUT_SECS",
            "TASKPULSE_DEFAULT_CATEGORY",
            "TASKPULSE_DETECT_ON_INIT",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn defaults_when_env_is_empty() {
        clear_env();

        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.repo_dir, PathBuf::from("."));
        assert!(config.data_dir.ends_with(DEFAULT_DATA_DIR));
        assert!(config.backlog_path.ends_with(DEFAULT_BACKLOG_NAME));
        assert!(!config.backups);
        assert_eq!(config.git_timeout_secs, DEFAULT_GIT_TIMEOUT_SECS);
        assert_eq!(config.default_category, DEFAULT_CATEGORY);
        assert!(!config.detect_on_init);
    }

    #[test]
    #[serial]
    fn explicit_paths_are_honored() {
        clear_env();
        env::set_var("TASKPULSE_REPO_DIR", "/work/repo");
        env::set_var("TASKPULSE_DATA_DIR", "/var/lib/taskpulse");
        env::set_var("TASKPULSE_BACKLOG_PATH", "/work/repo/docs/FUTURE.md");

        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.repo_dir, PathBuf::from("/work/repo"));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/taskpulse"));
        assert_eq!(
            config.backlog_path,
            PathBuf::from("/work/repo/docs/FUTURE.md")
        );
        assert_eq!(
            config.store_path(),
            PathBuf::from("/var/lib/taskpulse/todos.json")
        );

        clear_env();
    }

    #[test]
    #[serial]
    fn backlog_defaults_next_to_repo() {
        clear_env();
        env::set_var("TASKPULSE_REPO_DIR", "/work/repo");

        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.backlog_path, PathBuf::from("/work/repo/BACKLOG.md"));

        clear_env();
    }

    #[test]
    #[serial]
    fn invalid_timeout_is_rejected() {
        clear_env();
        env::set_var("TASKPULSE_GIT_TIMEOUT_SECS", "soon");

        let err = EngineConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        env::set_var("TASKPULSE_GIT_TIMEOUT_SECS", "0");
        let err = EngineConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        clear_env();
    }

    #[test]
    #[serial]
    fn boolean_values_parse() {
        clear_env();
        env::set_var("TASKPULSE_BACKUPS", "true");
        env::set_var("TASKPULSE_DETECT_ON_INIT", "1");

        let config = EngineConfig::from_env().unwrap();
        assert!(config.backups);
        assert!(config.detect_on_init);

        env::set_var("TASKPULSE_BACKUPS", "maybe");
        assert!(EngineConfig::from_env().is_err());

        clear_env();
    }

    #[test]
    fn invalid_value_display() {
        let err = ConfigError::InvalidValue {
            key: "TASKPULSE_GIT_TIMEOUT_SECS".to_string(),
            message: "expected positive integer".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for TASKPULSE_GIT_TIMEOUT_SECS: expected positive integer"
        );
    }
}
