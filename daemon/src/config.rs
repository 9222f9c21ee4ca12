//! Configuration for the TaskPulse daemon.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `PORT` | No | 8600 | HTTP status server port |
//! | `TASKPULSE_DETECTION_INTERVAL_SECS` | No | 120 | Detection cycle period |
//! | `TASKPULSE_SYNC_INTERVAL_SECS` | No | 600 | Sync cycle period |
//! | `TASKPULSE_WATCH` | No | `true` | Filesystem watcher toggle |
//! | `TASKPULSE_DEBOUNCE_MS` | No | 2000 | Watcher debounce quiet period |

use std::env;

use thiserror::Error;

/// Default HTTP port for the status server.
const DEFAULT_PORT: u16 = 8600;

/// Default detection cycle period in seconds.
const DEFAULT_DETECTION_INTERVAL_SECS: u64 = 120;

/// Default sync cycle period in seconds.
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 600;

/// Default watcher debounce quiet period in milliseconds.
const DEFAULT_DEBOUNCE_MS: u64 = 2_000;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Configuration for the TaskPulse daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// HTTP status server port.
    pub port: u16,

    /// Period of the short detection cycle.
    pub detection_interval_secs: u64,

    /// Period of the longer sync cycle.
    pub sync_interval_secs: u64,

    /// Whether the filesystem watcher runs.
    pub watch: bool,

    /// Watcher debounce quiet period.
    pub debounce_ms: u64,
}

impl DaemonConfig {
    /// Creates a `DaemonConfig` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` when a numeric or boolean variable fails to
    /// parse or is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("PORT") {
            Ok(val) => val.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                key: "PORT".to_string(),
                message: format!("expected port number, got '{val}'"),
            })?,
            Err(_) => DEFAULT_PORT,
        };

        let detection_interval_secs = parse_positive_secs(
            "TASKPULSE_DETECTION_INTERVAL_SECS",
            DEFAULT_DETECTION_INTERVAL_SECS,
        )?;
        let sync_interval_secs =
            parse_positive_secs("TASKPULSE_SYNC_INTERVAL_SECS", DEFAULT_SYNC_INTERVAL_SECS)?;
        let debounce_ms = parse_positive_secs("TASKPULSE_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS)?;

        let watch = match env::var("TASKPULSE_WATCH") {
            Ok(val) => match val.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(ConfigError::InvalidValue {
                        key: "TASKPULSE_WATCH".to_string(),
                        message: format!("expected true/false, got '{other}'"),
                    })
                }
            },
            Err(_) => true,
        };

        Ok(Self {
            port,
            detection_interval_secs,
            sync_interval_secs,
            watch,
            debounce_ms,
        })
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            detection_interval_secs: DEFAULT_DETECTION_INTERVAL_SECS,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            watch: true,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

/// Parses a positive integer environment variable.
fn parse_positive_secs(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(val) => {
            let parsed = val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected positive integer, got '{val}'"),
            })?;
            if parsed == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "value must be greater than 0".to_string(),
                });
            }
            Ok(parsed)
        }
        Err(_) => Ok(default),
    }
}
