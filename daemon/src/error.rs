//! Error types for the TaskPulse daemon.

use thiserror::Error;

use taskpulse_engine::EngineError;

use crate::config::ConfigError;
use crate::watch::WatchError;

/// Errors that can occur during daemon operations.
///
/// The scheduler catches and counts cycle errors internally; this type
/// surfaces only startup and shutdown failures to the binary.
#[derive(Error, Debug)]
pub enum DaemonError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Engine operation failed.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Filesystem watcher setup failed.
    #[error("watch error: {0}")]
    Watch(#[from] WatchError),

    /// Binding or serving the status endpoint failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for daemon operations.
pub type Result<T> = std::result::Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = DaemonError::Config(ConfigError::InvalidValue {
            key: "PORT".to_string(),
            message: "expected port number".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "configuration error: invalid value for PORT: expected port number"
        );
    }

    #[test]
    fn watch_error_conversion() {
        let err: DaemonError =
            WatchError::DirectoryNotFound(std::path::PathBuf::from("/x")).into();
        assert!(matches!(err, DaemonError::Watch(_)));
    }
}
