//! Error types for the CLI

use std::path::PathBuf;
use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Test execution error
    #[error("Test execution failed: {message}")]
    TestExecution {
        /// Error message
        message: String,
    },

    /// Script could not be parsed
    #[error("{}: {source}", path.display())]
    Script {
        /// Script file
        path: PathBuf,
        /// Parse error
        source: ensayo::EngineError,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Ensayo library error
    #[error("Ensayo error: {0}")]
    Engine(#[from] ensayo::EngineError),

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// Built without a browser backend
    #[error("browser backend unavailable: rebuild with --features browser")]
    BrowserUnavailable,

    /// Ctrl-C during a run
    #[error("interrupted")]
    Interrupted,
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a test execution error
    #[must_use]
    pub fn test_execution(message: impl Into<String>) -> Self {
        Self::TestExecution {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Attach a script path to a parse error
    #[must_use]
    pub fn script(path: impl Into<PathBuf>, source: ensayo::EngineError) -> Self {
        Self::Script {
            path: path.into(),
            source,
        }
    }
}
