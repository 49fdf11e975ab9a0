//! Result and error types for Ensayo.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for Ensayo operations
pub type EnsayoResult<T> = Result<T, EngineError>;

/// Errors produced while executing tests.
///
/// Step-level errors are attached verbatim to the failing test's result; the
/// engine never promotes them to a process-level failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Browser-level failure: navigation, element lookup, or an action that
    /// exceeded its own timeout
    #[error("{action} failed: {message}")]
    Protocol {
        /// Action that was being performed
        action: String,
        /// Error message
        message: String,
    },

    /// An `assert_*` step observed a value other than the expected one
    #[error("{message}: expected '{expected}', got '{actual}'")]
    Assertion {
        /// Expected value
        expected: String,
        /// Observed value
        actual: String,
        /// What was being asserted
        message: String,
    },

    /// Malformed step or configuration (unknown action, bad attribute target)
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Test-level deadline exceeded inside a polling step
    #[error("Timed out {message}")]
    Timeout {
        /// What was being waited for
        message: String,
    },

    /// Screenshot or HTML snapshot diverged from its baseline
    #[error("{message}")]
    VisualDiff {
        /// Human-readable failure, including the remediation
        message: String,
        /// Fraction of differing pixels (screenshots only)
        difference: Option<f64>,
        /// Baseline that was compared against
        baseline: PathBuf,
        /// Artifacts written beside the baseline
        artifacts: Vec<PathBuf>,
    },

    /// Images could not be decoded or encoded
    #[error("Image comparison failed: {message}")]
    ImageComparison {
        /// Error message
        message: String,
    },

    /// Engine was asked to run before the session allocator was started
    #[error("Engine not ready: {message}")]
    EnginePrecondition {
        /// Error message
        message: String,
    },

    /// Console errors were captured under fail-on-console-error policy
    #[error("console errors detected: {count} errors")]
    ConsoleErrors {
        /// Number of unsuppressed console errors
        count: usize,
    },

    /// The test task panicked or was cancelled
    #[error("Test aborted: {message}")]
    Aborted {
        /// Error message
        message: String,
    },

    /// DSL script could not be parsed
    #[error("line {line}: {message}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {message}")]
    Io {
        /// Error message
        message: String,
    },
}

impl EngineError {
    /// Create a protocol error for an action
    #[must_use]
    pub fn protocol(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Create an assertion error
    #[must_use]
    pub fn assertion(
        message: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Assertion {
            expected: expected.into(),
            actual: actual.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a polling timeout error
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create an engine precondition error
    #[must_use]
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::EnginePrecondition {
            message: message.into(),
        }
    }

    /// Create an image comparison error
    #[must_use]
    pub fn image(message: impl Into<String>) -> Self {
        Self::ImageComparison {
            message: message.into(),
        }
    }

    /// Create a parse error
    #[must_use]
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    /// Whether this error came from an `assert_*` step
    #[must_use]
    pub const fn is_assertion(&self) -> bool {
        matches!(self, Self::Assertion { .. })
    }

    /// Artifact paths worth pointing a human at, if any
    #[must_use]
    pub fn artifacts(&self) -> &[PathBuf] {
        match self {
            Self::VisualDiff { artifacts, .. } => artifacts,
            _ => &[],
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<image::ImageError> for EngineError {
    fn from(err: image::ImageError) -> Self {
        Self::image(err.to_string())
    }
}
