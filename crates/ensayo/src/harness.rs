//! Test results and suite aggregation.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::console::ConsoleError;
use crate::result::EngineError;

/// Result of running a single test
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    /// Test name
    pub name: String,
    /// Whether the test passed
    pub passed: bool,
    /// Primary error if failed
    pub error: Option<EngineError>,
    /// Wall-clock time of the step loop
    pub duration: Duration,
    /// Unsuppressed console errors, in capture order
    pub console_errors: Vec<ConsoleError>,
}

impl TestResult {
    /// Create a passing test result
    #[must_use]
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            error: None,
            duration: Duration::ZERO,
            console_errors: Vec::new(),
        }
    }

    /// Create a failing test result
    #[must_use]
    pub fn fail(name: impl Into<String>, error: EngineError) -> Self {
        Self {
            name: name.into(),
            passed: false,
            error: Some(error),
            duration: Duration::ZERO,
            console_errors: Vec::new(),
        }
    }

    /// Combine a step-loop outcome with captured console errors.
    ///
    /// A step error is always the primary error. Without one, console errors
    /// fail the test only under fail-on-console-error.
    #[must_use]
    pub fn from_run(
        name: impl Into<String>,
        outcome: Result<(), EngineError>,
        console_errors: Vec<ConsoleError>,
        fail_on_console_error: bool,
        duration: Duration,
    ) -> Self {
        let error = match outcome {
            Err(e) => Some(e),
            Ok(()) if fail_on_console_error && !console_errors.is_empty() => {
                Some(EngineError::ConsoleErrors {
                    count: console_errors.len(),
                })
            }
            Ok(()) => None,
        };
        Self {
            name: name.into(),
            passed: error.is_none(),
            error,
            duration,
            console_errors,
        }
    }

    /// Set duration
    #[must_use]
    pub const fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Serializable view of this result
    #[must_use]
    pub fn report(&self) -> TestReport {
        TestReport {
            name: self.name.clone(),
            passed: self.passed,
            error: self.error.as_ref().map(ToString::to_string),
            duration_ms: millis(self.duration),
            artifacts: self
                .error
                .as_ref()
                .map(|e| e.artifacts().to_vec())
                .unwrap_or_default(),
            console_errors: self.console_errors.clone(),
        }
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_micros() as f64 / 1000.0
}

/// JSON shape of a [`TestResult`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    /// Test name
    pub name: String,
    /// Whether the test passed
    pub passed: bool,
    /// Primary error message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Duration in milliseconds
    pub duration_ms: f64,
    /// Debugging artifacts written for a visual diff
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PathBuf>,
    /// Captured console errors
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub console_errors: Vec<ConsoleError>,
}

/// Results from running a set of tests
#[derive(Debug, Clone, Default)]
pub struct SuiteResults {
    /// Individual test results, in completion order
    pub results: Vec<TestResult>,
    /// Total wall-clock duration
    pub duration: Duration,
}

impl SuiteResults {
    /// Wrap results
    #[must_use]
    pub const fn new(results: Vec<TestResult>, duration: Duration) -> Self {
        Self { results, duration }
    }

    /// Check if all tests passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    /// Count passed tests
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    /// Count failed tests
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }

    /// Get total test count
    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Get failed tests
    #[must_use]
    pub fn failures(&self) -> Vec<&TestResult> {
        self.results.iter().filter(|r| !r.passed).collect()
    }

    /// Serializable summary
    #[must_use]
    pub fn report(&self) -> SuiteReport {
        SuiteReport {
            total: self.total(),
            passed: self.passed_count(),
            failed: self.failed_count(),
            duration_ms: millis(self.duration),
            results: self.results.iter().map(TestResult::report).collect(),
        }
    }
}

/// JSON shape of [`SuiteResults`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteReport {
    /// Number of tests
    pub total: usize,
    /// Number passed
    pub passed: usize,
    /// Number failed
    pub failed: usize,
    /// Total duration in milliseconds
    pub duration_ms: f64,
    /// Per-test reports
    pub results: Vec<TestReport>,
}
