//! Ensayo: DSL-driven end-to-end browser test runner
//!
//! Ensayo (Spanish: "rehearsal") runs scripted browser tests concurrently,
//! compares screenshots and HTML against stored baselines, and fails tests
//! on unexpected console errors.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    ENSAYO Architecture                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ .test      │    │ Runner     │    │ Browser    │            │
//! │   │ script     │───►│ (worker    │───►│ session    │            │
//! │   │ (dsl)      │    │  pool)     │    │ (chromium) │            │
//! │   └────────────┘    └─────┬──────┘    └─────┬──────┘            │
//! │                           │                 │                   │
//! │              ┌────────────┴──┐        ┌─────┴───────┐           │
//! │              │ StepExecutor  │        │ Console     │           │
//! │              │ + baselines   │        │ collector   │           │
//! │              └───────────────┘        └─────────────┘           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The browser itself sits behind [`SessionAllocator`] and
//! [`BrowserSession`]. The `browser` feature provides a Chromium backend;
//! [`mock`] provides a scripted in-memory one.

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod baseline;
#[cfg(feature = "browser")]
mod browser;
mod config;
mod console;
pub mod dsl;
mod executor;
mod harness;
pub mod mock;
mod result;
mod runner;
mod session;
#[allow(clippy::doc_markdown)]
mod snapshot;
mod step;
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
mod visual_regression;

pub use baseline::{
    artifact_path, baseline_path, sanitize_test_name, ArtifactKind, ArtifactNamer, BaselineOutcome,
};
#[cfg(feature = "browser")]
pub use browser::{ChromiumAllocator, ChromiumSession};
pub use config::{
    find_config_file, parse_duration, ConfigDuration, ConsoleFilter, EngineConfig, FileConfig,
    CONFIG_FILE_NAMES, DEFAULT_SCREENSHOT_DIR, DEFAULT_SNAPSHOT_DIR, DEFAULT_TIMEOUT_SECS,
    DEFAULT_WORKERS,
};
pub use console::{ConsoleCollector, ConsoleError};
pub use executor::{StepContext, StepExecutor, ABSENT, TEXT_NOT_FOUND};
pub use harness::{SuiteReport, SuiteResults, TestReport, TestResult};
pub use result::{EngineError, EnsayoResult};
pub use runner::{Runner, BLANK_PAGE};
pub use session::{
    BrowserSession, ConsoleEvent, ConsoleLevel, ConsoleStream, SessionAllocator, POLL_INTERVAL,
};
pub use snapshot::{escape_html, normalize_html, render_html_diff, snapshots_match, HtmlSnapshots};
pub use step::{ActionKind, Step, TestBuilder, TestCase, ATTRIBUTE_SEPARATOR};
pub use visual_regression::{compare_images, ComparisonStrategy, ImageDiff, ScreenshotBaselines};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        ActionKind, BrowserSession, EngineConfig, EngineError, EnsayoResult, SessionAllocator,
        Step, SuiteResults, TestBuilder, TestCase, TestResult, Runner,
    };
}
