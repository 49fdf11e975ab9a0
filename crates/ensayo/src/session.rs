//! Browser session abstraction.
//!
//! The engine only talks to a browser through [`BrowserSession`]; sessions
//! are created by a [`SessionAllocator`]. Elements are always addressed by
//! CSS selector so implementations are free to re-resolve them per call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::result::EnsayoResult;

/// Interval between visibility and text polls
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Severity of a console message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    /// `console.log`
    Log,
    /// `console.debug`
    Debug,
    /// `console.info`
    Info,
    /// `console.warn`
    Warning,
    /// `console.error` and uncaught exceptions
    Error,
}

impl ConsoleLevel {
    /// Lowercase level name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConsoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A console message emitted by the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleEvent {
    /// Severity
    pub level: ConsoleLevel,
    /// Message text
    pub message: String,
    /// When the browser reported it
    pub timestamp: DateTime<Utc>,
}

impl ConsoleEvent {
    /// Create an event stamped now
    #[must_use]
    pub fn new(level: ConsoleLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create an error-level event stamped now
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ConsoleLevel::Error, message)
    }
}

/// Stream of console events for one session
pub type ConsoleStream = BoxStream<'static, ConsoleEvent>;

/// One isolated browser tab/context.
///
/// Every method is a single protocol round trip; callers bound them with
/// their own timeouts.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate to a URL
    async fn navigate(&self, url: &str) -> EnsayoResult<()>;

    /// Click the first element matching `selector`
    async fn click(&self, selector: &str) -> EnsayoResult<()>;

    /// Type text into the element matching `selector`
    async fn type_text(&self, selector: &str, text: &str) -> EnsayoResult<()>;

    /// Move the pointer over the element matching `selector`
    async fn hover(&self, selector: &str) -> EnsayoResult<()>;

    /// Set the `value` of a form control
    async fn set_value(&self, selector: &str, value: &str) -> EnsayoResult<()>;

    /// Whether the element exists and is rendered
    async fn is_visible(&self, selector: &str) -> EnsayoResult<bool>;

    /// Whether the element exists in the DOM
    async fn element_exists(&self, selector: &str) -> EnsayoResult<bool>;

    /// Text content of the element
    async fn text(&self, selector: &str) -> EnsayoResult<String>;

    /// Text content of `<body>`, or `None` while the body is not ready
    async fn body_text(&self) -> EnsayoResult<Option<String>>;

    /// Attribute value, `None` when the attribute is absent
    async fn attribute(&self, selector: &str, name: &str) -> EnsayoResult<Option<String>>;

    /// Current URL
    async fn current_url(&self) -> EnsayoResult<String>;

    /// Document title
    async fn title(&self) -> EnsayoResult<String>;

    /// PNG screenshot of the viewport
    async fn screenshot(&self) -> EnsayoResult<Vec<u8>>;

    /// Serialized DOM
    async fn html(&self) -> EnsayoResult<String>;

    /// Subscribe to console messages
    async fn console_events(&self) -> EnsayoResult<ConsoleStream>;

    /// Release the session
    async fn close(&self) -> EnsayoResult<()>;

    /// Poll until the element is visible.
    ///
    /// Never returns on its own while the element stays hidden; callers
    /// wrap it in a timeout. Lookup errors are treated as "not yet".
    async fn wait_visible(&self, selector: &str) -> EnsayoResult<()> {
        loop {
            if matches!(self.is_visible(selector).await, Ok(true)) {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Creates isolated sessions on demand
#[async_trait]
pub trait SessionAllocator: Send + Sync {
    /// Acquire the underlying browser; idempotent
    async fn start(&self) -> EnsayoResult<()>;

    /// Open a fresh session; fails unless started
    async fn open(&self) -> EnsayoResult<Arc<dyn BrowserSession>>;

    /// Release the underlying browser; idempotent
    async fn stop(&self) -> EnsayoResult<()>;

    /// Whether [`SessionAllocator::start`] has succeeded and not been stopped
    fn is_started(&self) -> bool;
}
