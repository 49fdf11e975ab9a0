//! Per-test console error capture.

use chrono::{DateTime, Utc};
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::EngineConfig;
use crate::result::EnsayoResult;
use crate::session::{BrowserSession, ConsoleEvent, ConsoleLevel, ConsoleStream};

/// An error-level console message captured during a test
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleError {
    /// Message text
    pub message: String,
    /// Message kind (always `error` for captured messages)
    pub kind: String,
    /// When the browser reported it
    pub timestamp: DateTime<Utc>,
    /// Page URL at capture time
    pub url: String,
}

impl ConsoleError {
    /// Create an error captured now
    #[must_use]
    pub fn new(message: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ConsoleLevel::Error.as_str().to_string(),
            timestamp: Utc::now(),
            url: url.into(),
        }
    }
}

/// Accumulates console errors for one test on a background task.
///
/// The task owns the error list; [`ConsoleCollector::finish`] stops it,
/// drains events that are already buffered, and hands the list back.
#[derive(Debug)]
pub struct ConsoleCollector {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<Vec<ConsoleError>>,
}

impl ConsoleCollector {
    /// Subscribe to the session's console and start collecting.
    ///
    /// URL lookups for captured errors stop at `deadline`; later errors are
    /// recorded with an empty URL.
    pub async fn attach(
        session: Arc<dyn BrowserSession>,
        config: Arc<EngineConfig>,
        deadline: Instant,
    ) -> EnsayoResult<Self> {
        let stream = session.console_events().await?;
        let (stop_tx, stop_rx) = oneshot::channel();
        let source = Source {
            session,
            config,
            deadline,
        };
        let task = tokio::spawn(collect(stream, stop_rx, source));
        Ok(Self {
            stop: Some(stop_tx),
            task,
        })
    }

    /// Stop collecting and return everything kept so far
    pub async fn finish(mut self) -> Vec<ConsoleError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match (&mut self.task).await {
            Ok(errors) => errors,
            Err(e) => {
                tracing::warn!(error = %e, "console collector task failed");
                Vec::new()
            }
        }
    }
}

impl Drop for ConsoleCollector {
    fn drop(&mut self) {
        if self.stop.is_some() {
            self.task.abort();
        }
    }
}

struct Source {
    session: Arc<dyn BrowserSession>,
    config: Arc<EngineConfig>,
    deadline: Instant,
}

async fn collect(
    mut stream: ConsoleStream,
    mut stop: oneshot::Receiver<()>,
    source: Source,
) -> Vec<ConsoleError> {
    let mut errors = Vec::new();

    loop {
        tokio::select! {
            biased;
            event = stream.next() => match event {
                Some(event) => record(&mut errors, event, &source).await,
                None => break,
            },
            _ = &mut stop => {
                while let Some(Some(event)) = stream.next().now_or_never() {
                    record(&mut errors, event, &source).await;
                }
                break;
            }
        }
    }

    errors
}

async fn record(errors: &mut Vec<ConsoleError>, event: ConsoleEvent, source: &Source) {
    if event.level != ConsoleLevel::Error {
        return;
    }
    let url = tokio::time::timeout_at(source.deadline, source.session.current_url())
        .await
        .ok()
        .and_then(Result::ok)
        .unwrap_or_default();
    let error = ConsoleError {
        message: event.message,
        kind: event.level.as_str().to_string(),
        timestamp: event.timestamp,
        url,
    };
    if source.config.suppresses(&error) {
        tracing::debug!(message = %error.message, "console error suppressed");
        return;
    }
    tracing::warn!(message = %error.message, url = %error.url, "console error");
    errors.push(error);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mock::MockSession;
    use std::time::Duration;

    fn in_a_minute() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[tokio::test]
    async fn test_collects_only_errors() {
        let session = Arc::new(MockSession::new().with_url("https://example.com/"));
        let collector = ConsoleCollector::attach(session.clone(), Arc::new(EngineConfig::default()), in_a_minute())
            .await
            .unwrap();

        session.emit_console(ConsoleEvent::new(ConsoleLevel::Log, "hello"));
        session.emit_console(ConsoleEvent::error("boom"));
        session.emit_console(ConsoleEvent::new(ConsoleLevel::Warning, "careful"));

        let errors = collector.finish().await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "boom");
        assert_eq!(errors[0].kind, "error");
        assert_eq!(errors[0].url, "https://example.com/");
    }

    #[tokio::test]
    async fn test_filter_suppresses() {
        let config = EngineConfig::default().with_error_filter(|e| e.message.contains("favicon"));
        let session = Arc::new(MockSession::new());
        let collector = ConsoleCollector::attach(session.clone(), Arc::new(config), in_a_minute())
            .await
            .unwrap();

        session.emit_console(ConsoleEvent::error("GET /favicon.ico 404"));
        session.emit_console(ConsoleEvent::error("TypeError: x is undefined"));

        let errors = collector.finish().await;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("TypeError"));
    }

    #[tokio::test]
    async fn test_finish_without_events() {
        let session = Arc::new(MockSession::new());
        let collector = ConsoleCollector::attach(session, Arc::new(EngineConfig::default()), in_a_minute())
            .await
            .unwrap();
        assert!(collector.finish().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_url_lookup_stops_at_deadline() {
        let session = Arc::new(
            MockSession::new()
                .with_url("https://example.com/")
                .with_latency(Duration::from_secs(3600)),
        );
        let deadline = Instant::now() + Duration::from_secs(1);
        let collector =
            ConsoleCollector::attach(session.clone(), Arc::new(EngineConfig::default()), deadline)
                .await
                .unwrap();

        let started = Instant::now();
        session.emit_console(ConsoleEvent::error("boom"));
        let errors = collector.finish().await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "boom");
        assert!(errors[0].url.is_empty());
    }
}
