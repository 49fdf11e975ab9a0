//! Step dispatch: maps one [`Step`] onto session calls.
//!
//! Every action is bounded by its own timeout (the per-kind override or the
//! global timeout) clipped to whatever is left of the test deadline. The two
//! polling steps, `wait_for_text` and `wait_for_url`, run until the test
//! deadline instead.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::baseline::{ArtifactKind, ArtifactNamer, BaselineOutcome};
use crate::config::EngineConfig;
use crate::result::{EngineError, EnsayoResult};
use crate::session::{BrowserSession, POLL_INTERVAL};
use crate::snapshot::HtmlSnapshots;
use crate::step::{ActionKind, Step};
use crate::visual_regression::ScreenshotBaselines;

/// Observed value reported when an attribute is missing
pub const ABSENT: &str = "<absent>";

/// Observed value reported when body text lacks the expected text
pub const TEXT_NOT_FOUND: &str = "[text not found in page]";

/// Per-test execution context
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Name of the running test
    pub test_name: String,
    /// Test-level deadline, fixed when the session is created
    pub deadline: Instant,
}

impl StepContext {
    /// Context whose deadline is `timeout` from now
    #[must_use]
    pub fn new(test_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            test_name: test_name.into(),
            deadline: Instant::now() + timeout,
        }
    }

    /// Time left before the deadline
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Executes steps against a session
#[derive(Debug, Clone)]
pub struct StepExecutor {
    config: Arc<EngineConfig>,
    namer: Arc<ArtifactNamer>,
    screenshots: ScreenshotBaselines,
    snapshots: HtmlSnapshots,
}

impl StepExecutor {
    /// Create an executor sharing the engine's config and artifact namer
    #[must_use]
    pub fn new(config: Arc<EngineConfig>, namer: Arc<ArtifactNamer>) -> Self {
        let screenshots = ScreenshotBaselines::from_config(&config);
        let snapshots = HtmlSnapshots::from_config(&config);
        Self {
            config,
            namer,
            screenshots,
            snapshots,
        }
    }

    /// Time allowed for one action of `kind`
    #[must_use]
    pub fn budget(&self, kind: ActionKind, ctx: &StepContext) -> Duration {
        self.config.action_timeout(kind).min(ctx.remaining())
    }

    async fn bounded<T, F>(&self, kind: ActionKind, ctx: &StepContext, fut: F) -> EnsayoResult<T>
    where
        F: Future<Output = EnsayoResult<T>>,
    {
        let budget = self.budget(kind, ctx);
        match tokio::time::timeout(budget, fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::protocol(
                kind.as_str(),
                format!("timed out after {}ms", budget.as_millis()),
            )),
        }
    }

    /// Execute one step
    pub async fn execute(
        &self,
        session: &dyn BrowserSession,
        step: &Step,
        ctx: &StepContext,
    ) -> EnsayoResult<()> {
        let Some(kind) = step.kind() else {
            let reason = match step {
                Step::Invalid { reason, .. } => reason.clone(),
                _ => format!("unknown action: {}", step.action_name()),
            };
            return Err(EngineError::configuration(reason));
        };
        tracing::debug!(test = %ctx.test_name, step = %step, "executing step");

        match step {
            Step::Navigate { url } => self.bounded(kind, ctx, session.navigate(url)).await,

            Step::Click { selector } | Step::Check { selector } | Step::Uncheck { selector } => {
                self.bounded(kind, ctx, async {
                    session.wait_visible(selector).await?;
                    session.click(selector).await
                })
                .await
            }

            Step::Type { selector, text } => {
                self.bounded(kind, ctx, async {
                    session.wait_visible(selector).await?;
                    session.type_text(selector, text).await
                })
                .await
            }

            Step::Hover { selector } => self.bounded(kind, ctx, session.hover(selector)).await,

            Step::Select { selector, value } => {
                self.bounded(kind, ctx, async {
                    session.wait_visible(selector).await?;
                    session.click(selector).await?;
                    session.set_value(selector, value).await
                })
                .await
            }

            Step::WaitFor { selector } => {
                let budget = self.budget(kind, ctx);
                tokio::time::timeout(budget, session.wait_visible(selector))
                    .await
                    .map_err(|_| {
                        EngineError::timeout(format!("waiting for '{selector}' to be visible"))
                    })?
            }

            Step::AssertText { selector, expected } => {
                let actual = self.visible_text(kind, ctx, session, selector).await?;
                if &actual == expected {
                    Ok(())
                } else {
                    Err(EngineError::assertion(
                        format!("text mismatch for '{selector}'"),
                        expected,
                        actual,
                    ))
                }
            }

            Step::AssertTextContains {
                selector,
                substring,
            } => {
                let actual = self.visible_text(kind, ctx, session, selector).await?;
                if actual.contains(substring.as_str()) {
                    Ok(())
                } else {
                    Err(EngineError::assertion(
                        format!("text of '{selector}' does not contain expected text"),
                        substring,
                        actual,
                    ))
                }
            }

            Step::AssertTextVisible { text } => {
                let body = self
                    .bounded(kind, ctx, async {
                        loop {
                            if let Some(body) = session.body_text().await? {
                                return Ok::<_, EngineError>(body);
                            }
                            tokio::time::sleep(POLL_INTERVAL).await;
                        }
                    })
                    .await?;
                if body.contains(text.as_str()) {
                    Ok(())
                } else {
                    Err(EngineError::assertion(
                        "text visibility assertion failed",
                        text,
                        TEXT_NOT_FOUND,
                    ))
                }
            }

            Step::AssertElementExists { selector } => {
                let exists = self
                    .bounded(kind, ctx, session.element_exists(selector))
                    .await?;
                if exists {
                    Ok(())
                } else {
                    Err(EngineError::assertion(
                        format!("element not found: {selector}"),
                        "present",
                        "absent",
                    ))
                }
            }

            Step::AssertElementNotExists { selector } => {
                let exists = self
                    .bounded(kind, ctx, session.element_exists(selector))
                    .await?;
                if exists {
                    Err(EngineError::assertion(
                        format!("element should not exist: {selector}"),
                        "absent",
                        "present",
                    ))
                } else {
                    Ok(())
                }
            }

            Step::AssertUrl { expected } => {
                let actual = self.bounded(kind, ctx, session.current_url()).await?;
                if &actual == expected {
                    Ok(())
                } else {
                    Err(EngineError::assertion("URL mismatch", expected, actual))
                }
            }

            Step::AssertTitle { expected } => {
                let actual = self.bounded(kind, ctx, session.title()).await?;
                if &actual == expected {
                    Ok(())
                } else {
                    Err(EngineError::assertion("title mismatch", expected, actual))
                }
            }

            Step::AssertAttribute {
                selector,
                attribute,
                expected,
            } => {
                let actual = self
                    .bounded(kind, ctx, session.attribute(selector, attribute))
                    .await?;
                match actual {
                    Some(actual) if &actual == expected => Ok(()),
                    Some(actual) => Err(EngineError::assertion(
                        format!("attribute '{attribute}' mismatch on '{selector}'"),
                        expected,
                        actual,
                    )),
                    None => Err(EngineError::assertion(
                        format!("attribute '{attribute}' not found on '{selector}'"),
                        expected,
                        ABSENT,
                    )),
                }
            }

            Step::Screenshot { filename } => {
                let name =
                    self.namer
                        .resolve(ArtifactKind::Screenshot, filename.as_deref(), &ctx.test_name);
                let capture = self.bounded(kind, ctx, session.screenshot()).await?;
                let store = self.screenshots.clone();
                let outcome = run_blocking(move || store.check(&name, &capture)).await?;
                log_outcome(&ctx.test_name, &outcome);
                Ok(())
            }

            Step::Snapshot { filename } => {
                let name =
                    self.namer
                        .resolve(ArtifactKind::Snapshot, filename.as_deref(), &ctx.test_name);
                let html = self.bounded(kind, ctx, session.html()).await?;
                let store = self.snapshots.clone();
                let outcome = run_blocking(move || store.check(&name, &html)).await?;
                log_outcome(&ctx.test_name, &outcome);
                Ok(())
            }

            Step::WaitForText { selector, text } => {
                let deadline = ctx.deadline;
                tokio::time::timeout_at(deadline, async {
                    while !matches!(session.is_visible(selector).await, Ok(true)) {
                        tokio::time::sleep(POLL_INTERVAL).await;
                    }
                    loop {
                        if let Ok(current) = session.text(selector).await {
                            if current.contains(text.as_str()) {
                                return;
                            }
                        }
                        tokio::time::sleep(POLL_INTERVAL).await;
                    }
                })
                .await
                .map_err(|_| {
                    EngineError::timeout(format!(
                        "waiting for text '{text}' in element '{selector}'"
                    ))
                })
            }

            Step::WaitForUrl { fragment } => tokio::time::timeout_at(ctx.deadline, async {
                loop {
                    if let Ok(url) = session.current_url().await {
                        if url.contains(fragment.as_str()) {
                            return;
                        }
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            })
            .await
            .map_err(|_| {
                EngineError::timeout(format!("waiting for URL to contain '{fragment}'"))
            }),

            Step::Invalid { reason, .. } => Err(EngineError::configuration(reason.clone())),
        }
    }

    async fn visible_text(
        &self,
        kind: ActionKind,
        ctx: &StepContext,
        session: &dyn BrowserSession,
        selector: &str,
    ) -> EnsayoResult<String> {
        self.bounded(kind, ctx, async {
            session.wait_visible(selector).await?;
            session.text(selector).await
        })
        .await
    }
}

async fn run_blocking<T, F>(f: F) -> EnsayoResult<T>
where
    F: FnOnce() -> EnsayoResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| EngineError::Aborted {
            message: format!("baseline comparison task failed: {e}"),
        })?
}

fn log_outcome(test_name: &str, outcome: &BaselineOutcome) {
    match outcome {
        BaselineOutcome::Matched { path, difference } => tracing::debug!(
            test = %test_name,
            path = %path.display(),
            difference,
            "baseline matched"
        ),
        BaselineOutcome::Created(path) | BaselineOutcome::Updated(path) => {
            tracing::debug!(test = %test_name, path = %path.display(), "baseline written");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mock::{MockElement, MockSession};

    fn executor(config: EngineConfig) -> StepExecutor {
        StepExecutor::new(Arc::new(config), Arc::new(ArtifactNamer::new()))
    }

    fn ctx() -> StepContext {
        StepContext::new("unit", Duration::from_secs(5))
    }

    fn page() -> MockSession {
        MockSession::new()
            .with_url("https://example.com/login")
            .with_title("Login")
            .with_element("#title", MockElement::text("Welcome back"))
            .with_element(
                "#link",
                MockElement::text("Home").with_attribute("href", "/home"),
            )
            .with_element("#hidden", MockElement::text("secret").hidden())
            .with_body_text("Welcome back. Please sign in.")
    }

    #[tokio::test]
    async fn test_assert_text_exact() {
        let exec = executor(EngineConfig::default());
        let session = page();
        let ok = Step::AssertText {
            selector: "#title".into(),
            expected: "Welcome back".into(),
        };
        exec.execute(&session, &ok, &ctx()).await.unwrap();

        let bad = Step::AssertText {
            selector: "#title".into(),
            expected: "Welcome".into(),
        };
        let err = exec.execute(&session, &bad, &ctx()).await.unwrap_err();
        assert_eq!(
            err,
            EngineError::assertion("text mismatch for '#title'", "Welcome", "Welcome back")
        );
    }

    #[tokio::test]
    async fn test_assert_text_contains_and_visible() {
        let exec = executor(EngineConfig::default());
        let session = page();
        exec.execute(
            &session,
            &Step::AssertTextContains {
                selector: "#title".into(),
                substring: "back".into(),
            },
            &ctx(),
        )
        .await
        .unwrap();
        exec.execute(
            &session,
            &Step::AssertTextVisible {
                text: "Please sign in".into(),
            },
            &ctx(),
        )
        .await
        .unwrap();

        let err = exec
            .execute(
                &session,
                &Step::AssertTextVisible {
                    text: "Goodbye".into(),
                },
                &ctx(),
            )
            .await
            .unwrap_err();
        match err {
            EngineError::Assertion { actual, .. } => assert_eq!(actual, TEXT_NOT_FOUND),
            other => panic!("expected assertion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_assert_attribute_absent_and_unequal() {
        let exec = executor(EngineConfig::default());
        let session = page();
        let step = |attribute: &str, expected: &str| Step::AssertAttribute {
            selector: "#link".into(),
            attribute: attribute.into(),
            expected: expected.into(),
        };

        exec.execute(&session, &step("href", "/home"), &ctx())
            .await
            .unwrap();

        let err = exec
            .execute(&session, &step("href", "/away"), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Assertion { ref actual, .. } if actual == "/home"));

        let err = exec
            .execute(&session, &step("target", "_blank"), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Assertion { ref actual, .. } if actual == ABSENT));
    }

    #[tokio::test]
    async fn test_element_presence() {
        let exec = executor(EngineConfig::default());
        let session = page();
        exec.execute(
            &session,
            &Step::AssertElementExists {
                selector: "#hidden".into(),
            },
            &ctx(),
        )
        .await
        .unwrap();
        exec.execute(
            &session,
            &Step::AssertElementNotExists {
                selector: "#nope".into(),
            },
            &ctx(),
        )
        .await
        .unwrap();
        let err = exec
            .execute(
                &session,
                &Step::AssertElementNotExists {
                    selector: "#title".into(),
                },
                &ctx(),
            )
            .await
            .unwrap_err();
        assert!(err.is_assertion());
    }

    #[tokio::test]
    async fn test_url_and_title() {
        let exec = executor(EngineConfig::default());
        let session = page();
        exec.execute(
            &session,
            &Step::AssertUrl {
                expected: "https://example.com/login".into(),
            },
            &ctx(),
        )
        .await
        .unwrap();
        let err = exec
            .execute(
                &session,
                &Step::AssertTitle {
                    expected: "Dashboard".into(),
                },
                &ctx(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::assertion("title mismatch", "Dashboard", "Login")
        );
    }

    #[tokio::test]
    async fn test_invalid_step_is_configuration_error() {
        let exec = executor(EngineConfig::default());
        let step = Step::from_parts("assert_attribute", "#link", "x");
        let err = exec.execute(&page(), &step, &ctx()).await.unwrap_err();
        assert_eq!(
            err,
            EngineError::configuration("invalid assert_attribute format")
        );
    }

    #[tokio::test]
    async fn test_interactions_are_recorded() {
        let exec = executor(EngineConfig::default());
        let session = page().with_element("#user", MockElement::text(""));
        for step in [
            Step::Type {
                selector: "#user".into(),
                text: "alice".into(),
            },
            Step::Select {
                selector: "#user".into(),
                value: "bob".into(),
            },
            Step::Hover {
                selector: "#link".into(),
            },
        ] {
            exec.execute(&session, &step, &ctx()).await.unwrap();
        }
        assert_eq!(
            session.calls(),
            vec![
                "type #user alice",
                "click #user",
                "set_value #user bob",
                "hover #link"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_hidden_element_times_out() {
        let exec = executor(EngineConfig::default().with_timeout(Duration::from_secs(1)));
        let err = exec
            .execute(
                &page(),
                &Step::WaitFor {
                    selector: "#hidden".into(),
                },
                &StepContext::new("unit", Duration::from_secs(1)),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Timed out waiting for '#hidden' to be visible"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_missing_element_is_protocol_timeout() {
        let exec = executor(
            EngineConfig::default()
                .with_action_timeout(ActionKind::Click, Duration::from_millis(200)),
        );
        let err = exec
            .execute(
                &page(),
                &Step::Click {
                    selector: "#missing".into(),
                },
                &ctx(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::protocol("click", "timed out after 200ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_text_polls_until_text_appears() {
        let exec = executor(EngineConfig::default());
        let session = page()
            .with_element("#status", MockElement::text("Loading"))
            .with_delayed_text("#status", "Ready", Duration::from_millis(300));
        exec.execute(
            &session,
            &Step::WaitForText {
                selector: "#status".into(),
                text: "Ready".into(),
            },
            &ctx(),
        )
        .await
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_url_times_out_at_deadline() {
        let exec = executor(EngineConfig::default());
        let ctx = StepContext::new("unit", Duration::from_millis(250));
        let err = exec
            .execute(
                &page(),
                &Step::WaitForUrl {
                    fragment: "/dashboard".into(),
                },
                &ctx,
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::timeout("waiting for URL to contain '/dashboard'")
        );
    }

    #[tokio::test]
    async fn test_screenshot_and_snapshot_auto_named() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::default()
            .with_screenshot_dir(dir.path().join("shots"))
            .with_snapshot_dir(dir.path().join("snaps"));
        let exec = executor(config);
        let session = page().with_html("<html><body><p>Hi</p></body></html>");
        let ctx = StepContext::new("Login Test", Duration::from_secs(5));

        for step in [
            Step::Screenshot { filename: None },
            Step::Screenshot { filename: None },
            Step::Snapshot { filename: None },
        ] {
            exec.execute(&session, &step, &ctx).await.unwrap();
        }
        assert!(dir.path().join("shots/Login_Test.png").exists());
        assert!(dir.path().join("shots/Login_Test_2.png").exists());
        assert!(dir.path().join("snaps/Login_Test.html").exists());
    }
}
