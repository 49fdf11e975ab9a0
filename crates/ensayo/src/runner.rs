//! Execution engine: a fixed pool of workers running tests concurrently.
//!
//! ```text
//!            ┌──────────── queue (VecDeque<TestCase>) ────────────┐
//!            ▼                    ▼                               ▼
//!       worker 0             worker 1         ...            worker W-1
//!   open session          open session                    open session
//!   steps + console       steps + console                 steps + console
//!   close session         close session                   close session
//!            └──────────► results channel (capacity N) ◄──────────┘
//!                                  │
//!                          collector loop ──► optional progress sender
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;

use crate::baseline::ArtifactNamer;
use crate::config::EngineConfig;
use crate::console::ConsoleCollector;
use crate::executor::{StepContext, StepExecutor};
use crate::harness::TestResult;
use crate::result::{EngineError, EnsayoResult};
use crate::session::{BrowserSession, SessionAllocator};
use crate::step::{Step, TestCase};

/// Page every session starts from
pub const BLANK_PAGE: &str = "about:blank";

/// State shared by every worker
struct Engine {
    config: Arc<EngineConfig>,
    allocator: Arc<dyn SessionAllocator>,
    executor: StepExecutor,
}

impl Engine {
    /// Run one test with its own session, closing the session on every path
    async fn run_test(self: Arc<Self>, test: TestCase) -> TestResult {
        let name = test.name.clone();
        if !self.allocator.is_started() {
            return TestResult::fail(name, EngineError::precondition("browser not started"));
        }
        let session = match self.allocator.open().await {
            Ok(session) => session,
            Err(e) => return TestResult::fail(name, e),
        };

        let engine = Arc::clone(&self);
        let body = tokio::spawn(engine.run_steps(Arc::clone(&session), test));
        let result = match body.await {
            Ok(result) => result,
            Err(e) => TestResult::fail(&name, aborted(e)),
        };

        if let Err(e) = session.close().await {
            tracing::warn!(test = %name, error = %e, "failed to close session");
        }
        if result.passed {
            tracing::info!(test = %name, duration = ?result.duration, "test passed");
        } else {
            tracing::info!(
                test = %name,
                duration = ?result.duration,
                error = %result.error.as_ref().map(ToString::to_string).unwrap_or_default(),
                "test failed"
            );
        }
        result
    }

    async fn run_steps(self: Arc<Self>, session: Arc<dyn BrowserSession>, test: TestCase) -> TestResult {
        let ctx = StepContext::new(test.name.as_str(), self.config.timeout);

        let collector =
            match ConsoleCollector::attach(Arc::clone(&session), Arc::clone(&self.config), ctx.deadline)
                .await
            {
                Ok(collector) => collector,
                Err(e) => return TestResult::fail(test.name, e),
            };

        let blank = Step::Navigate {
            url: BLANK_PAGE.to_string(),
        };
        if let Err(e) = self.executor.execute(session.as_ref(), &blank, &ctx).await {
            let message = match e {
                EngineError::Protocol { message, .. } => message,
                other => other.to_string(),
            };
            let _ = collector.finish().await;
            return TestResult::fail(
                test.name,
                EngineError::protocol("navigate", format!("failed to initialize browser: {message}")),
            );
        }

        let started = Instant::now();
        let mut outcome = Ok(());
        for (index, step) in test.steps.iter().enumerate() {
            if let Err(e) = self.executor.execute(session.as_ref(), step, &ctx).await {
                tracing::debug!(test = %test.name, step = index + 1, action = step.action_name(), error = %e, "step failed");
                outcome = Err(e);
                break;
            }
        }
        let duration = started.elapsed();

        let console_errors = collector.finish().await;
        TestResult::from_run(
            test.name,
            outcome,
            console_errors,
            self.config.fail_on_console_error,
            duration,
        )
    }
}

fn aborted(err: JoinError) -> EngineError {
    let message = if err.is_panic() {
        let payload = err.into_panic();
        payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .map_or_else(|| "test panicked".to_string(), |p| format!("test panicked: {p}"))
    } else {
        "test cancelled".to_string()
    };
    EngineError::Aborted { message }
}

/// Runs tests across a pool of workers.
///
/// ```no_run
/// # async fn demo() -> ensayo::EnsayoResult<()> {
/// use std::sync::Arc;
/// use ensayo::mock::MockAllocator;
/// use ensayo::{EngineConfig, Runner, TestCase};
///
/// let mut runner = Runner::new(EngineConfig::default(), Arc::new(MockAllocator::default()));
/// runner.add_test(TestCase::builder("t1").navigate("about:blank").assert_title("").build());
/// runner.start().await?;
/// let results = runner.run().await;
/// runner.stop().await?;
/// assert!(results[0].passed);
/// # Ok(())
/// # }
/// ```
pub struct Runner {
    engine: Arc<Engine>,
    tests: Vec<TestCase>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("config", &self.engine.config)
            .field("started", &self.engine.allocator.is_started())
            .field("tests", &self.tests.len())
            .finish()
    }
}

impl Runner {
    /// Create a runner; `config` is frozen from here on
    pub fn new(config: EngineConfig, allocator: Arc<dyn SessionAllocator>) -> Self {
        let config = Arc::new(config);
        let executor = StepExecutor::new(Arc::clone(&config), Arc::new(ArtifactNamer::new()));
        Self {
            engine: Arc::new(Engine {
                config,
                allocator,
                executor,
            }),
            tests: Vec::new(),
        }
    }

    /// Engine configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.engine.config
    }

    /// Session allocator
    #[must_use]
    pub fn allocator(&self) -> Arc<dyn SessionAllocator> {
        Arc::clone(&self.engine.allocator)
    }

    /// Acquire the browser
    pub async fn start(&self) -> EnsayoResult<()> {
        self.engine.allocator.start().await
    }

    /// Release the browser
    pub async fn stop(&self) -> EnsayoResult<()> {
        self.engine.allocator.stop().await
    }

    /// Queue a test
    pub fn add_test(&mut self, test: TestCase) {
        if self.tests.iter().any(|t| t.name == test.name) {
            tracing::warn!(
                test = %test.name,
                "duplicate test name; auto-named baselines will be numbered across both tests"
            );
        }
        self.tests.push(test);
    }

    /// Queued tests
    #[must_use]
    pub fn tests(&self) -> &[TestCase] {
        &self.tests
    }

    /// Run every queued test; one result per test, in completion order
    pub async fn run(&self) -> Vec<TestResult> {
        self.execute(None).await
    }

    /// Like [`Runner::run`], also sending each result on `progress` as it
    /// completes. `progress` is dropped once every result was delivered.
    pub async fn run_streaming(&self, progress: mpsc::Sender<TestResult>) -> Vec<TestResult> {
        self.execute(Some(progress)).await
    }

    async fn execute(&self, progress: Option<mpsc::Sender<TestResult>>) -> Vec<TestResult> {
        let total = self.tests.len();
        if total == 0 {
            return Vec::new();
        }
        let workers = self.engine.config.workers.max(1);
        tracing::debug!(tests = total, workers, "running tests");

        let queue = Arc::new(Mutex::new(self.tests.iter().cloned().collect::<VecDeque<_>>()));
        let (tx, mut rx) = mpsc::channel(total);
        let mut pool = JoinSet::new();

        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let engine = Arc::clone(&self.engine);
            pool.spawn(async move {
                loop {
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    let Some(test) = next else { break };
                    let result = Arc::clone(&engine).run_test(test).await;
                    if tx.send(result).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut results = Vec::with_capacity(total);
        while let Some(result) = rx.recv().await {
            if let Some(progress) = &progress {
                let _ = progress.send(result.clone()).await;
            }
            results.push(result);
        }
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "worker task failed");
            }
        }
        results
    }
}
