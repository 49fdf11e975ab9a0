//! Script discovery and test execution

use ensayo::{dsl, EngineConfig, Runner, SessionAllocator, SuiteResults, TestCase};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::commands::DiscoveryArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;

/// Script files named by `args`, sorted and deduplicated.
///
/// Files are taken as given; directories are searched recursively for
/// `args.pattern`.
pub fn discover_scripts(args: &DiscoveryArgs) -> CliResult<Vec<PathBuf>> {
    let mut scripts = Vec::new();

    for path in &args.paths {
        if path.is_file() {
            scripts.push(path.clone());
        } else if path.is_dir() {
            let pattern = path.join("**").join(&args.pattern);
            let pattern = pattern.to_string_lossy();
            let entries = glob::glob(&pattern)
                .map_err(|e| CliError::invalid_argument(format!("--pattern: {e}")))?;
            scripts.extend(entries.filter_map(Result::ok).filter(|p| p.is_file()));
        } else {
            return Err(CliError::invalid_argument(format!(
                "no such file or directory: {}",
                path.display()
            )));
        }
    }

    scripts.sort();
    scripts.dedup();
    Ok(scripts)
}

/// Tests parsed from one script
#[derive(Debug, Clone)]
pub struct Script {
    /// Script file
    pub path: PathBuf,
    /// Tests in file order
    pub tests: Vec<TestCase>,
}

/// Parse every script, failing on the first parse error
pub fn load_scripts(paths: &[PathBuf]) -> CliResult<Vec<Script>> {
    paths
        .iter()
        .map(|path| {
            let tests = dsl::parse_file(path).map_err(|e| CliError::script(path, e))?;
            Ok(Script {
                path: path.clone(),
                tests,
            })
        })
        .collect()
}

/// Runs parsed tests against a session allocator and reports progress
#[derive(Debug)]
pub struct TestRunner {
    config: CliConfig,
    reporter: ProgressReporter,
}

impl TestRunner {
    /// Create a new test runner
    #[must_use]
    pub fn new(config: CliConfig) -> Self {
        let reporter =
            ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
        Self { config, reporter }
    }

    /// Run `tests`, streaming each result to the reporter as it completes.
    ///
    /// The allocator is started before and stopped after the run, also when
    /// Ctrl-C interrupts it.
    pub async fn run(
        &mut self,
        engine_config: EngineConfig,
        allocator: Arc<dyn SessionAllocator>,
        tests: Vec<TestCase>,
    ) -> CliResult<SuiteResults> {
        let started = Instant::now();
        if tests.is_empty() {
            self.reporter.warning("No tests found");
            return Ok(SuiteResults::new(Vec::new(), started.elapsed()));
        }

        let total = tests.len();
        let mut runner = Runner::new(engine_config, allocator);
        for test in tests {
            runner.add_test(test);
        }
        if self.config.verbosity.is_verbose() {
            self.reporter.info(&format!(
                "{total} tests on {} workers",
                runner.config().workers
            ));
        }

        runner.start().await?;
        self.reporter.header("Running Tests");
        self.reporter.start_progress(total as u64, "running");

        let (tx, mut rx) = mpsc::channel(total);
        let run = runner.run_streaming(tx);
        let interrupt = tokio::signal::ctrl_c();
        tokio::pin!(run, interrupt);

        let outcome = loop {
            tokio::select! {
                Some(result) = rx.recv() => {
                    self.reporter.test_result(&result);
                    self.reporter.increment(1);
                }
                results = &mut run => break Some(results),
                _ = &mut interrupt => break None,
            }
        };
        while let Ok(result) = rx.try_recv() {
            self.reporter.test_result(&result);
            self.reporter.increment(1);
        }
        self.reporter.finish();

        if let Err(e) = runner.stop().await {
            tracing::warn!(error = %e, "failed to stop browser");
        }

        let Some(results) = outcome else {
            self.reporter.failure("Interrupted");
            return Err(CliError::Interrupted);
        };

        let suite = SuiteResults::new(results, started.elapsed());
        self.reporter
            .summary(suite.passed_count(), suite.failed_count(), suite.duration);
        Ok(suite)
    }

    /// Get the reporter (for testing)
    #[must_use]
    pub const fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }
}

/// Render `ensayo list` output
#[must_use]
pub fn render_listing(scripts: &[Script], root: &Path) -> String {
    let mut out = String::new();
    let mut count = 0;
    for script in scripts {
        let shown = script.path.strip_prefix(root).unwrap_or(&script.path);
        out.push_str(&format!("{}:\n", shown.display()));
        for test in &script.tests {
            count += 1;
            let steps = test.step_count();
            let noun = if steps == 1 { "step" } else { "steps" };
            out.push_str(&format!("  {} ({steps} {noun})\n", test.name));
        }
    }
    out.push_str(&format!("\n{count} tests in {} files\n", scripts.len()));
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{ColorChoice, Verbosity};
    use ensayo::mock::{MockAllocator, MockElement, MockSession};

    fn quiet_runner() -> TestRunner {
        TestRunner::new(
            CliConfig::new()
                .with_verbosity(Verbosity::Quiet)
                .with_color(ColorChoice::Never),
        )
    }

    fn discovery(paths: Vec<PathBuf>, pattern: &str) -> DiscoveryArgs {
        DiscoveryArgs {
            paths,
            pattern: pattern.to_string(),
        }
    }

    #[test]
    fn test_discover_scripts_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.test"), "test a\n").unwrap();
        std::fs::write(dir.path().join("nested/b.test"), "test b\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let found = discover_scripts(&discovery(vec![dir.path().to_path_buf()], "*.test")).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| p.extension().unwrap() == "test"));

        let explicit = dir.path().join("notes.txt");
        let found = discover_scripts(&discovery(vec![explicit.clone(), explicit], "*.test")).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_discover_missing_path() {
        let err = discover_scripts(&discovery(vec![PathBuf::from("/no/such/dir")], "*.test"))
            .unwrap_err();
        assert!(err.to_string().contains("no such file or directory"));
    }

    #[test]
    fn test_load_scripts_reports_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.test");
        std::fs::write(&path, "test a\n  fly #x\n").unwrap();
        let err = load_scripts(&[path]).unwrap_err();
        assert!(err.to_string().ends_with("bad.test: line 2: unknown action: fly"));
    }

    #[test]
    fn test_render_listing() {
        let root = Path::new("/work");
        let scripts = vec![Script {
            path: root.join("login.test"),
            tests: vec![
                TestCase::builder("login").navigate("/").click("#go").build(),
                TestCase::builder("one").click("#go").build(),
            ],
        }];
        let listing = render_listing(&scripts, root);
        assert!(listing.contains("login.test:\n"));
        assert!(listing.contains("  login (2 steps)\n"));
        assert!(listing.contains("  one (1 step)\n"));
        assert!(listing.ends_with("2 tests in 1 files\n"));
    }

    #[tokio::test]
    async fn test_run_reports_every_result() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::default()
            .with_screenshot_dir(dir.path().join("shots"))
            .with_snapshot_dir(dir.path().join("snaps"));
        let allocator = Arc::new(MockAllocator::new(|_| {
            MockSession::new().with_element("#go", MockElement::text("Go"))
        }));
        let tests = vec![
            TestCase::builder("a").click("#go").build(),
            TestCase::builder("b").assert_text("#go", "Stop").build(),
        ];

        let suite = quiet_runner()
            .run(config, Arc::clone(&allocator) as Arc<dyn SessionAllocator>, tests)
            .await
            .unwrap();
        assert_eq!(suite.total(), 2);
        assert_eq!(suite.passed_count(), 1);
        assert_eq!(suite.failures()[0].name, "b");
        assert_eq!(allocator.stop_count(), 1);
        assert!(!allocator.is_started());
    }

    #[tokio::test]
    async fn test_run_without_tests_skips_browser() {
        let allocator = Arc::new(MockAllocator::default());
        let suite = quiet_runner()
            .run(
                EngineConfig::default(),
                Arc::clone(&allocator) as Arc<dyn SessionAllocator>,
                Vec::new(),
            )
            .await
            .unwrap();
        assert_eq!(suite.total(), 0);
        assert_eq!(allocator.stop_count(), 0);
    }

    #[tokio::test]
    async fn test_start_failure_is_an_error() {
        let allocator = Arc::new(MockAllocator::default().with_start_error("no chromium"));
        let err = quiet_runner()
            .run(
                EngineConfig::default(),
                allocator,
                vec![TestCase::new("a")],
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no chromium"));
    }
}
