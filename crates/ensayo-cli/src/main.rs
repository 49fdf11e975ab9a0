//! Ensayo CLI: run DSL browser tests
//!
//! ## Usage
//!
//! ```bash
//! ensayo run                          # Run every *.test under the current directory
//! ensayo run tests/e2e -j 8           # Eight concurrent browser sessions
//! ensayo run login.test --headed      # Watch it happen
//! ensayo run --update-screenshots     # Accept new screenshot baselines
//! ensayo list tests/e2e               # Show tests without running them
//! ```

use clap::Parser;
use ensayo::SessionAllocator;
use ensayo_cli::{
    discover_scripts, engine_config, init_tracing, load_scripts, render_json, render_listing,
    Cli, CliConfig, CliError, CliResult, ColorChoice, Commands, ListArgs, OutputFormat, RunArgs,
    TestRunner, Verbosity,
};
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);
    init_tracing(verbosity);
    let color: ColorChoice = cli.color.clone().into();
    let config = CliConfig::new().with_verbosity(verbosity).with_color(color);

    match cli.command {
        Commands::Run(args) => run_tests(config, &args),
        Commands::List(args) => list_tests(&args),
    }
}

fn run_tests(config: CliConfig, args: &RunArgs) -> CliResult<()> {
    let cwd = std::env::current_dir()?;
    let engine_config = engine_config(args, &cwd)?;
    let scripts = load_scripts(&discover_scripts(&args.discovery)?)?;
    let tests: Vec<_> = scripts.into_iter().flat_map(|s| s.tests).collect();

    let mut runner = TestRunner::new(config);
    let suite = if tests.is_empty() {
        runner.reporter().warning("No tests found");
        ensayo::SuiteResults::default()
    } else {
        let allocator = browser_allocator(&engine_config)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime.block_on(runner.run(engine_config, allocator, tests))?
    };

    if args.format == OutputFormat::Json {
        println!("{}", render_json(&suite)?);
    }

    if suite.all_passed() {
        Ok(())
    } else {
        Err(CliError::test_execution(format!(
            "{} of {} tests failed",
            suite.failed_count(),
            suite.total()
        )))
    }
}

#[cfg(feature = "browser")]
fn browser_allocator(config: &ensayo::EngineConfig) -> CliResult<Arc<dyn SessionAllocator>> {
    Ok(Arc::new(ensayo::ChromiumAllocator::new(config)))
}

#[cfg(not(feature = "browser"))]
fn browser_allocator(_config: &ensayo::EngineConfig) -> CliResult<Arc<dyn SessionAllocator>> {
    Err(CliError::BrowserUnavailable)
}

fn list_tests(args: &ListArgs) -> CliResult<()> {
    let cwd = std::env::current_dir()?;
    let scripts = load_scripts(&discover_scripts(&args.discovery)?)?;
    print!("{}", render_listing(&scripts, &cwd));
    Ok(())
}
