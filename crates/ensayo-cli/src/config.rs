//! CLI configuration

use ensayo::{find_config_file, parse_duration, EngineConfig, FileConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::commands::RunArgs;
use crate::error::{CliError, CliResult};

/// CLI verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// Quiet - minimal output
    Quiet,
    /// Normal - default output
    #[default]
    Normal,
    /// Verbose - extra output
    Verbose,
    /// Debug - maximum output
    Debug,
    /// Trace - every protocol call
    Trace,
}

impl Verbosity {
    /// Map a `-v` count to a level
    #[must_use]
    pub const fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Verbose,
            2 => Self::Debug,
            _ => Self::Trace,
        }
    }

    /// Check if quiet mode
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }

    /// Check if verbose or higher
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose | Self::Debug | Self::Trace)
    }

    /// Default `tracing` filter directive for this level
    #[must_use]
    pub const fn log_filter(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn",
            Self::Verbose => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorChoice {
    /// Always use colors
    Always,
    /// Use colors when output is a terminal
    #[default]
    Auto,
    /// Never use colors
    Never,
}

impl ColorChoice {
    /// Should use colors based on output detection
    #[must_use]
    pub fn should_color(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => console::Term::stderr().features().colors_supported(),
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Verbosity level
    pub verbosity: Verbosity,
    /// Color output choice
    pub color: ColorChoice,
}

impl CliConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set color choice
    #[must_use]
    pub const fn with_color(mut self, color: ColorChoice) -> Self {
        self.color = color;
        self
    }
}

/// Install the global `tracing` subscriber; `RUST_LOG` wins over `-v`
pub fn init_tracing(verbosity: Verbosity) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(verbosity.log_filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Resolve the engine configuration for `run`.
///
/// Defaults, then the config file (explicit `--config` or one discovered in
/// `cwd`), then explicit flags.
pub fn engine_config(args: &RunArgs, cwd: &Path) -> CliResult<EngineConfig> {
    let mut config = EngineConfig::default();

    let file = match &args.config {
        Some(path) if !path.is_file() => {
            return Err(CliError::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        Some(path) => Some(path.clone()),
        None => find_config_file(cwd),
    };
    if let Some(path) = file {
        tracing::debug!(path = %path.display(), "loading config file");
        config = FileConfig::load(&path)
            .and_then(|file| file.apply_to(config))
            .map_err(|e| CliError::config(format!("{}: {e}", path.display())))?;
    }

    if let Some(headless) = args.headless() {
        config = config.with_headless(headless);
    }
    if let Some(timeout) = &args.timeout {
        let timeout = parse_duration(timeout)
            .map_err(|e| CliError::invalid_argument(format!("--timeout: {e}")))?;
        config = config.with_timeout(timeout);
    }
    if let Some(fail) = args.fail_on_console_error {
        config = config.with_fail_on_console_error(fail);
    }
    if let Some(dir) = &args.screenshot_dir {
        config = config.with_screenshot_dir(dir);
    }
    if args.update_screenshots {
        config = config.with_update_screenshots(true);
    }
    if let Some(dir) = &args.snapshot_dir {
        config = config.with_snapshot_dir(dir);
    }
    if args.update_snapshots {
        config = config.with_update_snapshots(true);
    }
    if let Some(threshold) = args.threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(CliError::invalid_argument(format!(
                "--threshold must be between 0.0 and 1.0, got {threshold}"
            )));
        }
        config = config.with_screenshot_threshold(threshold);
    }
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }

    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands};
    use clap::Parser;
    use std::time::Duration;

    fn run_args(args: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(["ensayo", "run"].iter().chain(args)).unwrap();
        match cli.command {
            Commands::Run(args) => args,
            Commands::List(_) => panic!("expected run"),
        }
    }

    mod verbosity_tests {
        use super::*;

        #[test]
        fn test_from_flags() {
            assert_eq!(Verbosity::from_flags(true, 3), Verbosity::Quiet);
            assert_eq!(Verbosity::from_flags(false, 0), Verbosity::Normal);
            assert_eq!(Verbosity::from_flags(false, 1), Verbosity::Verbose);
            assert_eq!(Verbosity::from_flags(false, 2), Verbosity::Debug);
            assert_eq!(Verbosity::from_flags(false, 9), Verbosity::Trace);
        }

        #[test]
        fn test_log_filter() {
            assert_eq!(Verbosity::Normal.log_filter(), "warn");
            assert_eq!(Verbosity::Verbose.log_filter(), "info");
            assert_eq!(Verbosity::Trace.log_filter(), "trace");
        }

        #[test]
        fn test_is_verbose() {
            assert!(!Verbosity::Quiet.is_verbose());
            assert!(!Verbosity::Normal.is_verbose());
            assert!(Verbosity::Debug.is_verbose());
        }
    }

    #[test]
    fn test_color_choice() {
        assert!(ColorChoice::Always.should_color());
        assert!(!ColorChoice::Never.should_color());
    }

    #[test]
    fn test_defaults_without_file_or_flags() {
        let dir = tempfile::tempdir().unwrap();
        let config = engine_config(&run_args(&[]), dir.path()).unwrap();
        assert!(config.headless);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.fail_on_console_error);
    }

    #[test]
    fn test_flags_override_discovered_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("ensayo.config.yaml"),
            "timeout: 30s\nworkers: 2\nfailOnConsoleError: false\n",
        )
        .unwrap();

        let config = engine_config(&run_args(&[]), dir.path()).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.workers, 2);
        assert!(!config.fail_on_console_error);

        let config = engine_config(&run_args(&["--timeout", "5s", "-j", "6"]), dir.path()).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.workers, 6);
        assert!(!config.fail_on_console_error);
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        let err = engine_config(
            &run_args(&["--config", missing.to_str().unwrap()]),
            dir.path(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn test_invalid_flag_values() {
        let dir = tempfile::tempdir().unwrap();
        assert!(engine_config(&run_args(&["--timeout", "soon"]), dir.path()).is_err());
        assert!(engine_config(&run_args(&["--threshold", "2"]), dir.path()).is_err());
    }
}
