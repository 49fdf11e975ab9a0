//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::ColorChoice;
use crate::output::OutputFormat;

/// Ensayo: run DSL browser tests with screenshot and snapshot regression
#[derive(Parser, Debug)]
#[command(name = "ensayo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run test scripts in a browser
    Run(RunArgs),

    /// List the tests in scripts without running them
    List(ListArgs),
}

/// Where to look for scripts
#[derive(Args, Debug, Clone)]
pub struct DiscoveryArgs {
    /// Script files or directories to search
    #[arg(default_value = ".")]
    pub paths: Vec<PathBuf>,

    /// File name pattern used inside directories
    #[arg(long, default_value = "*.test")]
    pub pattern: String,
}

/// Arguments for the run command
#[derive(Args, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunArgs {
    /// Scripts to run
    #[command(flatten)]
    pub discovery: DiscoveryArgs,

    /// Run the browser without a window
    #[arg(long, conflicts_with = "headed")]
    pub headless: bool,

    /// Run the browser with a window
    #[arg(long)]
    pub headed: bool,

    /// Per-test timeout, e.g. "30s" or "1m30s"
    #[arg(long)]
    pub timeout: Option<String>,

    /// Fail tests that log console errors
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub fail_on_console_error: Option<bool>,

    /// Config file (default: discovered in the working directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Screenshot baseline directory
    #[arg(long)]
    pub screenshot_dir: Option<PathBuf>,

    /// Overwrite screenshot baselines
    #[arg(long)]
    pub update_screenshots: bool,

    /// HTML snapshot baseline directory
    #[arg(long)]
    pub snapshot_dir: Option<PathBuf>,

    /// Overwrite HTML snapshot baselines
    #[arg(long)]
    pub update_snapshots: bool,

    /// Tolerated fraction of differing screenshot pixels (0.0-1.0)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Number of concurrent workers
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl RunArgs {
    /// Headless override from `--headless` / `--headed`
    #[must_use]
    pub const fn headless(&self) -> Option<bool> {
        if self.headed {
            Some(false)
        } else if self.headless {
            Some(true)
        } else {
            None
        }
    }
}

/// Arguments for the list command
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Scripts to list
    #[command(flatten)]
    pub discovery: DiscoveryArgs,
}

/// Color argument
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Auto-detect terminal
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
