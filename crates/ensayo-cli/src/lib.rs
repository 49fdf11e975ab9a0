//! Ensayo CLI Library
//!
//! Command-line interface for the Ensayo browser test runner.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)] // String building is clear and correct
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod config;
mod error;
mod output;
mod runner;

pub use commands::{Cli, ColorArg, Commands, DiscoveryArgs, ListArgs, RunArgs};
pub use config::{engine_config, init_tracing, CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{render_json, OutputFormat, ProgressReporter};
pub use runner::{discover_scripts, load_scripts, render_listing, Script, TestRunner};
