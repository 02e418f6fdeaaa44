// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! This layer is the configuration collaborator for the watch loop: it
//! resolves the watch targets, the command to run, and the two policy
//! durations (debounce window, termination grace period), and hands them to
//! the core pre-resolved.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::errors::Result;
use crate::types::Action;

/// Command-line arguments for `devloop`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "devloop",
    version,
    about = "Re-run a command whenever watched files change.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to watch (file, or directory watched recursively). May be
    /// repeated; defaults to the current directory.
    #[arg(short = 'w', long = "watch", value_name = "PATH")]
    pub watch: Vec<PathBuf>,

    /// Debounce window in milliseconds: a burst of changes within this window
    /// triggers a single run, fired this long after the last change.
    #[arg(long, value_name = "MS", default_value_t = 300)]
    pub debounce_ms: u64,

    /// Grace period in milliseconds between the termination signal and a
    /// forced kill when a run is superseded.
    #[arg(long, value_name = "MS", default_value_t = 3000)]
    pub grace_ms: u64,

    /// Glob pattern (relative to a watched directory) whose changes are
    /// ignored. May be repeated.
    #[arg(long, value_name = "GLOB")]
    pub ignore: Vec<String>,

    /// Disable the built-in ignore patterns (.git, target, editor droppings).
    #[arg(long)]
    pub no_default_ignore: bool,

    /// Clear the screen before each run.
    #[arg(long)]
    pub clear: bool,

    /// Do not run the command once at startup; wait for the first change.
    #[arg(long)]
    pub postpone: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DEVLOOP_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// The command to run, e.g. `devloop -w src -- cargo test`.
    #[arg(trailing_var_arg = true, required = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl CliArgs {
    /// Effective watch targets: what was given, or the current directory.
    pub fn watch_paths(&self) -> Vec<PathBuf> {
        if self.watch.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            self.watch.clone()
        }
    }

    /// The resolved command template.
    pub fn action(&self) -> Result<Action> {
        Action::from_argv(&self.command)
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
