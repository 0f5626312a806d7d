// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_task_path;

/// Command-line arguments for `acb`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "acb",
    version,
    about = "Run a container build task as a dependency graph of steps.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the task file (TOML).
    #[arg(long, short = 'f', value_name = "PATH", default_value_os_t = default_task_path())]
    pub file: PathBuf,

    /// Registry prefixed to unqualified build tags and push targets.
    ///
    /// Overrides `registry` from the task file.
    #[arg(long, value_name = "NAME")]
    pub registry: Option<String>,

    /// Container CLI used for every step.
    #[arg(long, value_name = "BIN", default_value = "docker")]
    pub docker: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ACB_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the task and print its execution plan without running anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
