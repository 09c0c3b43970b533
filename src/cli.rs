//! CLI argument parsing.
//!
//! The CLI only loads configuration, applies overrides and reports the
//! outcome; all run semantics live in the library.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "specrun",
    version,
    about = "Run executable specifications and decide build status",
    after_help = "Exit codes:\n  0  every specification passed (or test failures are ignored)\n  1  specifications ran, some assertions failed\n  2  some specifications could not be executed, or the run could not start\n\nExamples:\n  specrun run --config specrun.json\n  specrun run --config specrun.json --jobs 4 --json\n  specrun list --config specrun.json\n  specrun init > specrun.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    List(ListArgs),
    Init(InitArgs),
}

/// Run command inputs.
#[derive(Parser, Debug)]
#[command(about = "Execute every configured test and suite")]
pub struct RunArgs {
    /// Run configuration JSON
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,

    /// Override the reports directory
    #[arg(long, value_name = "DIR")]
    pub reports_dir: Option<PathBuf>,

    /// Number of specifications to execute concurrently
    #[arg(long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Override the locale passed to the renderer
    #[arg(long)]
    pub locale: Option<String>,

    /// Render command (takes precedence over config and SPECRUN_RENDER_COMMAND)
    #[arg(long, value_name = "CMD")]
    pub renderer: Option<String>,

    /// Emit the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Log progress to stderr
    #[arg(long)]
    pub verbose: bool,
}

/// List command inputs.
#[derive(Parser, Debug)]
#[command(about = "Expand configured tests and suites without executing them")]
pub struct ListArgs {
    /// Run configuration JSON
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,

    /// Override the reports directory
    #[arg(long, value_name = "DIR")]
    pub reports_dir: Option<PathBuf>,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,

    /// Log progress to stderr
    #[arg(long)]
    pub verbose: bool,
}

/// Init command inputs.
#[derive(Parser, Debug)]
#[command(about = "Print a starter run configuration")]
pub struct InitArgs {}
