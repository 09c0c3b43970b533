use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use spec_runner::config::{
    config_stub, load_config, resolve_render_command, validate_config, LoadedConfig,
    RENDER_COMMAND_ENV,
};
use spec_runner::render::{CommandRenderer, NamedSystemUnderDevelopment};
use spec_runner::report::ReportWriter;
use spec_runner::util::display_path;
use spec_runner::{
    plan_leaves, requests_from_config, ExecutionEngine, OutcomeStatus, PlannedLeaf, RunFailure,
    RunSummary, Runner,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Command, ListArgs, RootArgs, RunArgs};

const LOG_ENV: &str = "SPECRUN_LOG";
const EXIT_EXECUTION_FAILURE: u8 = 2;

fn main() -> ExitCode {
    let args = RootArgs::parse();
    let verbose = match &args.command {
        Command::Run(args) => args.verbose,
        Command::List(args) => args.verbose,
        Command::Init(_) => false,
    };
    init_tracing(verbose);

    let result = match args.command {
        Command::Run(args) => cmd_run(args),
        Command::List(args) => cmd_list(args).map(|()| ExitCode::SUCCESS),
        Command::Init(_) => cmd_init().map(|()| ExitCode::SUCCESS),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            // Nothing ran, which is the same signal as an unexecutable run.
            ExitCode::from(EXIT_EXECUTION_FAILURE)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_with_overrides(path: &Path, reports_dir: Option<&Path>) -> Result<LoadedConfig> {
    let mut loaded = load_config(path)?;
    if let Some(dir) = reports_dir {
        // Flag paths are relative to the working directory, not the config.
        let dir = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            std::env::current_dir()
                .context("resolve current directory")?
                .join(dir)
        };
        loaded.config.reports_directory = dir;
    }
    Ok(loaded)
}

fn cmd_run(args: RunArgs) -> Result<ExitCode> {
    let mut loaded = load_with_overrides(&args.config, args.reports_dir.as_deref())?;
    if let Some(jobs) = args.jobs {
        loaded.config.jobs = jobs;
    }
    if let Some(locale) = &args.locale {
        loaded.config.locale = locale.clone();
    }
    validate_config(&loaded.config).context("validate run config with overrides")?;

    let command = resolve_render_command(args.renderer.as_deref(), &loaded.config).ok_or_else(
        || {
            anyhow!(
                "no render command configured; set renderer.command, pass --renderer, or export {RENDER_COMMAND_ENV}"
            )
        },
    )?;
    let renderer = CommandRenderer::from_command_line(&command)?;
    let system_under_development =
        NamedSystemUnderDevelopment::new(&loaded.config.system_under_development);
    let engine = ExecutionEngine::new(
        Arc::new(renderer),
        Arc::new(system_under_development),
        &loaded.config.locale,
        loaded.config.selector.as_deref(),
    );

    let requests = requests_from_config(&loaded)?;
    let reports_root = loaded.reports_root();
    let runner = Runner::new(
        engine,
        ReportWriter::new(reports_root.clone()),
        loaded.config.jobs,
    );
    let summary = runner.run(&requests);

    if args.json {
        let json = serde_json::to_string_pretty(&summary).context("serialize run summary")?;
        println!("{json}");
    } else {
        print_summary(&summary, &reports_root);
    }

    match summary.into_result() {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(RunFailure::TestFailure(summary)) if loaded.config.test_failure_ignore => {
            tracing::warn!(
                failed = summary.totals.failed,
                "test failures ignored by configuration"
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            eprintln!("build failed: {failure}");
            Ok(ExitCode::from(failure.exit_code()))
        }
    }
}

fn print_summary(summary: &RunSummary, reports_root: &Path) {
    for outcome in &summary.outcomes {
        let label = match outcome.status {
            OutcomeStatus::Passed => "PASS ",
            OutcomeStatus::Failed => "FAIL ",
            OutcomeStatus::ExecutionError => "ERROR",
        };
        match (&outcome.report_path, &outcome.error_detail) {
            (Some(path), _) => println!(
                "{label} {}/{} -> {}",
                outcome.repository,
                outcome.identifier,
                display_path(path, Some(reports_root))
            ),
            (None, Some(detail)) => println!(
                "{label} {}/{}: {detail}",
                outcome.repository, outcome.identifier
            ),
            (None, None) => println!("{label} {}/{}", outcome.repository, outcome.identifier),
        }
    }
    println!(
        "Ran {} specifications: {} passed, {} failed, {} could not be executed ({})",
        summary.totals.executed(),
        summary.totals.passed,
        summary.totals.failed,
        summary.totals.errored,
        summary.decision
    );
    println!("Reports written to {}", reports_root.display());
}

#[derive(Serialize)]
struct ListedLeaf {
    repository: String,
    identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn cmd_list(args: ListArgs) -> Result<()> {
    let loaded = load_with_overrides(&args.config, args.reports_dir.as_deref())?;
    let requests = requests_from_config(&loaded)?;
    let writer = ReportWriter::new(loaded.reports_root());
    let listed: Vec<ListedLeaf> = plan_leaves(&requests)
        .into_iter()
        .map(|leaf| match leaf {
            PlannedLeaf::Run(specification) => ListedLeaf {
                repository: specification.repository_name().to_string(),
                report_path: Some(
                    writer.path_for(specification.repository_name(), &specification.report_name()),
                ),
                identifier: specification.identifier,
                error: None,
            },
            PlannedLeaf::Unresolved(outcome) => ListedLeaf {
                repository: outcome.repository,
                identifier: outcome.identifier,
                report_path: None,
                error: outcome.error_detail,
            },
        })
        .collect();

    if args.json {
        let json = serde_json::to_string_pretty(&listed).context("serialize listing")?;
        println!("{json}");
        return Ok(());
    }
    for leaf in &listed {
        match (&leaf.report_path, &leaf.error) {
            (Some(path), _) => println!(
                "{}\t{}\t{}",
                leaf.repository,
                leaf.identifier,
                display_path(path, Some(writer.root()))
            ),
            (None, error) => println!(
                "{}\t{}\terror: {}",
                leaf.repository,
                leaf.identifier,
                error.as_deref().unwrap_or("unresolved")
            ),
        }
    }
    println!("{} specifications", listed.len());
    Ok(())
}

fn cmd_init() -> Result<()> {
    println!("{}", config_stub()?);
    Ok(())
}
