//! Run orchestration.
//!
//! Expands every request, executes each leaf once, writes its report, and
//! folds the outcomes into a single [`RunSummary`]. Leaves run sequentially
//! unless more than one job is configured; either way the summary lists
//! outcomes in leaf order and is only finalized after every leaf completes.
use crate::config::LoadedConfig;
use crate::engine::{ExecutionEngine, ExecutionOutcome, SpecError};
use crate::report::ReportWriter;
use crate::repository;
use crate::result::{RunResult, RunSummary};
use crate::suite::{SpecRequest, Specification, SuiteExpander};
use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

/// A unit of work after expansion.
#[derive(Debug, Clone)]
pub enum PlannedLeaf {
    Run(Specification),
    /// A suite that could not be expanded; recorded as an execution error.
    Unresolved(ExecutionOutcome),
}

/// Build requests for every configured repository: tests first, then suites.
pub fn requests_from_config(loaded: &LoadedConfig) -> Result<Vec<SpecRequest>> {
    let mut requests = Vec::new();
    for repo_config in &loaded.config.repositories {
        let repository = repository::open(
            repo_config,
            &loaded.base_dir,
            loaded.config.remote_timeout(),
        )?;
        for test in &repo_config.tests {
            requests.push(SpecRequest::single(repository.clone(), test));
        }
        for suite in &repo_config.suites {
            requests.push(SpecRequest::suite(repository.clone(), suite));
        }
    }
    Ok(requests)
}

/// Expand requests into leaves, dropping repeats of the same report path.
pub fn plan_leaves(requests: &[SpecRequest]) -> Vec<PlannedLeaf> {
    let expander = SuiteExpander;
    let mut seen = BTreeSet::new();
    let mut leaves = Vec::new();
    for request in requests {
        match expander.expand(request) {
            Ok(specifications) => {
                for specification in specifications {
                    let key = (
                        specification.repository_name().to_string(),
                        specification.report_name(),
                    );
                    if !seen.insert(key) {
                        tracing::debug!(
                            repository = specification.repository_name(),
                            identifier = %specification.identifier,
                            "skipping duplicate specification"
                        );
                        continue;
                    }
                    leaves.push(PlannedLeaf::Run(specification));
                }
            }
            Err(err) => {
                let err = SpecError::from(err);
                tracing::warn!(
                    repository = request.repository.name(),
                    identifier = %request.identifier,
                    error = %err,
                    "suite could not be expanded"
                );
                leaves.push(PlannedLeaf::Unresolved(ExecutionOutcome::execution_error(
                    request.repository.name(),
                    &request.identifier,
                    &err,
                )));
            }
        }
    }
    leaves
}

pub struct Runner {
    engine: ExecutionEngine,
    writer: ReportWriter,
    jobs: usize,
}

impl Runner {
    pub fn new(engine: ExecutionEngine, writer: ReportWriter, jobs: usize) -> Self {
        Self {
            engine,
            writer,
            jobs: jobs.max(1),
        }
    }

    pub fn writer(&self) -> &ReportWriter {
        &self.writer
    }

    /// Execute every request and return the finalized summary.
    pub fn run(&self, requests: &[SpecRequest]) -> RunSummary {
        let leaves = plan_leaves(requests);
        if leaves.is_empty() {
            tracing::info!("no specifications to run");
        }
        let outcomes = if self.jobs == 1 || leaves.len() <= 1 {
            leaves.iter().map(|leaf| self.execute(leaf)).collect()
        } else {
            self.execute_parallel(&leaves)
        };

        let mut result = RunResult::new();
        for outcome in outcomes {
            result.record(outcome);
        }
        let summary = result.finalize();
        tracing::info!(
            decision = %summary.decision,
            passed = summary.totals.passed,
            failed = summary.totals.failed,
            errored = summary.totals.errored,
            "run finished"
        );
        match self.writer.write_summary(&summary) {
            Ok(path) => tracing::debug!(path = %path.display(), "run summary written"),
            Err(err) => tracing::warn!(error = %err, "could not write run summary"),
        }
        summary
    }

    fn execute(&self, leaf: &PlannedLeaf) -> ExecutionOutcome {
        let specification = match leaf {
            PlannedLeaf::Run(specification) => specification,
            PlannedLeaf::Unresolved(outcome) => return outcome.clone(),
        };
        let mut outcome = self.engine.run(specification);
        if outcome.is_error() {
            return outcome;
        }
        let report_name = specification.report_name();
        match self.writer.write(
            specification.repository_name(),
            &report_name,
            &outcome.rendered_content,
        ) {
            Ok(path) => outcome.report_path = Some(path),
            Err(source) => {
                let err = SpecError::Report {
                    path: self
                        .writer
                        .path_for(specification.repository_name(), &report_name),
                    source,
                };
                tracing::warn!(error = %err, "report could not be written");
                outcome.report_failed(&err);
            }
        }
        outcome
    }

    /// Workers pull leaves from a shared cursor and send outcomes to this
    /// thread, which is the only writer of the result slots.
    fn execute_parallel(&self, leaves: &[PlannedLeaf]) -> Vec<ExecutionOutcome> {
        let workers = self.jobs.min(leaves.len());
        let cursor = AtomicUsize::new(0);
        let mut slots: Vec<Option<ExecutionOutcome>> = vec![None; leaves.len()];
        let (tx, rx) = mpsc::channel::<(usize, ExecutionOutcome)>();

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let cursor = &cursor;
                scope.spawn(move || loop {
                    let index = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(leaf) = leaves.get(index) else {
                        break;
                    };
                    if tx.send((index, self.execute(leaf))).is_err() {
                        break;
                    }
                });
            }
            drop(tx);
            for (index, outcome) in rx {
                slots[index] = Some(outcome);
            }
        });

        slots.into_iter().flatten().collect()
    }
}
