//! Run aggregation and the build decision.
use crate::engine::{ExecutionOutcome, OutcomeStatus};
use crate::render::Statistics;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub const SUMMARY_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
}

impl Totals {
    pub fn executed(&self) -> usize {
        self.passed + self.failed + self.errored
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildDecision {
    Success,
    /// Every leaf ran; at least one assertion failed.
    TestFailure,
    /// At least one leaf (or suite) could not be run at all.
    ExecutionFailure,
}

impl BuildDecision {
    /// Errors dominate assertion failures; an empty run is a success.
    pub fn from_totals(totals: &Totals) -> Self {
        if totals.errored > 0 {
            BuildDecision::ExecutionFailure
        } else if totals.failed > 0 {
            BuildDecision::TestFailure
        } else {
            BuildDecision::Success
        }
    }
}

impl fmt::Display for BuildDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BuildDecision::Success => "success",
            BuildDecision::TestFailure => "test failure",
            BuildDecision::ExecutionFailure => "execution failure",
        };
        f.write_str(label)
    }
}

/// Mutable accumulator owned by one run.
#[derive(Debug, Default)]
pub struct RunResult {
    totals: Totals,
    outcomes: Vec<ExecutionOutcome>,
}

impl RunResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: ExecutionOutcome) {
        match outcome.status {
            OutcomeStatus::Passed => self.totals.passed += 1,
            OutcomeStatus::Failed => self.totals.failed += 1,
            OutcomeStatus::ExecutionError => self.totals.errored += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    /// Freeze the run; the summary is the only input to the decision.
    pub fn finalize(self) -> RunSummary {
        let decision = BuildDecision::from_totals(&self.totals);
        let mut statistics: Option<Statistics> = None;
        for outcome in &self.outcomes {
            if let Some(stats) = &outcome.statistics {
                statistics.get_or_insert_with(Statistics::default).add(stats);
            }
        }
        RunSummary {
            schema_version: SUMMARY_SCHEMA_VERSION,
            generated_at_epoch_ms: crate::util::now_epoch_ms(),
            decision,
            totals: self.totals,
            statistics,
            outcomes: self.outcomes,
        }
    }
}

/// Finalized, immutable view of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub schema_version: u32,
    pub generated_at_epoch_ms: u128,
    pub decision: BuildDecision,
    pub totals: Totals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Statistics>,
    pub outcomes: Vec<ExecutionOutcome>,
}

impl RunSummary {
    pub fn report_paths(&self) -> Vec<PathBuf> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.report_path.clone())
            .collect()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ExecutionOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.is_error())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExecutionOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == OutcomeStatus::Failed)
    }

    /// Convert the decision into caller-visible control flow.
    pub fn into_result(self) -> Result<RunSummary, RunFailure> {
        match self.decision {
            BuildDecision::Success => Ok(self),
            BuildDecision::TestFailure => Err(RunFailure::TestFailure(Box::new(self))),
            BuildDecision::ExecutionFailure => Err(RunFailure::ExecutionFailure(Box::new(self))),
        }
    }
}

/// A run that did not succeed. The two variants are distinct build failures.
#[derive(Debug, Error)]
pub enum RunFailure {
    #[error("{}", test_failure_message(.0))]
    TestFailure(Box<RunSummary>),
    #[error("{}", execution_failure_message(.0))]
    ExecutionFailure(Box<RunSummary>),
}

fn test_failure_message(summary: &RunSummary) -> String {
    format!(
        "{} of {} specifications failed",
        summary.totals.failed,
        summary.totals.executed()
    )
}

fn execution_failure_message(summary: &RunSummary) -> String {
    format!(
        "{} of {} specifications could not be executed",
        summary.totals.errored,
        summary.totals.executed()
    )
}

impl RunFailure {
    pub fn summary(&self) -> &RunSummary {
        match self {
            RunFailure::TestFailure(summary) | RunFailure::ExecutionFailure(summary) => summary,
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            RunFailure::TestFailure(_) => 1,
            RunFailure::ExecutionFailure(_) => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(identifier: &str, status: OutcomeStatus) -> ExecutionOutcome {
        ExecutionOutcome {
            repository: "repo".to_string(),
            identifier: identifier.to_string(),
            status,
            rendered_content: Vec::new(),
            error_kind: None,
            error_detail: None,
            statistics: None,
            report_path: None,
            duration_ms: 0,
        }
    }

    fn summary_of(statuses: &[OutcomeStatus]) -> RunSummary {
        let mut run = RunResult::new();
        for (index, status) in statuses.iter().enumerate() {
            run.record(outcome(&format!("spec-{index}"), *status));
        }
        run.finalize()
    }

    #[test]
    fn empty_run_is_success() {
        let summary = summary_of(&[]);
        assert_eq!(summary.decision, BuildDecision::Success);
        assert_eq!(summary.totals, Totals::default());
        assert!(summary.into_result().is_ok());
    }

    #[test]
    fn all_passed_is_success() {
        let summary = summary_of(&[OutcomeStatus::Passed, OutcomeStatus::Passed]);
        assert_eq!(summary.decision, BuildDecision::Success);
        assert_eq!(summary.totals.passed, 2);
    }

    #[test]
    fn failures_without_errors_are_test_failure() {
        let summary = summary_of(&[OutcomeStatus::Passed, OutcomeStatus::Failed]);
        assert_eq!(summary.decision, BuildDecision::TestFailure);
        let failure = summary.into_result().unwrap_err();
        assert!(matches!(failure, RunFailure::TestFailure(_)));
        assert_eq!(failure.exit_code(), 1);
        assert_eq!(failure.to_string(), "1 of 2 specifications failed");
    }

    #[test]
    fn errors_dominate_failures() {
        let summary = summary_of(&[
            OutcomeStatus::Failed,
            OutcomeStatus::ExecutionError,
            OutcomeStatus::Passed,
        ]);
        assert_eq!(summary.decision, BuildDecision::ExecutionFailure);
        assert_eq!(summary.totals.failed, 1);
        assert_eq!(summary.totals.errored, 1);
        let failure = summary.into_result().unwrap_err();
        assert!(matches!(failure, RunFailure::ExecutionFailure(_)));
        assert_eq!(failure.exit_code(), 2);
        assert_eq!(failure.summary().failures().count(), 1);
    }

    #[test]
    fn outcomes_keep_arrival_order() {
        let summary = summary_of(&[
            OutcomeStatus::Failed,
            OutcomeStatus::Passed,
            OutcomeStatus::ExecutionError,
        ]);
        let ids: Vec<&str> = summary
            .outcomes
            .iter()
            .map(|outcome| outcome.identifier.as_str())
            .collect();
        assert_eq!(ids, vec!["spec-0", "spec-1", "spec-2"]);
    }

    #[test]
    fn statistics_are_summed_when_reported() {
        let mut run = RunResult::new();
        let mut first = outcome("a", OutcomeStatus::Passed);
        first.statistics = Some(Statistics {
            right: 3,
            ..Statistics::default()
        });
        let mut second = outcome("b", OutcomeStatus::Failed);
        second.statistics = Some(Statistics {
            right: 1,
            wrong: 2,
            ..Statistics::default()
        });
        run.record(first);
        run.record(second);
        run.record(outcome("c", OutcomeStatus::Passed));
        let summary = run.finalize();
        assert_eq!(
            summary.statistics,
            Some(Statistics {
                right: 4,
                wrong: 2,
                exceptions: 0,
                ignored: 0
            })
        );
    }
}
