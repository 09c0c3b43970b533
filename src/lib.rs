//! Executable specification runner.
//!
//! Specifications live in [`repository`] backends, are expanded into leaves by
//! [`suite`], executed one leaf at a time by [`engine`], persisted by
//! [`report`], and folded into a build decision by [`result`]. [`runner`]
//! wires the pipeline together for one run.
pub mod config;
pub mod engine;
pub mod render;
pub mod report;
pub mod repository;
pub mod result;
pub mod runner;
pub mod suite;
pub mod util;

pub use engine::{ErrorKind, ExecutionEngine, ExecutionOutcome, OutcomeStatus, SpecError};
pub use repository::{Document, Entry, Repository, RepositoryError, SpecMode};
pub use result::{BuildDecision, RunFailure, RunResult, RunSummary, Totals};
pub use runner::{plan_leaves, requests_from_config, PlannedLeaf, Runner};
pub use suite::{SpecRequest, Specification, SuiteExpander};
