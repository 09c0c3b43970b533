//! Per-leaf execution.
//!
//! One fetch and one render per specification. Every failure is captured in
//! the returned [`ExecutionOutcome`]; nothing unwinds past a single leaf.
use crate::render::{RenderContext, RenderError, SpecificationRenderer, Statistics, SystemUnderDevelopment};
use crate::repository::RepositoryError;
use crate::suite::Specification;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Passed,
    Failed,
    ExecutionError,
}

/// Why a leaf could not be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Remote,
    Render,
    Io,
}

#[derive(Debug, Error)]
pub enum SpecError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("write report {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SpecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpecError::Repository(RepositoryError::NotFound { .. }) => ErrorKind::NotFound,
            SpecError::Repository(RepositoryError::Remote { .. }) => ErrorKind::Remote,
            SpecError::Repository(RepositoryError::Io { .. }) => ErrorKind::Io,
            SpecError::Render(_) => ErrorKind::Render,
            SpecError::Report { .. } => ErrorKind::Io,
        }
    }
}

/// Result of running one leaf.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub repository: String,
    pub identifier: String,
    pub status: OutcomeStatus,
    #[serde(skip)]
    pub rendered_content: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Statistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
    pub duration_ms: u64,
}

impl ExecutionOutcome {
    /// An outcome for a leaf (or unexpandable suite) that could not run.
    pub fn execution_error(repository: &str, identifier: &str, error: &SpecError) -> Self {
        Self {
            repository: repository.to_string(),
            identifier: identifier.to_string(),
            status: OutcomeStatus::ExecutionError,
            rendered_content: Vec::new(),
            error_kind: Some(error.kind()),
            error_detail: Some(error.to_string()),
            statistics: None,
            report_path: None,
            duration_ms: 0,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == OutcomeStatus::ExecutionError
    }

    /// Demote a rendered outcome whose report could not be persisted.
    pub(crate) fn report_failed(&mut self, error: &SpecError) {
        self.status = OutcomeStatus::ExecutionError;
        self.error_kind = Some(error.kind());
        self.error_detail = Some(error.to_string());
        self.report_path = None;
    }
}

/// Runs specifications against one system under development.
pub struct ExecutionEngine {
    renderer: Arc<dyn SpecificationRenderer>,
    system_under_development: Arc<dyn SystemUnderDevelopment>,
    locale: String,
    selector: Option<String>,
}

impl ExecutionEngine {
    pub fn new(
        renderer: Arc<dyn SpecificationRenderer>,
        system_under_development: Arc<dyn SystemUnderDevelopment>,
        locale: &str,
        selector: Option<&str>,
    ) -> Self {
        Self {
            renderer,
            system_under_development,
            locale: locale.to_string(),
            selector: selector.map(str::to_string),
        }
    }

    pub fn run(&self, specification: &Specification) -> ExecutionOutcome {
        let repository = specification.repository_name();
        let identifier = specification.identifier.as_str();
        let start = Instant::now();
        tracing::info!(repository, identifier, "running specification");

        let result = self.fetch_and_render(specification);
        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(rendered) => {
                let status = if rendered.passed {
                    OutcomeStatus::Passed
                } else {
                    OutcomeStatus::Failed
                };
                tracing::info!(repository, identifier, ?status, duration_ms, "specification finished");
                ExecutionOutcome {
                    repository: repository.to_string(),
                    identifier: identifier.to_string(),
                    status,
                    rendered_content: rendered.content,
                    error_kind: None,
                    error_detail: None,
                    statistics: rendered.statistics,
                    report_path: None,
                    duration_ms,
                }
            }
            Err(err) => {
                tracing::warn!(repository, identifier, error = %err, "specification could not be executed");
                let mut outcome = ExecutionOutcome::execution_error(repository, identifier, &err);
                outcome.duration_ms = duration_ms;
                outcome
            }
        }
    }

    fn fetch_and_render(
        &self,
        specification: &Specification,
    ) -> Result<crate::render::Rendered, SpecError> {
        let document = specification
            .repository
            .fetch(&specification.identifier)?;
        let context = RenderContext {
            system_under_development: self.system_under_development.as_ref(),
            locale: &self.locale,
            selector: self.selector.as_deref(),
        };
        Ok(self.renderer.render(&document, &context)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryKind;
    use crate::render::{NamedSystemUnderDevelopment, Rendered};
    use crate::repository::{Document, Entry, Repository};
    use std::collections::BTreeMap;

    struct MapRepository {
        docs: BTreeMap<&'static str, &'static str>,
    }

    impl Repository for MapRepository {
        fn name(&self) -> &str {
            "map"
        }

        fn kind(&self) -> RepositoryKind {
            RepositoryKind::FileSystem
        }

        fn lookup(&self, identifier: &str) -> Result<(), RepositoryError> {
            self.docs
                .get(identifier)
                .map(|_| ())
                .ok_or_else(|| RepositoryError::not_found(identifier))
        }

        fn entries(&self, _node: &str) -> Result<Vec<Entry>, RepositoryError> {
            Ok(self.docs.keys().map(|key| Entry::Leaf(key.to_string())).collect())
        }

        fn fetch(&self, identifier: &str) -> Result<Document, RepositoryError> {
            let content = self
                .docs
                .get(identifier)
                .ok_or_else(|| RepositoryError::not_found(identifier))?;
            Ok(Document {
                identifier: identifier.to_string(),
                content: content.as_bytes().to_vec(),
            })
        }
    }

    /// Passes documents containing "ok", fails "bad", raises on "boom".
    struct KeywordRenderer;

    impl SpecificationRenderer for KeywordRenderer {
        fn render(
            &self,
            document: &Document,
            context: &RenderContext<'_>,
        ) -> Result<Rendered, RenderError> {
            let text = String::from_utf8_lossy(&document.content);
            if text.contains("boom") {
                return Err(RenderError::Engine("fixture exploded".to_string()));
            }
            Ok(Rendered {
                content: format!("{text} [{}]", context.system_under_development.name()).into_bytes(),
                passed: text.contains("ok"),
                statistics: None,
            })
        }
    }

    fn engine() -> ExecutionEngine {
        ExecutionEngine::new(
            Arc::new(KeywordRenderer),
            Arc::new(NamedSystemUnderDevelopment::new("sud")),
            "en",
            None,
        )
    }

    fn spec(identifier: &str) -> Specification {
        let mut docs = BTreeMap::new();
        docs.insert("right.html", "ok");
        docs.insert("wrong.html", "bad");
        docs.insert("broken.html", "boom");
        Specification::new(Arc::new(MapRepository { docs }), identifier)
    }

    #[test]
    fn passing_render_is_passed_with_content() {
        let outcome = engine().run(&spec("right.html"));
        assert_eq!(outcome.status, OutcomeStatus::Passed);
        assert_eq!(outcome.rendered_content, b"ok [sud]");
        assert!(outcome.error_detail.is_none());
    }

    #[test]
    fn failing_render_is_failed_not_error() {
        let outcome = engine().run(&spec("wrong.html"));
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert!(!outcome.rendered_content.is_empty());
    }

    #[test]
    fn missing_document_is_not_found_error() {
        let outcome = engine().run(&spec("no_such_file.html"));
        assert_eq!(outcome.status, OutcomeStatus::ExecutionError);
        assert_eq!(outcome.error_kind, Some(ErrorKind::NotFound));
        assert!(outcome
            .error_detail
            .as_deref()
            .unwrap_or_default()
            .contains("no_such_file.html"));
        assert!(outcome.rendered_content.is_empty());
    }

    #[test]
    fn renderer_errors_are_captured() {
        let outcome = engine().run(&spec("broken.html"));
        assert_eq!(outcome.status, OutcomeStatus::ExecutionError);
        assert_eq!(outcome.error_kind, Some(ErrorKind::Render));
        assert!(outcome
            .error_detail
            .as_deref()
            .unwrap_or_default()
            .contains("fixture exploded"));
    }
}
