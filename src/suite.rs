//! Suite expansion.
//!
//! Turns each requested test or suite into the flat, ordered list of leaf
//! specifications the engine executes.
use crate::repository::{Repository, RepositoryError, SpecMode};
use std::fmt;
use std::sync::Arc;

/// One requested identifier inside a repository.
#[derive(Clone)]
pub struct SpecRequest {
    pub repository: Arc<dyn Repository>,
    pub identifier: String,
    pub mode: SpecMode,
}

impl SpecRequest {
    pub fn single(repository: Arc<dyn Repository>, identifier: &str) -> Self {
        Self {
            repository,
            identifier: identifier.to_string(),
            mode: SpecMode::SingleTest,
        }
    }

    pub fn suite(repository: Arc<dyn Repository>, identifier: &str) -> Self {
        Self {
            repository,
            identifier: identifier.to_string(),
            mode: SpecMode::Suite,
        }
    }
}

impl fmt::Debug for SpecRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecRequest")
            .field("repository", &self.repository.name())
            .field("identifier", &self.identifier)
            .field("mode", &self.mode)
            .finish()
    }
}

/// A runnable leaf. Content is fetched only when the engine runs it.
#[derive(Clone)]
pub struct Specification {
    pub repository: Arc<dyn Repository>,
    pub identifier: String,
}

impl Specification {
    pub fn new(repository: Arc<dyn Repository>, identifier: &str) -> Self {
        Self {
            repository,
            identifier: identifier.to_string(),
        }
    }

    pub fn repository_name(&self) -> &str {
        self.repository.name()
    }

    pub fn report_name(&self) -> String {
        self.repository.report_name(&self.identifier)
    }
}

impl fmt::Debug for Specification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Specification")
            .field("repository", &self.repository.name())
            .field("identifier", &self.identifier)
            .finish()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SuiteExpander;

impl SuiteExpander {
    /// Expand a request into leaves in repository order.
    ///
    /// SingleTest requests are the identity: absence surfaces when the leaf is
    /// fetched, not here.
    pub fn expand(&self, request: &SpecRequest) -> Result<Vec<Specification>, RepositoryError> {
        let leaves = match request.mode {
            SpecMode::SingleTest => vec![request.identifier.clone()],
            SpecMode::Suite => request
                .repository
                .resolve(&request.identifier, SpecMode::Suite)?,
        };
        tracing::debug!(
            repository = request.repository.name(),
            identifier = %request.identifier,
            mode = ?request.mode,
            leaves = leaves.len(),
            "expanded request"
        );
        Ok(leaves
            .iter()
            .map(|leaf| Specification::new(Arc::clone(&request.repository), leaf))
            .collect())
    }
}
