//! Specification sources.
//!
//! A repository resolves test and suite identifiers to leaf specifications and
//! fetches their raw content. Backends are capability implementations of the
//! [`Repository`] trait; the engine never branches on the backend kind.
mod filesystem;
mod remote;
pub mod xmlrpc;

pub use filesystem::FileSystemRepository;
pub use remote::{RemoteRoot, RemoteWikiRepository};

use crate::config::{RepositoryConfig, RepositoryKind};
use crate::report::flatten;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use xmlrpc::{RemoteError, XmlRpcTransport};

/// How a requested identifier is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecMode {
    /// The identifier names one leaf directly.
    SingleTest,
    /// The identifier is a node whose leaves are expanded recursively.
    Suite,
}

/// One child of a repository node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Leaf(String),
    Suite(String),
}

/// Raw specification content as returned by `fetch`.
#[derive(Debug, Clone)]
pub struct Document {
    pub identifier: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("specification not found: {identifier}")]
    NotFound { identifier: String },
    #[error("remote repository call failed for {identifier}: {source}")]
    Remote {
        identifier: String,
        #[source]
        source: RemoteError,
    },
    #[error("read {identifier}: {source}")]
    Io {
        identifier: String,
        #[source]
        source: std::io::Error,
    },
}

impl RepositoryError {
    pub(crate) fn not_found(identifier: &str) -> Self {
        Self::NotFound {
            identifier: identifier.to_string(),
        }
    }
}

/// Uniform retrieval contract over a named content source.
pub trait Repository: Send + Sync {
    /// Run-unique name; reports are keyed by it.
    fn name(&self) -> &str;

    fn kind(&self) -> RepositoryKind;

    /// Fail with `NotFound` unless `identifier` names an existing leaf.
    fn lookup(&self, identifier: &str) -> Result<(), RepositoryError>;

    /// List the direct children of `node`, in a stable order.
    fn entries(&self, node: &str) -> Result<Vec<Entry>, RepositoryError>;

    fn fetch(&self, identifier: &str) -> Result<Document, RepositoryError>;

    /// File name of the report written for `identifier`.
    fn report_name(&self, identifier: &str) -> String {
        flatten(identifier)
    }

    /// Resolve a request to its ordered leaf identifiers.
    fn resolve(&self, identifier: &str, mode: SpecMode) -> Result<Vec<String>, RepositoryError> {
        match mode {
            SpecMode::SingleTest => {
                self.lookup(identifier)?;
                Ok(vec![identifier.to_string()])
            }
            SpecMode::Suite => {
                let mut leaves = Vec::new();
                collect_leaves(self, identifier, &mut leaves)?;
                Ok(leaves)
            }
        }
    }
}

/// Depth-first walk that preserves the order `entries` reports.
pub(crate) fn collect_leaves<R: Repository + ?Sized>(
    repository: &R,
    node: &str,
    leaves: &mut Vec<String>,
) -> Result<(), RepositoryError> {
    for entry in repository.entries(node)? {
        match entry {
            Entry::Leaf(identifier) => leaves.push(identifier),
            Entry::Suite(identifier) => collect_leaves(repository, &identifier, leaves)?,
        }
    }
    Ok(())
}

/// Build a repository from validated configuration.
pub fn open(
    config: &RepositoryConfig,
    base_dir: &Path,
    remote_timeout: Duration,
) -> Result<Arc<dyn Repository>> {
    match config.kind {
        RepositoryKind::FileSystem => {
            let root = base_dir.join(&config.root);
            Ok(Arc::new(FileSystemRepository::new(&config.name, root)))
        }
        RepositoryKind::RemoteWiki => {
            let root = RemoteRoot::parse(&config.root)
                .with_context(|| format!("parse remote root for repository {}", config.name))?;
            let transport = XmlRpcTransport::new(&root.endpoint, remote_timeout);
            Ok(Arc::new(RemoteWikiRepository::new(
                &config.name,
                root,
                config.username.clone().unwrap_or_default(),
                config.password.clone().unwrap_or_default(),
                Box::new(transport),
            )))
        }
    }
}
