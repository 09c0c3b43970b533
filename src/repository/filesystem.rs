use super::{Document, Entry, Repository, RepositoryError};
use crate::config::RepositoryKind;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const SPECIFICATION_EXTENSIONS: &[&str] = &["html", "htm"];

/// Specifications stored as files under a local directory.
///
/// Identifiers are `/`-separated paths relative to the root; a leading `/`
/// is ignored so `"/"` names the root itself.
#[derive(Debug, Clone)]
pub struct FileSystemRepository {
    name: String,
    root: PathBuf,
}

impl FileSystemRepository {
    pub fn new(name: &str, root: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, identifier: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in identifier.split('/').filter(|part| !part.is_empty()) {
            path.push(part);
        }
        path
    }
}

impl Repository for FileSystemRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> RepositoryKind {
        RepositoryKind::FileSystem
    }

    fn lookup(&self, identifier: &str) -> Result<(), RepositoryError> {
        if self.path_for(identifier).is_file() {
            Ok(())
        } else {
            Err(RepositoryError::not_found(identifier))
        }
    }

    fn entries(&self, node: &str) -> Result<Vec<Entry>, RepositoryError> {
        let dir = self.path_for(node);
        if !dir.is_dir() {
            return Err(RepositoryError::not_found(node));
        }
        let read_dir = fs::read_dir(&dir).map_err(|source| RepositoryError::Io {
            identifier: node.to_string(),
            source,
        })?;
        let prefix = node.trim_matches('/');
        let mut children = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|source| RepositoryError::Io {
                identifier: node.to_string(),
                source,
            })?;
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!(path = %entry.path().display(), "skipping non UTF-8 entry");
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }
            let path = entry.path();
            let identifier = if prefix.is_empty() {
                file_name.clone()
            } else {
                format!("{prefix}/{file_name}")
            };
            if path.is_dir() {
                children.push((format!("{file_name}/"), Entry::Suite(identifier)));
            } else if path.is_file() && is_specification(&path) {
                children.push((file_name, Entry::Leaf(identifier)));
            }
        }
        // Directory keys carry their trailing `/` so siblings sort in full
        // path order and each subtree stays contiguous.
        children.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(children.into_iter().map(|(_, entry)| entry).collect())
    }

    fn fetch(&self, identifier: &str) -> Result<Document, RepositoryError> {
        let path = self.path_for(identifier);
        match fs::read(&path) {
            Ok(content) => Ok(Document {
                identifier: identifier.to_string(),
                content,
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(RepositoryError::not_found(identifier))
            }
            // Directories read as an error on most platforms; treat them as
            // absent leaves rather than I/O faults.
            Err(_) if path.is_dir() => Err(RepositoryError::not_found(identifier)),
            Err(source) => Err(RepositoryError::Io {
                identifier: identifier.to_string(),
                source,
            }),
        }
    }
}

fn is_specification(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SPECIFICATION_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
