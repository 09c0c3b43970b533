//! Report persistence.
//!
//! Every executed leaf gets one report at
//! `{reports_root}/{repository}/{report_name}`. The path depends only on the
//! repository and the identifier, so reruns overwrite in place and concurrent
//! leaves never share a file.
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const SUMMARY_FILE_NAME: &str = "summary.json";

/// Map an identifier to a single filesystem-safe file name.
///
/// Separators and reserved characters are percent-escaped (and `%` itself),
/// so distinct identifiers never share a name. A leading `/` is dropped:
/// `"/a.html"` and `"a.html"` name the same document.
pub fn flatten(identifier: &str) -> String {
    let trimmed = identifier.trim_start_matches('/');
    if trimmed.is_empty() {
        return "%2F".to_string();
    }
    if trimmed == "." || trimmed == ".." {
        return trimmed.replace('.', "%2E");
    }
    let mut out = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        match ch {
            '%' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => {
                out.push_str(&format!("%{:02X}", ch as u32));
            }
            ch if ch.is_control() => {
                let mut buf = [0u8; 4];
                for byte in ch.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("%{byte:02X}"));
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Writes reports under a fixed root.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    root: PathBuf,
}

impl ReportWriter {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, repository: &str, report_name: &str) -> PathBuf {
        self.root.join(repository).join(report_name)
    }

    /// Write `content` as the report for a leaf and return its path.
    pub fn write(&self, repository: &str, report_name: &str, content: &[u8]) -> io::Result<PathBuf> {
        let path = self.path_for(repository, report_name);
        write_atomic(&path, content)?;
        tracing::debug!(path = %path.display(), bytes = content.len(), "report written");
        Ok(path)
    }

    pub fn write_summary<T: Serialize>(&self, summary: &T) -> anyhow::Result<PathBuf> {
        let path = self.root.join(SUMMARY_FILE_NAME);
        let bytes = serde_json::to_vec_pretty(summary)?;
        write_atomic(&path, &bytes)?;
        Ok(path)
    }
}

/// Write through a uniquely named sibling temp file and rename into place.
fn write_atomic(dest: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let mut staged = tempfile::NamedTempFile::new_in(parent)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged.persist(dest).map_err(|err| err.error)?;
    Ok(())
}
