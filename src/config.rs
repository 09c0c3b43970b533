//! Run configuration.
//!
//! The config file is the validated contract between the caller and the
//! runner: which repositories exist, what to run in each, and where reports go.
//! Relative paths resolve against the directory holding the config file.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::repository::RemoteRoot;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_REPORTS_DIRECTORY: &str = "target/spec-reports";
pub const DEFAULT_LOCALE: &str = "en";
pub const DEFAULT_SYSTEM_UNDER_DEVELOPMENT: &str = "default";
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 30_000;
pub const RENDER_COMMAND_ENV: &str = "SPECRUN_RENDER_COMMAND";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryKind {
    FileSystem,
    RemoteWiki,
}

/// One repository and the tests and suites requested from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RepositoryKind,
    pub root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub tests: Vec<String>,
    #[serde(default)]
    pub suites: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RendererConfig {
    /// Command line parsed with shell-words; see `render::CommandRenderer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub schema_version: u32,
    #[serde(default = "default_reports_directory")]
    pub reports_directory: PathBuf,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default = "default_system_under_development")]
    pub system_under_development: String,
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    #[serde(default = "default_remote_timeout_ms")]
    pub remote_timeout_ms: u64,
    /// Report test failures without failing the build.
    #[serde(default)]
    pub test_failure_ignore: bool,
    pub repositories: Vec<RepositoryConfig>,
}

fn default_reports_directory() -> PathBuf {
    PathBuf::from(DEFAULT_REPORTS_DIRECTORY)
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

fn default_system_under_development() -> String {
    DEFAULT_SYSTEM_UNDER_DEVELOPMENT.to_string()
}

fn default_jobs() -> usize {
    1
}

fn default_remote_timeout_ms() -> u64 {
    DEFAULT_REMOTE_TIMEOUT_MS
}

impl RunConfig {
    /// An empty config with every default applied.
    pub fn new(repositories: Vec<RepositoryConfig>) -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            reports_directory: default_reports_directory(),
            locale: default_locale(),
            selector: None,
            system_under_development: default_system_under_development(),
            renderer: RendererConfig::default(),
            jobs: default_jobs(),
            remote_timeout_ms: default_remote_timeout_ms(),
            test_failure_ignore: false,
            repositories,
        }
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

/// A loaded config together with the directory relative paths resolve from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: RunConfig,
    pub base_dir: PathBuf,
}

impl LoadedConfig {
    pub fn reports_root(&self) -> PathBuf {
        self.base_dir.join(&self.config.reports_directory)
    }
}

/// Read, parse and validate a config file.
pub fn load_config(path: &Path) -> Result<LoadedConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: RunConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse run config JSON {}", path.display()))?;
    validate_config(&config)?;
    let base_dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(LoadedConfig { config, base_dir })
}

/// Render a pretty JSON config stub.
pub fn config_stub() -> Result<String> {
    let mut config = RunConfig::new(vec![RepositoryConfig {
        name: "specs".to_string(),
        kind: RepositoryKind::FileSystem,
        root: "specs".to_string(),
        username: None,
        password: None,
        tests: Vec::new(),
        suites: vec!["/".to_string()],
    }]);
    config.renderer.command = Some("render-spec".to_string());
    serde_json::to_string_pretty(&config).context("serialize config stub")
}

pub fn validate_config(config: &RunConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported run config schema_version {}",
            config.schema_version
        ));
    }
    if config.jobs == 0 {
        return Err(anyhow!("jobs must be at least 1"));
    }
    if config.remote_timeout_ms == 0 {
        return Err(anyhow!("remote_timeout_ms must be greater than zero"));
    }
    if config.locale.trim().is_empty() {
        return Err(anyhow!("locale must be non-empty"));
    }
    if config.system_under_development.trim().is_empty() {
        return Err(anyhow!("system_under_development must be non-empty"));
    }
    let mut names = BTreeSet::new();
    for repository in &config.repositories {
        validate_repository_name(&repository.name)?;
        if !names.insert(repository.name.as_str()) {
            return Err(anyhow!("duplicate repository name {:?}", repository.name));
        }
        if repository.root.trim().is_empty() {
            return Err(anyhow!("repository {} has an empty root", repository.name));
        }
        if repository.kind == RepositoryKind::RemoteWiki {
            RemoteRoot::parse(&repository.root)
                .with_context(|| format!("repository {}", repository.name))?;
        }
        if repository.tests.iter().any(|test| test.trim().is_empty()) {
            return Err(anyhow!("repository {} has an empty test name", repository.name));
        }
    }
    Ok(())
}

/// Names become report directories, so they must be a single path component.
fn validate_repository_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(anyhow!("repository name must be non-empty"));
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(anyhow!(
            "repository name {name:?} must be a single path component"
        ));
    }
    Ok(())
}

/// Pick the renderer command: flag, then config, then environment.
pub fn resolve_render_command(flag: Option<&str>, config: &RunConfig) -> Option<String> {
    flag.map(str::to_string)
        .or_else(|| config.renderer.command.clone())
        .or_else(|| env::var(RENDER_COMMAND_ENV).ok())
        .filter(|command| !command.trim().is_empty())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
