//! Rendering collaborator seam.
//!
//! The runner never interprets specification documents itself. A
//! [`SpecificationRenderer`] executes a document against a system under
//! development and hands back the annotated document plus the overall verdict.
use crate::repository::Document;
use crate::util::truncate_string;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Instant;
use thiserror::Error;

pub const ENV_LOCALE: &str = "SPECRUN_LOCALE";
pub const ENV_SELECTOR: &str = "SPECRUN_SELECTOR";
pub const ENV_SYSTEM_UNDER_DEVELOPMENT: &str = "SPECRUN_SYSTEM_UNDER_DEVELOPMENT";
pub const ENV_SPECIFICATION: &str = "SPECRUN_SPECIFICATION";
/// File the command may fill with JSON assertion counts.
pub const ENV_STATISTICS_FILE: &str = "SPECRUN_STATISTICS_FILE";

/// Exit status a render command uses to report failed assertions.
pub const ASSERTION_FAILURE_EXIT_CODE: i32 = 1;

const MAX_STDERR_DETAIL_BYTES: usize = 2048;

/// Binding between executed specification tables and the target system.
///
/// The runner only passes it through to the renderer.
pub trait SystemUnderDevelopment: Send + Sync {
    fn name(&self) -> &str;
}

/// Adapter known only by its configured name.
#[derive(Debug, Clone)]
pub struct NamedSystemUnderDevelopment {
    name: String,
}

impl NamedSystemUnderDevelopment {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl SystemUnderDevelopment for NamedSystemUnderDevelopment {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Everything besides the document that a render needs.
pub struct RenderContext<'a> {
    pub system_under_development: &'a dyn SystemUnderDevelopment,
    pub locale: &'a str,
    pub selector: Option<&'a str>,
}

/// Per-document assertion counts, when the renderer reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Statistics {
    pub right: usize,
    pub wrong: usize,
    pub exceptions: usize,
    pub ignored: usize,
}

impl Statistics {
    pub fn add(&mut self, other: &Statistics) {
        self.right += other.right;
        self.wrong += other.wrong;
        self.exceptions += other.exceptions;
        self.ignored += other.ignored;
    }
}

#[derive(Debug, Clone)]
pub struct Rendered {
    pub content: Vec<u8>,
    pub passed: bool,
    pub statistics: Option<Statistics>,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("spawn render command {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("render command failed with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },
    #[error("create render statistics file: {source}")]
    StatisticsFile {
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Engine(String),
}

pub trait SpecificationRenderer: Send + Sync {
    fn render(&self, document: &Document, context: &RenderContext<'_>)
        -> Result<Rendered, RenderError>;
}

/// Delegates rendering to an external command.
///
/// The document goes to stdin and the rendered document is read from stdout.
/// Exit status 0 means every assertion passed, 1 means at least one failed,
/// and anything else is a render error. Assertion counts are optional: the
/// command may write them as JSON to the file named by
/// `SPECRUN_STATISTICS_FILE`.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    argv: Vec<String>,
}

impl CommandRenderer {
    pub fn from_command_line(command: &str) -> anyhow::Result<Self> {
        let argv = shell_words::split(command)
            .map_err(|err| anyhow::anyhow!("parse render command {command:?}: {err}"))?;
        if argv.is_empty() {
            return Err(anyhow::anyhow!("render command is empty"));
        }
        Ok(Self { argv })
    }
}

impl SpecificationRenderer for CommandRenderer {
    fn render(
        &self,
        document: &Document,
        context: &RenderContext<'_>,
    ) -> Result<Rendered, RenderError> {
        let program = &self.argv[0];
        let statistics_file =
            tempfile::NamedTempFile::new().map_err(|source| RenderError::StatisticsFile { source })?;
        let mut command = Command::new(program);
        command
            .args(&self.argv[1..])
            .env(ENV_LOCALE, context.locale)
            .env(
                ENV_SYSTEM_UNDER_DEVELOPMENT,
                context.system_under_development.name(),
            )
            .env(ENV_SPECIFICATION, &document.identifier)
            .env(ENV_STATISTICS_FILE, statistics_file.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(selector) = context.selector {
            command.env(ENV_SELECTOR, selector);
        }

        let start = Instant::now();
        let mut child = command.spawn().map_err(|source| RenderError::Spawn {
            program: program.clone(),
            source,
        })?;
        // stdin is fed while stdout drains; large documents fill both pipes.
        let stdin = child.stdin.take();
        let content = document.content.clone();
        let feeder = thread::spawn(move || match stdin {
            Some(mut stdin) => stdin.write_all(&content),
            None => Ok(()),
        });
        let output = child
            .wait_with_output()
            .map_err(|source| RenderError::Spawn {
                program: program.clone(),
                source,
            })?;
        // A command that exits without reading its input closes the pipe;
        // its exit status is still the verdict.
        if let Ok(Err(err)) = feeder.join() {
            tracing::debug!(error = %err, "render command closed stdin early");
        }

        tracing::debug!(
            specification = %document.identifier,
            elapsed_ms = start.elapsed().as_millis() as u64,
            rendered_bytes = output.stdout.len(),
            "render command complete"
        );

        let passed = match output.status.code() {
            Some(0) => true,
            Some(ASSERTION_FAILURE_EXIT_CODE) => false,
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(RenderError::CommandFailed {
                    status: output.status.to_string(),
                    stderr: truncate_string(stderr.trim(), MAX_STDERR_DETAIL_BYTES),
                });
            }
        };
        Ok(Rendered {
            content: output.stdout,
            passed,
            statistics: read_statistics(statistics_file.path(), &document.identifier),
        })
    }
}

/// An untouched file means the command reports no counts. Unreadable counts
/// are logged and dropped; the exit status stays the verdict.
fn read_statistics(path: &Path, identifier: &str) -> Option<Statistics> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(specification = identifier, error = %err, "read render statistics");
            return None;
        }
    };
    if text.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(&text) {
        Ok(statistics) => Some(statistics),
        Err(err) => {
            tracing::warn!(
                specification = identifier,
                error = %err,
                "ignoring malformed render statistics"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn find_in_path(name: &str) -> Option<PathBuf> {
        let path_var = std::env::var_os("PATH")?;
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    fn document(content: &str) -> Document {
        Document {
            identifier: "right.html".to_string(),
            content: content.as_bytes().to_vec(),
        }
    }

    fn render_with(command: &str, content: &str) -> Result<Rendered, RenderError> {
        let sud = NamedSystemUnderDevelopment::new("guice");
        let context = RenderContext {
            system_under_development: &sud,
            locale: "en",
            selector: Some("custom.Selector"),
        };
        CommandRenderer::from_command_line(command)
            .expect("parse command")
            .render(&document(content), &context)
    }

    #[test]
    fn rejects_empty_commands() {
        assert!(CommandRenderer::from_command_line("   ").is_err());
        assert!(CommandRenderer::from_command_line("'unterminated").is_err());
    }

    #[test]
    fn exit_status_maps_to_verdict() {
        if find_in_path("sh").is_none() {
            return;
        }
        let passed = render_with("sh -c 'cat'", "<p>ok</p>").expect("render");
        assert!(passed.passed);
        assert_eq!(passed.content, b"<p>ok</p>");

        let failed = render_with("sh -c 'cat; exit 1'", "<p>bad</p>").expect("render");
        assert!(!failed.passed);
        assert_eq!(failed.content, b"<p>bad</p>");

        let err = render_with("sh -c 'echo boom >&2; exit 3'", "").unwrap_err();
        match err {
            RenderError::CommandFailed { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn context_is_exported_to_the_command() {
        if find_in_path("sh").is_none() {
            return;
        }
        let rendered = render_with(
            "sh -c 'echo \"$SPECRUN_LOCALE $SPECRUN_SELECTOR $SPECRUN_SYSTEM_UNDER_DEVELOPMENT $SPECRUN_SPECIFICATION\"'",
            "",
        )
        .expect("render");
        assert_eq!(
            String::from_utf8_lossy(&rendered.content).trim(),
            "en custom.Selector guice right.html"
        );
    }

    #[test]
    fn statistics_file_counts_are_returned() {
        if find_in_path("sh").is_none() {
            return;
        }
        let rendered = render_with(
            "sh -c 'cat; printf \"{\\\"right\\\": 3, \\\"wrong\\\": 1}\" > \"$SPECRUN_STATISTICS_FILE\"; exit 1'",
            "<p>mixed</p>",
        )
        .expect("render");
        assert!(!rendered.passed);
        assert_eq!(
            rendered.statistics,
            Some(Statistics {
                right: 3,
                wrong: 1,
                ..Statistics::default()
            })
        );
    }

    #[test]
    fn absent_or_malformed_statistics_are_none() {
        if find_in_path("sh").is_none() {
            return;
        }
        let silent = render_with("sh -c 'cat'", "<p>ok</p>").expect("render");
        assert_eq!(silent.statistics, None);
        let garbled = render_with(
            "sh -c 'echo nonsense > \"$SPECRUN_STATISTICS_FILE\"'",
            "",
        )
        .expect("render");
        assert!(garbled.passed);
        assert_eq!(garbled.statistics, None);
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = render_with("definitely-not-a-real-renderer-binary", "").unwrap_err();
        assert!(matches!(err, RenderError::Spawn { .. }));
    }
}
