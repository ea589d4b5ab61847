// src/exec/command_backend.rs

//! Production transfer backend driven by shell command templates.
//!
//! Templates come from `[backend]` and may reference:
//! `{source}`, `{dest}`, `{table}`, `{artifact}`, `{src_host}`, `{src_port}`,
//! `{src_user}`, `{src_password}`, `{dst_host}`, `{dst_port}`, `{dst_user}`,
//! `{dst_password}`. `{table}` is empty for whole-database tasks.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use crate::config::{BackendSection, ConfigFile, Connection};
use crate::errors::{BackendError, MirrorError, Result};
use crate::exec::backend::{Artifact, BackendFuture, StageContext, StageReport, TransferBackend};
use crate::exec::process::{CommandOutput, run_shell};
use crate::task::TaskId;

#[derive(Debug, Clone)]
pub struct CommandBackend {
    templates: BackendSection,
    source: Connection,
    destination: Connection,
    /// `artifact_dir/<session>`.
    artifact_root: PathBuf,
    warning_patterns: Vec<Regex>,
}

impl CommandBackend {
    pub fn new(cfg: &ConfigFile, session_id: &str) -> Result<Self> {
        let warning_patterns = cfg
            .backend
            .warning_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    MirrorError::Configuration(format!("invalid warning pattern '{p}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            templates: cfg.backend.clone(),
            source: cfg.source.clone(),
            destination: cfg.destination.clone(),
            artifact_root: cfg.backend.artifact_dir.join(session_id),
            warning_patterns,
        })
    }

    /// Where the artifact for `task` is written.
    pub fn artifact_path(&self, task: &TaskId) -> PathBuf {
        let file = match task.table_name() {
            Some(table) => format!("{}.{}.dump", task.source, table),
            None => format!("{}.dump", task.source),
        };
        self.artifact_root.join(file)
    }

    fn render(
        &self,
        template: &str,
        source: &str,
        task: Option<&TaskId>,
        artifact: Option<&Path>,
    ) -> String {
        let artifact = artifact.map(|p| p.display().to_string()).unwrap_or_default();
        let dest = task.map(|t| t.dest.as_str()).unwrap_or("");
        let table = task.and_then(TaskId::table_name).unwrap_or("");

        template
            .replace("{source}", source)
            .replace("{dest}", dest)
            .replace("{table}", table)
            .replace("{artifact}", &artifact)
            .replace("{src_host}", &self.source.host)
            .replace("{src_port}", &self.source.port.to_string())
            .replace("{src_user}", &self.source.user)
            .replace("{src_password}", self.source.password.as_deref().unwrap_or(""))
            .replace("{dst_host}", &self.destination.host)
            .replace("{dst_port}", &self.destination.port.to_string())
            .replace("{dst_user}", &self.destination.user)
            .replace("{dst_password}", self.destination.password.as_deref().unwrap_or(""))
    }

    fn is_warning(&self, line: &str) -> bool {
        self.warning_patterns.iter().any(|re| re.is_match(line))
    }

    /// Split stderr into (benign warnings, real error lines).
    fn classify_stderr(&self, stderr: &str) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();
        for line in stderr.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if self.is_warning(line) {
                warnings.push(line.to_string());
            } else {
                errors.push(line.to_string());
            }
        }
        (warnings, errors)
    }

    /// Interpret the extract command's result given the artifact size.
    ///
    /// A non-zero exit is still a success when the artifact is non-empty and
    /// every stderr line is a known warning.
    fn classify_extract(
        &self,
        output: &CommandOutput,
        size: u64,
    ) -> std::result::Result<Vec<String>, String> {
        let (warnings, errors) = self.classify_stderr(&output.stderr);

        if output.success {
            return Ok(warnings.into_iter().chain(errors).collect());
        }
        if size > 0 && errors.is_empty() && !warnings.is_empty() {
            return Ok(warnings);
        }
        Err(output.failure_message())
    }

    async fn run_simple(
        &self,
        command: String,
        ctx: &StageContext,
    ) -> std::result::Result<StageReport, BackendError> {
        let output = run_shell(&command, ctx).await?;
        if !output.success {
            return Err(BackendError::Failed(output.failure_message()));
        }
        Ok(StageReport {
            warnings: stderr_lines(&output.stderr),
        })
    }
}

fn stderr_lines(stderr: &str) -> Vec<String> {
    stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// `verify` succeeds when stdout reports something other than nothing or `0`.
fn verify_populated(stdout: &str) -> bool {
    let value = stdout.trim();
    !value.is_empty() && value != "0"
}

impl TransferBackend for CommandBackend {
    fn list_tables<'a>(
        &'a self,
        source: &'a str,
        ctx: StageContext,
    ) -> BackendFuture<'a, Vec<String>> {
        Box::pin(async move {
            let Some(template) = self.templates.list_tables.as_deref() else {
                return Err(BackendError::Failed(
                    "[backend].list_tables is not configured".to_string(),
                ));
            };

            let output = run_shell(&self.render(template, source, None, None), &ctx).await?;
            if !output.success {
                return Err(BackendError::Failed(output.failure_message()));
            }

            Ok(output
                .stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect())
        })
    }

    fn extract<'a>(&'a self, task: &'a TaskId, ctx: StageContext) -> BackendFuture<'a, Artifact> {
        Box::pin(async move {
            let path = self.artifact_path(task);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let command = self.render(
                &self.templates.extract,
                &task.source,
                Some(task),
                Some(&path),
            );
            let output = run_shell(&command, &ctx).await?;
            let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);

            debug!(task = %task, size, code = output.code, "extract command finished");

            let warnings = self
                .classify_extract(&output, size)
                .map_err(BackendError::Failed)?;

            Ok(Artifact {
                path,
                size,
                warnings,
            })
        })
    }

    fn prepare<'a>(
        &'a self,
        task: &'a TaskId,
        ctx: StageContext,
    ) -> BackendFuture<'a, StageReport> {
        Box::pin(async move {
            let command = self.render(&self.templates.prepare, &task.source, Some(task), None);
            self.run_simple(command, &ctx).await
        })
    }

    fn load<'a>(
        &'a self,
        task: &'a TaskId,
        artifact: &'a Artifact,
        ctx: StageContext,
    ) -> BackendFuture<'a, StageReport> {
        Box::pin(async move {
            let command = self.render(
                &self.templates.load,
                &task.source,
                Some(task),
                Some(&artifact.path),
            );
            self.run_simple(command, &ctx).await
        })
    }

    fn verify<'a>(&'a self, task: &'a TaskId, ctx: StageContext) -> BackendFuture<'a, StageReport> {
        Box::pin(async move {
            let command = self.render(&self.templates.verify, &task.source, Some(task), None);
            let output = run_shell(&command, &ctx).await?;

            if !output.success {
                return Err(BackendError::Failed(output.failure_message()));
            }
            if !verify_populated(&output.stdout) {
                return Err(BackendError::Failed(format!(
                    "{} is missing or empty at the destination",
                    task
                )));
            }

            Ok(StageReport {
                warnings: stderr_lines(&output.stderr),
            })
        })
    }
}
