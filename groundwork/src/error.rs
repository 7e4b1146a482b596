//! Typed failures for manifest construction and step execution.
//!
//! Every [`StepError`] is terminal for the pipeline run that produced it.

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::{AbortReport, PipelineState};

/// Failure of a single manifest step.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("file missing: {}", .path.display())]
    FileMissing { path: PathBuf },

    #[error("source asset missing: {asset}")]
    FileSourceMissing { asset: String },

    #[error("anchor {anchor} not found in {}", .path.display())]
    AnchorNotFound { path: PathBuf, anchor: String },

    #[error("invalid pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("template {template} failed to render: {message}")]
    TemplateRender { template: String, message: String },

    #[error("command `{command}` failed ({}){}", exit_label(.code), stderr_tail(.stderr))]
    ExternalCommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("provisioning {resource} failed: `{command}` ({}){}", exit_label(.code), stderr_tail(.stderr))]
    ProvisioningFailed {
        resource: String,
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("path {} escapes the scaffold root", .path.display())]
    PathEscape { path: PathBuf },

    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Coarse classification used in abort reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    FileMissing,
    FileSourceMissing,
    AnchorNotFound,
    InvalidPattern,
    TemplateRender,
    ExternalCommandFailed,
    ProvisioningFailed,
    PathEscape,
    Io,
}

impl StepError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StepError::FileMissing { .. } => ErrorKind::FileMissing,
            StepError::FileSourceMissing { .. } => ErrorKind::FileSourceMissing,
            StepError::AnchorNotFound { .. } => ErrorKind::AnchorNotFound,
            StepError::InvalidPattern { .. } => ErrorKind::InvalidPattern,
            StepError::TemplateRender { .. } => ErrorKind::TemplateRender,
            StepError::ExternalCommandFailed { .. } => ErrorKind::ExternalCommandFailed,
            StepError::ProvisioningFailed { .. } => ErrorKind::ProvisioningFailed,
            StepError::PathEscape { .. } => ErrorKind::PathEscape,
            StepError::Io { .. } => ErrorKind::Io,
        }
    }

    /// The path, pattern or command that could not be resolved.
    pub fn subject(&self) -> String {
        match self {
            StepError::FileMissing { path }
            | StepError::PathEscape { path }
            | StepError::Io { path, .. } => path.display().to_string(),
            StepError::AnchorNotFound { path, anchor } => {
                format!("{} @ {anchor}", path.display())
            }
            StepError::FileSourceMissing { asset } => asset.clone(),
            StepError::InvalidPattern { pattern, .. } => pattern.clone(),
            StepError::TemplateRender { template, .. } => template.clone(),
            StepError::ExternalCommandFailed { command, .. }
            | StepError::ProvisioningFailed { command, .. } => command.clone(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StepError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Rejected manifest construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("duplicate step name {name:?}")]
    DuplicateStepName { name: String },

    #[error("step {step:?} requires anchor {tag:?} which no step or scaffold provides")]
    UnsatisfiedAnchor { step: String, tag: String },

    #[error("dependency cycle between steps: {}", .steps.join(", "))]
    DependencyCycle { steps: Vec<String> },
}

/// Failure of a whole pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline is {state}; build a fresh pipeline to run again")]
    AlreadyFinished { state: PipelineState },

    #[error("step {} of {} `{}` failed: {}", .0.position, .0.total, .0.step, .0.error)]
    Aborted(Box<AbortReport>),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal or timeout".to_string(),
    }
}

fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}
