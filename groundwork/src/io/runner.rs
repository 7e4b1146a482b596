//! Command runner abstraction for external tools.
//!
//! The [`CommandRunner`] trait decouples the pipeline and hosting adapter from
//! real subprocesses. Tests use scripted runners that record command lines
//! without spawning anything.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::shell::render_command;
use crate::io::process::{CommandOutput, run_command};

/// Placeholder shown instead of generated secret values.
pub const REDACTED: &str = "[generated]";

/// One external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    /// Values that must not appear in logs or summaries.
    pub secrets: Vec<String>,
}

impl CommandRequest {
    pub fn new<I, S>(program: &str, args: I, workdir: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            workdir: workdir.into(),
            secrets: Vec::new(),
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secrets.push(secret.into());
        self
    }

    /// Shell-escaped command line with secrets replaced by [`REDACTED`].
    pub fn display(&self) -> String {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                self.secrets
                    .iter()
                    .fold(arg.clone(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
            })
            .collect();
        render_command(&self.program, &args)
    }
}

/// Abstraction over process execution backends.
pub trait CommandRunner {
    /// Run `request` to completion. Only spawn/wait failures are errors; a
    /// non-zero exit is reported through [`CommandOutput`].
    fn run(&self, request: &CommandRequest) -> Result<CommandOutput>;
}

/// Runner that spawns real processes.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    pub timeout: Option<Duration>,
    pub output_limit_bytes: usize,
}

impl CommandRunner for SystemRunner {
    #[instrument(skip_all, fields(command = %request.display()))]
    fn run(&self, request: &CommandRequest) -> Result<CommandOutput> {
        info!(workdir = %request.workdir.display(), "running command");
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args).current_dir(&request.workdir);
        let output = run_command(cmd, self.timeout, self.output_limit_bytes)?;
        if !output.success() {
            warn!(exit_code = ?output.code, timed_out = output.timed_out, "command failed");
        }
        Ok(output)
    }
}
