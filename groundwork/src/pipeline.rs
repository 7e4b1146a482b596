//! Mutation pipeline: executes a [`Manifest`] against a [`ScaffoldTree`].
//!
//! Steps run strictly in manifest order, mutation phase first and cleanup
//! last. The first failure halts the run and leaves the tree as it is; there
//! is no rollback and no retry. A pipeline runs at most once.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, instrument, warn};

use crate::core::buffer::TextBuffer;
use crate::core::manifest::{Cleanup, Manifest, Operation, Step};
use crate::core::ops;
use crate::error::{ErrorKind, PipelineError, StepError};
use crate::hosting::{HostingAdapter, HostingTask};
use crate::io::assets::AssetSource;
use crate::io::runner::{CommandRequest, CommandRunner};
use crate::io::templates::TemplateRenderer;
use crate::io::tree::ScaffoldTree;

/// Lifecycle of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Pending,
    Running,
    Completed,
    Aborted,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineState::Pending => "pending",
            PipelineState::Running => "running",
            PipelineState::Completed => "completed",
            PipelineState::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// Where and why a run stopped.
#[derive(Debug)]
pub struct AbortReport {
    pub step: String,
    /// 1-based position of the failed step across both phases.
    pub position: usize,
    pub total: usize,
    pub error: StepError,
}

impl AbortReport {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    /// The path, pattern or command that could not be resolved.
    pub fn subject(&self) -> String {
        self.error.subject()
    }
}

/// What a successful run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionSummary {
    /// Relative paths created, modified or removed.
    pub touched: BTreeSet<PathBuf>,
    /// Command lines run, in order, shell-escaped with secrets redacted.
    pub commands: Vec<String>,
    /// Steps that succeeded without changing anything.
    pub skipped: Vec<String>,
    pub steps: usize,
}

impl fmt::Display for CompletionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} steps, {} paths touched", self.steps, self.touched.len())?;
        for path in &self.touched {
            writeln!(f, "  touched: {}", path.display())?;
        }
        for command in &self.commands {
            writeln!(f, "  ran: {command}")?;
        }
        if !self.skipped.is_empty() {
            writeln!(f, "  skipped (nothing to change): {}", self.skipped.join(", "))?;
        }
        Ok(())
    }
}

enum Outcome {
    Applied,
    Skipped(&'static str),
}

/// Executes a manifest once against one scaffold tree.
pub struct Pipeline<'a, R: CommandRunner, A: AssetSource> {
    tree: ScaffoldTree,
    assets: &'a A,
    runner: &'a R,
    hosting: &'a HostingAdapter,
    renderer: TemplateRenderer,
    bindings: BTreeMap<String, String>,
    state: PipelineState,
}

impl<'a, R: CommandRunner, A: AssetSource> Pipeline<'a, R, A> {
    pub fn new(
        tree: ScaffoldTree,
        assets: &'a A,
        runner: &'a R,
        hosting: &'a HostingAdapter,
    ) -> Self {
        Self {
            tree,
            assets,
            runner,
            hosting,
            renderer: TemplateRenderer::new(),
            bindings: BTreeMap::new(),
            state: PipelineState::Pending,
        }
    }

    /// Bindings available to every template; step bindings take precedence.
    pub fn with_bindings(mut self, bindings: BTreeMap<String, String>) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    #[instrument(skip_all, fields(root = %self.tree.root().display(), steps = manifest.len()))]
    pub fn run(&mut self, manifest: &Manifest) -> Result<CompletionSummary, PipelineError> {
        if self.state != PipelineState::Pending {
            return Err(PipelineError::AlreadyFinished { state: self.state });
        }
        self.state = PipelineState::Running;
        info!("pipeline started");

        let total = manifest.len();
        let mut summary = CompletionSummary::default();
        let mut position = 0;

        for step in manifest.steps() {
            position += 1;
            debug!(position, step = %step.name, kind = step.operation.kind(), "step started");
            match self.execute(step, &mut summary) {
                Ok(outcome) => self.finish_step(&step.name, outcome, &mut summary),
                Err(err) => return Err(self.abort(&step.name, position, total, err)),
            }
        }

        for cleanup in manifest.cleanup() {
            position += 1;
            debug!(position, step = %cleanup.name, "cleanup started");
            match self.strip(cleanup, &mut summary) {
                Ok(()) => self.finish_step(&cleanup.name, Outcome::Applied, &mut summary),
                Err(err) => return Err(self.abort(&cleanup.name, position, total, err)),
            }
        }

        self.state = PipelineState::Completed;
        info!(
            steps = summary.steps,
            touched = summary.touched.len(),
            commands = summary.commands.len(),
            "pipeline completed"
        );
        Ok(summary)
    }

    fn finish_step(&self, name: &str, outcome: Outcome, summary: &mut CompletionSummary) {
        summary.steps += 1;
        match outcome {
            Outcome::Applied => debug!(step = name, "step finished"),
            Outcome::Skipped(reason) => {
                debug!(step = name, reason, "step skipped");
                summary.skipped.push(name.to_string());
            }
        }
    }

    fn abort(
        &mut self,
        step: &str,
        position: usize,
        total: usize,
        err: StepError,
    ) -> PipelineError {
        self.state = PipelineState::Aborted;
        error!(
            step,
            position,
            kind = ?err.kind(),
            subject = %err.subject(),
            "step failed, aborting"
        );
        PipelineError::Aborted(Box::new(AbortReport {
            step: step.to_string(),
            position,
            total,
            error: err,
        }))
    }

    fn execute(&self, step: &Step, summary: &mut CompletionSummary) -> Result<Outcome, StepError> {
        match &step.operation {
            Operation::CreateFromTemplate {
                path,
                template,
                bindings,
                overwrite,
            } => {
                if !overwrite && self.tree.exists(path)? {
                    return Ok(Outcome::Skipped("exists"));
                }
                let source = self.assets.require(template)?;
                let source = String::from_utf8(source).map_err(|_| StepError::TemplateRender {
                    template: template.clone(),
                    message: "template is not valid UTF-8".to_string(),
                })?;
                let mut merged = self.bindings.clone();
                merged.extend(bindings.iter().map(|(k, v)| (k.clone(), v.clone())));
                let rendered = self.renderer.render(template, &source, &merged)?;
                self.tree.write_bytes(path, rendered.as_bytes())?;
                touch(summary, path);
            }
            Operation::CopyStatic { path, asset } => {
                let bytes = self.assets.require(asset)?;
                self.tree.write_bytes(path, &bytes)?;
                touch(summary, path);
            }
            Operation::CreateFile {
                path,
                content,
                overwrite,
            } => {
                if !overwrite && self.tree.exists(path)? {
                    return Ok(Outcome::Skipped("exists"));
                }
                self.tree.write_bytes(path, content.as_bytes())?;
                touch(summary, path);
            }
            Operation::CreateDirectory { path, keep } => {
                self.tree.create_dir(path, *keep)?;
                touch(summary, path);
            }
            Operation::InjectAnchored {
                path,
                anchor,
                position,
                text,
            } => {
                self.tree.edit(path, |buffer| {
                    ops::inject_anchored(buffer, path, anchor, *position, text)
                })?;
                touch(summary, path);
            }
            Operation::ReplaceFirst {
                path,
                pattern,
                replacement,
            } => {
                let replaced = self
                    .tree
                    .edit(path, |buffer| ops::replace_first(buffer, pattern, replacement))?;
                if !replaced {
                    warn!(
                        step = %step.name,
                        path = %path.display(),
                        %pattern,
                        "pattern not found, nothing replaced"
                    );
                    return Ok(Outcome::Skipped("pattern absent"));
                }
                touch(summary, path);
            }
            Operation::ReplaceRange {
                path,
                start,
                end,
                replacement,
            } => {
                self.tree.edit(path, |buffer| {
                    ops::replace_range(buffer, path, start, end, replacement)
                })?;
                touch(summary, path);
            }
            Operation::Append { path, text } => {
                self.tree.edit(path, |buffer| {
                    ops::append(buffer, text);
                    Ok(())
                })?;
                touch(summary, path);
            }
            Operation::Prepend { path, text } => {
                self.tree.edit(path, |buffer| {
                    ops::prepend(buffer, text);
                    Ok(())
                })?;
                touch(summary, path);
            }
            Operation::UncommentLine { path, line, marker } => {
                self.tree
                    .edit(path, |buffer| ops::uncomment_line(buffer, path, line, marker))?;
                touch(summary, path);
            }
            Operation::DeleteFile { path } => {
                if !self.tree.remove(path)? {
                    return Ok(Outcome::Skipped("absent"));
                }
                touch(summary, path);
            }
            Operation::MakeExecutable { path } => {
                self.tree.set_executable(path)?;
                touch(summary, path);
            }
            Operation::RunExternalCommand {
                program,
                args,
                workdir,
            } => {
                let workdir = match workdir {
                    Some(dir) => self.tree.resolve(dir)?,
                    None => self.tree.root().to_path_buf(),
                };
                let request = CommandRequest::new(program, args.iter().cloned(), workdir);
                self.run_command(&request, None, summary)?;
            }
            Operation::Hosting(action) => {
                for task in self.hosting.tasks(action, self.tree.root()) {
                    self.run_hosting_task(task, summary)?;
                }
            }
        }
        Ok(Outcome::Applied)
    }

    fn run_hosting_task(
        &self,
        task: HostingTask,
        summary: &mut CompletionSummary,
    ) -> Result<(), StepError> {
        match task {
            HostingTask::Run {
                request,
                provisions,
            } => self.run_command(&request, provisions, summary),
            HostingTask::Append { path, text } => {
                self.tree.edit(&path, |buffer| {
                    ops::append(buffer, &text);
                    Ok(())
                })?;
                touch(summary, &path);
                Ok(())
            }
            HostingTask::Write {
                path,
                content,
                executable,
            } => {
                let buffer = TextBuffer::from_text(&content).with_executable(executable);
                self.tree.write(&path, &buffer)?;
                touch(summary, &path);
                Ok(())
            }
        }
    }

    /// Run one command; a non-zero exit fails the step. Commands that create
    /// a remote resource fail as provisioning errors.
    fn run_command(
        &self,
        request: &CommandRequest,
        provisions: Option<String>,
        summary: &mut CompletionSummary,
    ) -> Result<(), StepError> {
        let command = request.display();
        summary.commands.push(command.clone());
        let output = self.runner.run(request).map_err(|err| StepError::ExternalCommandFailed {
            command: command.clone(),
            code: None,
            stderr: format!("{err:#}"),
        })?;
        if output.success() {
            return Ok(());
        }
        let mut stderr = output.stderr_lossy();
        if output.timed_out {
            stderr.push_str("\n[timed out]");
        }
        Err(match provisions {
            Some(resource) => StepError::ProvisioningFailed {
                resource,
                command,
                code: output.code,
                stderr,
            },
            None => StepError::ExternalCommandFailed {
                command,
                code: output.code,
                stderr,
            },
        })
    }

    fn strip(&self, cleanup: &Cleanup, summary: &mut CompletionSummary) -> Result<(), StepError> {
        for path in &cleanup.paths {
            self.tree.edit(path, |buffer| {
                ops::strip_comments_and_blank_lines(buffer, &cleanup.marker);
                Ok(())
            })?;
            touch(summary, path);
        }
        Ok(())
    }
}

fn touch(summary: &mut CompletionSummary, path: &Path) {
    summary.touched.insert(path.to_path_buf());
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::core::anchor::Anchor;
    use crate::core::manifest::ManifestBuilder;
    use crate::io::assets::Assets;
    use crate::io::config::HostingConfig;
    use crate::test_support::ScriptedRunner;

    fn adapter() -> HostingAdapter {
        HostingAdapter::new("demo", &HostingConfig::default())
    }

    fn append(name: &str, path: &str, text: &str) -> Step {
        Step::new(
            name,
            Operation::Append {
                path: PathBuf::from(path),
                text: text.to_string(),
            },
        )
    }

    #[test]
    fn summary_lists_touched_paths_and_commands() {
        let summary = CompletionSummary {
            touched: ["config/routes.rb", "README.md"]
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            commands: vec!["git init".to_string()],
            skipped: vec!["asset_host".to_string()],
            steps: 3,
        };
        assert_eq!(
            summary.to_string(),
            concat!(
                "3 steps, 2 paths touched\n",
                "  touched: README.md\n",
                "  touched: config/routes.rb\n",
                "  ran: git init\n",
                "  skipped (nothing to change): asset_host\n",
            )
        );
    }

    #[test]
    fn second_run_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.txt"), "a\n").expect("write");
        let mut builder = ManifestBuilder::new();
        builder.step(append("one", "a.txt", "b\n"));
        let manifest = builder.build().expect("build");

        let (assets, runner, hosting) = (Assets::embedded(), ScriptedRunner::new(), adapter());
        let mut pipeline =
            Pipeline::new(ScaffoldTree::new(temp.path()), &assets, &runner, &hosting);
        pipeline.run(&manifest).expect("first run");
        assert_eq!(pipeline.state(), PipelineState::Completed);

        let err = pipeline.run(&manifest).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::AlreadyFinished {
                state: PipelineState::Completed
            }
        ));
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).expect("read"), "a\nb\n");
    }

    #[test]
    fn missing_replace_pattern_is_skipped_not_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.rb"), "x = 1\n").expect("write");
        let mut builder = ManifestBuilder::new();
        builder
            .step(Step::new(
                "replace",
                Operation::replace("a.rb", Anchor::literal("absent"), "y"),
            ))
            .step(append("after", "a.rb", "z = 2\n"));
        let manifest = builder.build().expect("build");

        let (assets, runner, hosting) = (Assets::embedded(), ScriptedRunner::new(), adapter());
        let mut pipeline =
            Pipeline::new(ScaffoldTree::new(temp.path()), &assets, &runner, &hosting);
        let summary = pipeline.run(&manifest).expect("run");
        assert_eq!(summary.steps, 2);
        assert_eq!(summary.skipped, vec!["replace"]);
        assert_eq!(
            fs::read_to_string(temp.path().join("a.rb")).expect("read"),
            "x = 1\nz = 2\n"
        );
    }

    #[test]
    fn create_file_without_overwrite_keeps_existing_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("Procfile"), "web: mine\n").expect("write");
        let mut builder = ManifestBuilder::new();
        builder.step(Step::new(
            "procfile",
            Operation::CreateFile {
                path: PathBuf::from("Procfile"),
                content: "web: theirs\n".to_string(),
                overwrite: false,
            },
        ));
        let manifest = builder.build().expect("build");

        let (assets, runner, hosting) = (Assets::embedded(), ScriptedRunner::new(), adapter());
        let mut pipeline =
            Pipeline::new(ScaffoldTree::new(temp.path()), &assets, &runner, &hosting);
        let summary = pipeline.run(&manifest).expect("run");
        assert!(summary.touched.is_empty());
        assert_eq!(
            fs::read_to_string(temp.path().join("Procfile")).expect("read"),
            "web: mine\n"
        );
    }

    #[test]
    fn failing_command_aborts_with_exit_code() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut builder = ManifestBuilder::new();
        builder.step(Step::new("bundle", Operation::command("bundle", &["install"])));
        let manifest = builder.build().expect("build");

        let (assets, hosting) = (Assets::embedded(), adapter());
        let runner = ScriptedRunner::new().fail_matching("bundle install", 7, "no network");
        let mut pipeline =
            Pipeline::new(ScaffoldTree::new(temp.path()), &assets, &runner, &hosting);
        let err = pipeline.run(&manifest).unwrap_err();
        let PipelineError::Aborted(report) = err else {
            panic!("expected abort");
        };
        assert_eq!(report.position, 1);
        assert_eq!(report.kind(), ErrorKind::ExternalCommandFailed);
        assert_eq!(report.subject(), "bundle install");
        assert!(matches!(
            report.error,
            StepError::ExternalCommandFailed { code: Some(7), .. }
        ));
        assert_eq!(pipeline.state(), PipelineState::Aborted);
    }

    #[test]
    fn cleanup_runs_after_mutations() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("c.rb"), "# note\nkeep\n\n").expect("write");
        let mut builder = ManifestBuilder::new();
        builder
            .cleanup(Cleanup::new("strip", vec![PathBuf::from("c.rb")]))
            .step(append("add", "c.rb", "# added\nalso\n"));
        let manifest = builder.build().expect("build");

        let (assets, runner, hosting) = (Assets::embedded(), ScriptedRunner::new(), adapter());
        let mut pipeline =
            Pipeline::new(ScaffoldTree::new(temp.path()), &assets, &runner, &hosting);
        let summary = pipeline.run(&manifest).expect("run");
        assert_eq!(summary.steps, 2);
        assert_eq!(
            fs::read_to_string(temp.path().join("c.rb")).expect("read"),
            "keep\nalso\n"
        );
    }
}
