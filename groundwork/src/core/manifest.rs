//! Manifest model: named steps, declared anchor dependencies, terminal cleanup.
//!
//! A [`Manifest`] is immutable once built. Its order is the execution order.
//! [`ManifestBuilder::build`] checks declared anchor tags and orders steps
//! topologically, keeping hand-authored order wherever dependencies allow.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::anchor::Anchor;
use crate::core::ops::{DEFAULT_COMMENT_MARKER, Position};
use crate::error::ManifestError;

/// One atomic mutation of the scaffold tree (or a delegated hosting action).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    CreateFromTemplate {
        path: PathBuf,
        template: String,
        #[serde(skip_serializing_if = "BTreeMap::is_empty")]
        bindings: BTreeMap<String, String>,
        overwrite: bool,
    },
    CopyStatic {
        path: PathBuf,
        asset: String,
    },
    CreateFile {
        path: PathBuf,
        content: String,
        overwrite: bool,
    },
    CreateDirectory {
        path: PathBuf,
        keep: bool,
    },
    InjectAnchored {
        path: PathBuf,
        anchor: Anchor,
        position: Position,
        text: String,
    },
    ReplaceFirst {
        path: PathBuf,
        pattern: Anchor,
        replacement: String,
    },
    ReplaceRange {
        path: PathBuf,
        start: Anchor,
        end: Anchor,
        replacement: String,
    },
    Append {
        path: PathBuf,
        text: String,
    },
    Prepend {
        path: PathBuf,
        text: String,
    },
    UncommentLine {
        path: PathBuf,
        line: String,
        marker: String,
    },
    DeleteFile {
        path: PathBuf,
    },
    MakeExecutable {
        path: PathBuf,
    },
    RunExternalCommand {
        program: String,
        args: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        workdir: Option<PathBuf>,
    },
    Hosting(HostingAction),
}

/// Provisioning actions delegated to the hosting adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HostingAction {
    CreateEnvironment {
        environment: String,
    },
    CreatePipeline,
    SetConfigVariable {
        environment: String,
        key: String,
        value: ConfigValue,
    },
    SetRemoteGitUrl {
        environment: String,
        script: PathBuf,
    },
    ScheduleBackup {
        environment: String,
        at: String,
    },
    GenerateReviewAppScript {
        path: PathBuf,
    },
    WriteApplicationManifest {
        path: PathBuf,
    },
}

/// Value of a remote configuration variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigValue {
    Literal(String),
    /// Random secret generated at execution time; never logged.
    GeneratedSecret,
    /// Public host name of the environment.
    ApplicationHost,
}

impl Operation {
    pub fn template(path: impl Into<PathBuf>, template: &str, overwrite: bool) -> Self {
        Operation::CreateFromTemplate {
            path: path.into(),
            template: template.to_string(),
            bindings: BTreeMap::new(),
            overwrite,
        }
    }

    pub fn copy(asset: &str, path: impl Into<PathBuf>) -> Self {
        Operation::CopyStatic {
            path: path.into(),
            asset: asset.to_string(),
        }
    }

    pub fn inject(
        path: impl Into<PathBuf>,
        anchor: Anchor,
        position: Position,
        text: &str,
    ) -> Self {
        Operation::InjectAnchored {
            path: path.into(),
            anchor,
            position,
            text: text.to_string(),
        }
    }

    pub fn replace(path: impl Into<PathBuf>, pattern: Anchor, replacement: &str) -> Self {
        Operation::ReplaceFirst {
            path: path.into(),
            pattern,
            replacement: replacement.to_string(),
        }
    }

    pub fn uncomment(path: impl Into<PathBuf>, line: &str) -> Self {
        Operation::UncommentLine {
            path: path.into(),
            line: line.to_string(),
            marker: DEFAULT_COMMENT_MARKER.to_string(),
        }
    }

    pub fn command(program: &str, args: &[&str]) -> Self {
        Operation::RunExternalCommand {
            program: program.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            workdir: None,
        }
    }

    /// Primary file this operation reads or writes, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Operation::CreateFromTemplate { path, .. }
            | Operation::CopyStatic { path, .. }
            | Operation::CreateFile { path, .. }
            | Operation::CreateDirectory { path, .. }
            | Operation::InjectAnchored { path, .. }
            | Operation::ReplaceFirst { path, .. }
            | Operation::ReplaceRange { path, .. }
            | Operation::Append { path, .. }
            | Operation::Prepend { path, .. }
            | Operation::UncommentLine { path, .. }
            | Operation::DeleteFile { path }
            | Operation::MakeExecutable { path } => Some(path),
            Operation::RunExternalCommand { .. } => None,
            Operation::Hosting(action) => match action {
                HostingAction::SetRemoteGitUrl { script, .. } => Some(script),
                HostingAction::GenerateReviewAppScript { path }
                | HostingAction::WriteApplicationManifest { path } => Some(path),
                _ => None,
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::CreateFromTemplate { .. } => "create_from_template",
            Operation::CopyStatic { .. } => "copy_static",
            Operation::CreateFile { .. } => "create_file",
            Operation::CreateDirectory { .. } => "create_directory",
            Operation::InjectAnchored { .. } => "inject_anchored",
            Operation::ReplaceFirst { .. } => "replace_first",
            Operation::ReplaceRange { .. } => "replace_range",
            Operation::Append { .. } => "append",
            Operation::Prepend { .. } => "prepend",
            Operation::UncommentLine { .. } => "uncomment_line",
            Operation::DeleteFile { .. } => "delete_file",
            Operation::MakeExecutable { .. } => "make_executable",
            Operation::RunExternalCommand { .. } => "run_external_command",
            Operation::Hosting(_) => "hosting",
        }
    }
}

/// A named, bound invocation of one [`Operation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub name: String,
    #[serde(flatten)]
    pub operation: Operation,
    /// Anchor tags this step expects earlier steps (or the scaffold) to leave behind.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
    /// Anchor tags this step leaves in the tree.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<String>,
}

impl Step {
    pub fn new(name: impl Into<String>, operation: Operation) -> Self {
        Self {
            name: name.into(),
            operation,
            requires: Vec::new(),
            provides: Vec::new(),
        }
    }

    pub fn requires(mut self, tag: impl Into<String>) -> Self {
        self.requires.push(tag.into());
        self
    }

    pub fn provides(mut self, tag: impl Into<String>) -> Self {
        self.provides.push(tag.into());
        self
    }
}

/// Terminal, destructive cleanup: strip comment and blank lines from `paths`.
///
/// Kept apart from [`Operation`] so it can only run after every mutation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cleanup {
    pub name: String,
    pub paths: Vec<PathBuf>,
    pub marker: String,
}

impl Cleanup {
    pub fn new(name: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            paths,
            marker: DEFAULT_COMMENT_MARKER.to_string(),
        }
    }
}

/// An ordered mutation phase followed by a cleanup phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    steps: Vec<Step>,
    cleanup: Vec<Cleanup>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Record<'a> {
    Step(&'a Step),
    Cleanup {
        name: &'a str,
        kind: &'static str,
        paths: &'a [PathBuf],
        marker: &'a str,
    },
}

impl Manifest {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn cleanup(&self) -> &[Cleanup] {
        &self.cleanup
    }

    /// Total number of steps across both phases.
    pub fn len(&self) -> usize {
        self.steps.len() + self.cleanup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Step names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.steps
            .iter()
            .map(|step| step.name.as_str())
            .chain(self.cleanup.iter().map(|cleanup| cleanup.name.as_str()))
            .collect()
    }

    /// Ordered JSON array of `{name, kind, ...parameters}` records.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let records: Vec<Record<'_>> = self
            .steps
            .iter()
            .map(Record::Step)
            .chain(self.cleanup.iter().map(|cleanup| Record::Cleanup {
                name: &cleanup.name,
                kind: "strip_comments_and_blank_lines",
                paths: &cleanup.paths,
                marker: &cleanup.marker,
            }))
            .collect();
        serde_json::to_string_pretty(&records)
    }
}

/// Collects steps and validates them into a [`Manifest`].
#[derive(Debug, Default)]
pub struct ManifestBuilder {
    steps: Vec<Step>,
    cleanup: Vec<Cleanup>,
    scaffold_anchors: BTreeSet<String>,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare anchor tags the base scaffold is expected to contain.
    pub fn scaffold_provides<I, S>(&mut self, tags: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scaffold_anchors
            .extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn step(&mut self, step: Step) -> &mut Self {
        self.steps.push(step);
        self
    }

    pub fn cleanup(&mut self, cleanup: Cleanup) -> &mut Self {
        self.cleanup.push(cleanup);
        self
    }

    pub fn build(self) -> Result<Manifest, ManifestError> {
        {
            let mut seen = BTreeSet::new();
            let names = self
                .steps
                .iter()
                .map(|step| &step.name)
                .chain(self.cleanup.iter().map(|cleanup| &cleanup.name));
            for name in names {
                if !seen.insert(name.as_str()) {
                    return Err(ManifestError::DuplicateStepName { name: name.clone() });
                }
            }
        }

        let order = topological_order(&self.steps, &self.scaffold_anchors)?;
        let mut slots: Vec<Option<Step>> = self.steps.into_iter().map(Some).collect();
        let steps = order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect();
        Ok(Manifest {
            steps,
            cleanup: self.cleanup,
        })
    }
}

/// Kahn's algorithm; among ready steps the earliest declared runs first.
fn topological_order(
    steps: &[Step],
    scaffold_anchors: &BTreeSet<String>,
) -> Result<Vec<usize>, ManifestError> {
    let mut providers: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (index, step) in steps.iter().enumerate() {
        for tag in &step.provides {
            providers.entry(tag.as_str()).or_default().push(index);
        }
    }

    let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); steps.len()];
    let mut indegree = vec![0usize; steps.len()];
    for (index, step) in steps.iter().enumerate() {
        for tag in &step.requires {
            match providers.get(tag.as_str()) {
                Some(sources) => {
                    for &source in sources {
                        if source != index && dependents[source].insert(index) {
                            indegree[index] += 1;
                        }
                    }
                }
                None if scaffold_anchors.contains(tag) => {}
                None => {
                    return Err(ManifestError::UnsatisfiedAnchor {
                        step: step.name.clone(),
                        tag: tag.clone(),
                    });
                }
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..steps.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(steps.len());
    while let Some(index) = ready.pop_first() {
        order.push(index);
        for &next in &dependents[index] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() < steps.len() {
        let steps = indegree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree > 0)
            .map(|(index, _)| steps[index].name.clone())
            .collect();
        return Err(ManifestError::DependencyCycle { steps });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append(name: &str) -> Step {
        Step::new(
            name,
            Operation::Append {
                path: PathBuf::from("README.md"),
                text: name.to_string(),
            },
        )
    }

    #[test]
    fn keeps_hand_order_when_consistent() {
        let mut builder = ManifestBuilder::new();
        builder
            .step(append("a").provides("t"))
            .step(append("b"))
            .step(append("c").requires("t"));
        let manifest = builder.build().expect("build");
        assert_eq!(manifest.names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn moves_consumer_after_late_provider() {
        let mut builder = ManifestBuilder::new();
        builder
            .step(append("inject").requires("marker"))
            .step(append("other"))
            .step(append("render").provides("marker"));
        let manifest = builder.build().expect("build");
        assert_eq!(manifest.names(), vec!["other", "render", "inject"]);
    }

    #[test]
    fn scaffold_anchors_satisfy_requirements() {
        let mut builder = ManifestBuilder::new();
        builder
            .scaffold_provides(["routes"])
            .step(append("collapse").requires("routes"));
        assert!(builder.build().is_ok());
    }

    #[test]
    fn rejects_unsatisfied_anchor() {
        let mut builder = ManifestBuilder::new();
        builder.step(append("inject").requires("missing"));
        assert_eq!(
            builder.build().unwrap_err(),
            ManifestError::UnsatisfiedAnchor {
                step: "inject".to_string(),
                tag: "missing".to_string()
            }
        );
    }

    #[test]
    fn rejects_duplicate_names_across_phases() {
        let mut builder = ManifestBuilder::new();
        builder
            .step(append("strip"))
            .cleanup(Cleanup::new("strip", vec![PathBuf::from("a.rb")]));
        assert!(matches!(
            builder.build().unwrap_err(),
            ManifestError::DuplicateStepName { .. }
        ));
    }

    #[test]
    fn rejects_cycles() {
        let mut builder = ManifestBuilder::new();
        builder
            .step(append("a").requires("y").provides("x"))
            .step(append("b").requires("x").provides("y"));
        assert_eq!(
            builder.build().unwrap_err(),
            ManifestError::DependencyCycle {
                steps: vec!["a".to_string(), "b".to_string()]
            }
        );
    }

    #[test]
    fn json_records_are_ordered_and_flat() {
        let mut builder = ManifestBuilder::new();
        builder
            .step(Step::new(
                "deflater",
                Operation::inject(
                    "config/environments/production.rb",
                    Anchor::pattern("^end$"),
                    Position::Before,
                    "  config.middleware.use Rack::Deflater",
                ),
            ))
            .cleanup(Cleanup::new(
                "strip_config_comments",
                vec![PathBuf::from("config/application.rb")],
            ));
        let manifest = builder.build().expect("build");
        let value: serde_json::Value =
            serde_json::from_str(&manifest.to_json().expect("json")).expect("parse");

        assert_eq!(value[0]["name"], "deflater");
        assert_eq!(value[0]["kind"], "inject_anchored");
        assert_eq!(value[0]["anchor"]["pattern"], "^end$");
        assert_eq!(value[0]["position"], "before");
        assert_eq!(value[1]["kind"], "strip_comments_and_blank_lines");
        assert_eq!(value[1]["paths"][0], "config/application.rb");
    }

    #[test]
    fn hosting_records_carry_action() {
        let step = Step::new(
            "staging_secret",
            Operation::Hosting(HostingAction::SetConfigVariable {
                environment: "staging".to_string(),
                key: "SECRET_KEY_BASE".to_string(),
                value: ConfigValue::GeneratedSecret,
            }),
        );
        let value = serde_json::to_value(&step).expect("json");
        assert_eq!(value["kind"], "hosting");
        assert_eq!(value["action"], "set_config_variable");
        assert_eq!(value["value"], "generated_secret");
    }
}
