//! Orchestration for `groundwork new` and `groundwork plan`.
//!
//! `new` runs the upstream scaffold generator, builds the default manifest
//! and hands both to a fresh [`Pipeline`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::{info, instrument};

use crate::core::manifest::Manifest;
use crate::core::naming::{camelize, dasherize, humanize};
use crate::error::StepError;
use crate::hosting::HostingAdapter;
use crate::io::assets::Assets;
use crate::io::config::GeneratorConfig;
use crate::io::runner::{CommandRequest, CommandRunner};
use crate::io::tree::ScaffoldTree;
use crate::pipeline::{CompletionSummary, Pipeline};
use crate::recipe::{HostingPlan, RecipeOptions, default_manifest};

/// Placeholder replaced with the application name in `scaffold.command`.
pub const APP_NAME_PLACEHOLDER: &str = "{app_name}";

/// Inputs for `groundwork new`.
#[derive(Debug, Clone)]
pub struct NewOptions {
    pub app_name: String,
    /// Directory the application directory is created in.
    pub parent_dir: PathBuf,
    /// Public host for production instead of the platform default.
    pub host_name: Option<String>,
    pub skip_hosting: bool,
}

/// Result of a successful `groundwork new`.
#[derive(Debug, Clone)]
pub struct Generated {
    pub root: PathBuf,
    pub summary: CompletionSummary,
}

/// Build the manifest `new` would run, without touching the filesystem.
pub fn plan_manifest(config: &GeneratorConfig, skip_hosting: bool) -> Result<Manifest> {
    let options = RecipeOptions {
        ruby_version: config.ruby_version.clone(),
        bundler: config.scaffold.bundler.clone(),
        hosting: (!skip_hosting).then(|| HostingPlan {
            environments: config.hosting.environments.clone(),
            backup_at: config.hosting.backup_at.clone(),
        }),
    };
    default_manifest(&options).context("build default manifest")
}

/// Template bindings shared by every step.
pub fn global_bindings(app_name: &str, config: &GeneratorConfig) -> BTreeMap<String, String> {
    [
        ("app_name", app_name.to_string()),
        ("app_name_dasherized", dasherize(app_name)),
        ("app_name_humanized", humanize(app_name)),
        ("app_module", camelize(app_name)),
        ("ruby_version", config.ruby_version.clone()),
        ("rails_version", config.rails_version.clone()),
        ("hosting_tool", config.hosting.tool.clone()),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect()
}

/// Generate a new application under `options.parent_dir`.
#[instrument(skip_all, fields(app = %options.app_name))]
pub fn generate_app<R: CommandRunner>(
    options: &NewOptions,
    config: &GeneratorConfig,
    runner: &R,
) -> Result<Generated> {
    validate_app_name(&options.app_name)?;
    let root = options.parent_dir.join(&options.app_name);
    if root.exists() {
        bail!("{} already exists", root.display());
    }

    let manifest = plan_manifest(config, options.skip_hosting)?;
    run_scaffold(options, config, runner)?;
    if !root.is_dir() {
        bail!("scaffold command did not create {}", root.display());
    }

    let assets = match &config.assets_dir {
        Some(dir) => Assets::with_override_dir(dir),
        None => Assets::embedded(),
    };
    let hosting = HostingAdapter::new(&options.app_name, &config.hosting)
        .with_host_name(options.host_name.clone());
    let mut pipeline = Pipeline::new(ScaffoldTree::new(&root), &assets, runner, &hosting)
        .with_bindings(global_bindings(&options.app_name, config));
    let summary = pipeline.run(&manifest)?;
    info!(root = %root.display(), steps = summary.steps, "application generated");
    Ok(Generated { root, summary })
}

fn run_scaffold<R: CommandRunner>(
    options: &NewOptions,
    config: &GeneratorConfig,
    runner: &R,
) -> Result<()> {
    let Some((program, args)) = config.scaffold.command.split_first() else {
        bail!("scaffold.command is empty");
    };
    let args = args
        .iter()
        .map(|arg| arg.replace(APP_NAME_PLACEHOLDER, &options.app_name));
    let request = CommandRequest::new(program, args, &options.parent_dir);
    let output = runner
        .run(&request)
        .with_context(|| format!("run scaffold command `{}`", request.display()))?;
    if !output.success() {
        return Err(StepError::ExternalCommandFailed {
            command: request.display(),
            code: output.code,
            stderr: output.stderr_lossy(),
        })
        .context("scaffold generator failed");
    }
    Ok(())
}

pub fn validate_app_name(name: &str) -> Result<()> {
    if dasherize(name).is_empty() {
        bail!("application name {name:?} has no letters or digits");
    }
    if name.contains(['/', '\\']) || name.starts_with('.') {
        bail!("application name {name:?} must be a plain directory name");
    }
    Ok(())
}
