//! Generator configuration stored in `groundwork.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default config file name, looked up in the current directory.
pub const CONFIG_FILE: &str = "groundwork.toml";

/// Generator configuration (TOML).
///
/// Missing fields default to values matching a stock Rails + Heroku setup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Ruby version pinned in `.ruby-version` and the Gemfile.
    pub ruby_version: String,

    /// Rails version requirement rendered into the Gemfile.
    pub rails_version: String,

    /// Directory whose files override built-in assets by name.
    pub assets_dir: Option<PathBuf>,

    pub scaffold: ScaffoldConfig,

    pub hosting: HostingConfig,

    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScaffoldConfig {
    /// Base generator command; `{app_name}` is replaced with the application name.
    pub command: Vec<String>,

    /// Dependency manager invocation the recipe prefixes to install and generator commands.
    pub bundler: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HostingConfig {
    /// Platform CLI executable.
    pub tool: String,

    /// Remote environments, in pipeline stage order.
    pub environments: Vec<String>,

    /// Environment review apps are forked from.
    pub review_parent: String,

    /// Extra flags passed to every `create` call.
    pub create_flags: Vec<String>,

    /// Daily database backup time.
    pub backup_at: String,

    /// Command run on the platform after deploys and in review apps.
    pub migrate_command: Vec<String>,

    /// Process type scaled up in review apps.
    pub worker_process: String,

    /// Suffix of the platform's default public host names.
    pub domain_suffix: String,

    /// Git host used for deploy remotes.
    pub git_host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Per-command wall-clock limit; unset waits forever.
    pub command_timeout_secs: Option<u64>,
}

impl Default for ScaffoldConfig {
    fn default() -> Self {
        Self {
            command: [
                "rails",
                "new",
                "{app_name}",
                "--skip-test",
                "--skip-bundle",
                "--database=postgresql",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            bundler: vec!["bundle".to_string()],
        }
    }
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            tool: "heroku".to_string(),
            environments: vec!["staging".to_string(), "production".to_string()],
            review_parent: "staging".to_string(),
            create_flags: Vec::new(),
            backup_at: "10:00 UTC".to_string(),
            migrate_command: vec!["rails".to_string(), "db:migrate".to_string()],
            worker_process: "worker".to_string(),
            domain_suffix: "herokuapp.com".to_string(),
            git_host: "git@heroku.com".to_string(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            output_limit_bytes: 100_000,
            command_timeout_secs: None,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            ruby_version: "2.4.1".to_string(),
            rails_version: "~> 5.1.1".to_string(),
            assets_dir: None,
            scaffold: ScaffoldConfig::default(),
            hosting: HostingConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scaffold.command.is_empty() || self.scaffold.command[0].trim().is_empty() {
            return Err(anyhow!("scaffold.command must be a non-empty array"));
        }
        if self.scaffold.bundler.is_empty() || self.scaffold.bundler[0].trim().is_empty() {
            return Err(anyhow!("scaffold.bundler must be a non-empty array"));
        }
        if self.hosting.tool.trim().is_empty() {
            return Err(anyhow!("hosting.tool must not be empty"));
        }
        if self.hosting.environments.is_empty() {
            return Err(anyhow!("hosting.environments must list at least one environment"));
        }
        if !self
            .hosting
            .environments
            .contains(&self.hosting.review_parent)
        {
            return Err(anyhow!(
                "hosting.review_parent {:?} is not one of hosting.environments",
                self.hosting.review_parent
            ));
        }
        if self.hosting.migrate_command.is_empty() {
            return Err(anyhow!("hosting.migrate_command must be a non-empty array"));
        }
        if self.runtime.output_limit_bytes == 0 {
            return Err(anyhow!("runtime.output_limit_bytes must be > 0"));
        }
        if self.runtime.command_timeout_secs == Some(0) {
            return Err(anyhow!("runtime.command_timeout_secs must be > 0 when set"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `GeneratorConfig::default()`.
pub fn load_config(path: &Path) -> Result<GeneratorConfig> {
    if !path.exists() {
        let cfg = GeneratorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: GeneratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
