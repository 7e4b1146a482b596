//! Hosting adapter: remote environment provisioning through a platform CLI.
//!
//! The adapter turns each [`HostingAction`] into an ordered list of
//! [`HostingTask`]s (commands to run, files to write). It never spawns
//! processes itself; the pipeline executes the tasks and records them.

use std::path::{Path, PathBuf};

use rand::RngCore;
use serde_json::json;

use crate::core::manifest::{ConfigValue, HostingAction};
use crate::core::naming::dasherize;
use crate::io::config::HostingConfig;
use crate::io::runner::CommandRequest;

/// Environment whose public host may be overridden with `--host-name`.
pub const PRODUCTION: &str = "production";

/// Bytes of entropy behind a generated secret (hex-encoded to 128 chars).
const SECRET_BYTES: usize = 64;

/// A named deployment target and its remote resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEnvironment {
    pub environment: String,
    pub resource_name: String,
}

/// One unit of work produced by the adapter, executed in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostingTask {
    /// Run a platform command. `provisions` names the resource being created;
    /// such failures are reported as provisioning failures.
    Run {
        request: CommandRequest,
        provisions: Option<String>,
    },
    Append {
        path: PathBuf,
        text: String,
    },
    Write {
        path: PathBuf,
        content: String,
        executable: bool,
    },
}

#[derive(Debug, Clone)]
pub struct HostingAdapter {
    app_name: String,
    tool: String,
    environments: Vec<String>,
    review_parent: String,
    create_flags: Vec<String>,
    migrate_command: Vec<String>,
    worker_process: String,
    domain_suffix: String,
    git_host: String,
    host_override: Option<String>,
}

impl HostingAdapter {
    pub fn new(app_name: &str, config: &HostingConfig) -> Self {
        Self {
            app_name: dasherize(app_name),
            tool: config.tool.clone(),
            environments: config.environments.clone(),
            review_parent: config.review_parent.clone(),
            create_flags: config.create_flags.clone(),
            migrate_command: config.migrate_command.clone(),
            worker_process: config.worker_process.clone(),
            domain_suffix: config.domain_suffix.clone(),
            git_host: config.git_host.clone(),
            host_override: None,
        }
    }

    /// Public host used for production instead of the platform default.
    pub fn with_host_name(mut self, host: Option<String>) -> Self {
        self.host_override = host;
        self
    }

    pub fn environment(&self, environment: &str) -> RemoteEnvironment {
        RemoteEnvironment {
            environment: environment.to_string(),
            resource_name: format!("{}-{environment}", self.app_name),
        }
    }

    pub fn application_host(&self, environment: &str) -> String {
        if environment == PRODUCTION
            && let Some(host) = &self.host_override
        {
            return host.clone();
        }
        format!(
            "{}.{}",
            self.environment(environment).resource_name,
            self.domain_suffix
        )
    }

    /// Resource name of the review app for pull request `pr`.
    pub fn review_app_name(&self, pr: &str) -> String {
        format!("{}-pr-{pr}", self.environment(&self.review_parent).resource_name)
    }

    /// Shell lines run against a freshly created review app, in order:
    /// database restore from the parent, migration, worker scale, restart.
    pub fn review_app_commands(&self, app_ref: &str) -> Vec<String> {
        let parent = self.environment(&self.review_parent).resource_name;
        self.review_commands(&parent, app_ref)
    }

    fn review_commands(&self, parent: &str, app_ref: &str) -> Vec<String> {
        let tool = &self.tool;
        vec![
            format!(
                "{tool} pg:backups:restore `{tool} pg:backups:public-url --app {parent}` DATABASE_URL --confirm {app_ref} --app {app_ref}"
            ),
            format!(
                "{tool} run {} --exit-code --app {app_ref}",
                self.migrate_command.join(" ")
            ),
            format!("{tool} ps:scale {}=1 --app {app_ref}", self.worker_process),
            format!("{tool} restart --app {app_ref}"),
        ]
    }

    /// Expand `action` into the tasks that carry it out. Commands run in `workdir`.
    pub fn tasks(&self, action: &HostingAction, workdir: &Path) -> Vec<HostingTask> {
        match action {
            HostingAction::CreateEnvironment { environment } => {
                vec![self.create_environment(environment, workdir)]
            }
            HostingAction::CreatePipeline => self.create_pipeline(workdir),
            HostingAction::SetConfigVariable {
                environment,
                key,
                value,
            } => vec![self.set_config_variable(environment, key, value, workdir)],
            HostingAction::SetRemoteGitUrl {
                environment,
                script,
            } => vec![HostingTask::Append {
                path: script.clone(),
                text: self.join_snippet(environment),
            }],
            HostingAction::ScheduleBackup { environment, at } => vec![self.run(
                [
                    "pg:backups:schedule",
                    "DATABASE_URL",
                    "--at",
                    at.as_str(),
                    "--remote",
                    environment.as_str(),
                ],
                workdir,
            )],
            HostingAction::GenerateReviewAppScript { path } => vec![HostingTask::Write {
                path: path.clone(),
                content: self.review_app_script(path),
                executable: true,
            }],
            HostingAction::WriteApplicationManifest { path } => vec![HostingTask::Write {
                path: path.clone(),
                content: self.application_manifest(),
                executable: false,
            }],
        }
    }

    fn create_environment(&self, environment: &str, workdir: &Path) -> HostingTask {
        let remote = self.environment(environment);
        let mut args = vec!["create".to_string(), remote.resource_name.clone()];
        args.extend(self.create_flags.iter().cloned());
        args.extend(["--remote".to_string(), environment.to_string()]);
        HostingTask::Run {
            request: CommandRequest::new(&self.tool, args, workdir),
            provisions: Some(remote.resource_name),
        }
    }

    fn create_pipeline(&self, workdir: &Path) -> Vec<HostingTask> {
        let Some((first, rest)) = self.environments.split_first() else {
            return Vec::new();
        };
        let mut tasks = vec![HostingTask::Run {
            request: CommandRequest::new(
                &self.tool,
                [
                    "pipelines:create".to_string(),
                    self.app_name.clone(),
                    "-a".to_string(),
                    self.environment(first).resource_name,
                    "--stage".to_string(),
                    first.clone(),
                ],
                workdir,
            ),
            provisions: Some(self.app_name.clone()),
        }];
        for environment in rest {
            tasks.push(self.run(
                [
                    "pipelines:add".to_string(),
                    self.app_name.clone(),
                    "-a".to_string(),
                    self.environment(environment).resource_name,
                    "--stage".to_string(),
                    environment.clone(),
                ],
                workdir,
            ));
        }
        tasks
    }

    fn set_config_variable(
        &self,
        environment: &str,
        key: &str,
        value: &ConfigValue,
        workdir: &Path,
    ) -> HostingTask {
        let (value, secret) = match value {
            ConfigValue::Literal(text) => (text.clone(), None),
            ConfigValue::GeneratedSecret => {
                let secret = generate_secret();
                (secret.clone(), Some(secret))
            }
            ConfigValue::ApplicationHost => (self.application_host(environment), None),
        };
        let mut request = CommandRequest::new(
            &self.tool,
            [
                "config:add".to_string(),
                format!("{key}={value}"),
                "--remote".to_string(),
                environment.to_string(),
            ],
            workdir,
        );
        if let Some(secret) = secret {
            request = request.with_secret(secret);
        }
        HostingTask::Run {
            request,
            provisions: None,
        }
    }

    fn run<I, S>(&self, args: I, workdir: &Path) -> HostingTask
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        HostingTask::Run {
            request: CommandRequest::new(&self.tool, args, workdir),
            provisions: None,
        }
    }

    fn join_snippet(&self, environment: &str) -> String {
        let tool = &self.tool;
        let resource = self.environment(environment).resource_name;
        let git_host = &self.git_host;
        format!(
            "\n# Join the {environment} app and add its deploy remote\n\
             if {tool} join --app {resource} > /dev/null 2>&1; then\n  \
             git remote add -f {environment} {git_host}:{resource}.git || true\n  \
             printf 'You are a collaborator on the \"{resource}\" app\\n'\n\
             else\n  \
             printf 'Ask for access to the \"{resource}\" app\\n'\n\
             fi\n"
        )
    }

    fn review_app_script(&self, path: &Path) -> String {
        let parent = self.environment(&self.review_parent).resource_name;
        let mut script = format!(
            "#!/bin/sh\n\
             \n\
             # Run this script to set up a review app's database and worker dyno\n\
             \n\
             set -e\n\
             \n\
             PR_NUMBER=\"${{1:-$PR_NUMBER}}\"\n\
             if [ -z \"$PR_NUMBER\" ]; then\n  \
             echo \"usage: {} <pull-request-number>\" >&2\n  \
             exit 64\n\
             fi\n\
             \n\
             PARENT_APP_NAME={parent}\n\
             APP_NAME={}-pr-$PR_NUMBER\n\
             \n",
            path.display(),
            parent,
        );
        for line in self.review_commands("$PARENT_APP_NAME", "$APP_NAME") {
            script.push_str(&line);
            script.push('\n');
        }
        script
    }

    fn application_manifest(&self) -> String {
        let required = json!({ "required": true });
        let manifest = json!({
            "name": self.app_name,
            "scripts": {
                "postdeploy": format!("bundle exec {}", self.migrate_command.join(" ")),
            },
            "env": {
                "APPLICATION_HOST": required,
                "EMAIL_RECIPIENTS": required,
                "HEROKU_APP_NAME": required,
                "HEROKU_PARENT_APP_NAME": required,
                "RACK_ENV": required,
                "SECRET_KEY_BASE": { "generator": "secret" },
                "SMTP_ADDRESS": required,
                "SMTP_DOMAIN": required,
                "SMTP_PASSWORD": required,
                "SMTP_USERNAME": required,
            },
            "addons": ["heroku-postgresql"],
        });
        format!("{manifest:#}\n")
    }
}

fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
