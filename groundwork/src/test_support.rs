//! Test-only helpers: a scripted command runner and a minimal Rails scaffold.

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use anyhow::Result;

use crate::io::process::CommandOutput;
use crate::io::runner::{CommandRequest, CommandRunner};

type Effect = Box<dyn Fn(&CommandRequest)>;

/// Records every request instead of spawning processes.
///
/// Commands succeed unless their display line contains a registered failure
/// needle. Effects run for matching commands, e.g. to fake a generator.
#[derive(Default)]
pub struct ScriptedRunner {
    requests: RefCell<Vec<CommandRequest>>,
    failures: Vec<(String, i32, String)>,
    effects: Vec<(String, Effect)>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail commands whose display line contains `needle`.
    pub fn fail_matching(mut self, needle: &str, code: i32, stderr: &str) -> Self {
        self.failures.push((needle.to_string(), code, stderr.to_string()));
        self
    }

    /// Run `effect` before reporting success for commands containing `needle`.
    pub fn on_command(
        mut self,
        needle: &str,
        effect: impl Fn(&CommandRequest) + 'static,
    ) -> Self {
        self.effects.push((needle.to_string(), Box::new(effect)));
        self
    }

    pub fn requests(&self) -> Vec<CommandRequest> {
        self.requests.borrow().clone()
    }

    /// Display lines of every recorded request, in order.
    pub fn commands(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(CommandRequest::display)
            .collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, request: &CommandRequest) -> Result<CommandOutput> {
        self.requests.borrow_mut().push(request.clone());
        let line = request.display();
        let failure = self
            .failures
            .iter()
            .find(|(needle, ..)| line.contains(needle.as_str()));
        if let Some((_, code, stderr)) = failure {
            return Ok(CommandOutput {
                code: Some(*code),
                stderr: stderr.as_bytes().to_vec(),
                ..CommandOutput::default()
            });
        }
        for (needle, effect) in &self.effects {
            if line.contains(needle.as_str()) {
                effect(request);
            }
        }
        Ok(CommandOutput {
            code: Some(0),
            ..CommandOutput::default()
        })
    }
}

const APPLICATION_RB: &str = r#"require_relative 'boot'

require 'rails/all'

# Require the gems listed in Gemfile.
Bundler.require(*Rails.groups)

module __MODULE__
  class Application < Rails::Application
    # Initialize configuration defaults for originally generated Rails version.
    config.load_defaults 5.1

    # Settings in config/environments/* take precedence over those specified here.
  end
end
"#;

const ENVIRONMENT_RB: &str = r#"# Load the Rails application.
require_relative 'application'

# Initialize the Rails application.
Rails.application.initialize!
"#;

const DEVELOPMENT_RB: &str = r#"Rails.application.configure do
  # Settings specified here will take precedence over those in config/application.rb.

  config.cache_classes = false

  # Don't care if the mailer can't send.
  config.action_mailer.raise_delivery_errors = false

  config.action_mailer.perform_caching = false

  # Raises error for missing translations
  # config.action_view.raise_on_missing_translations = true
end
"#;

const TEST_RB: &str = r#"Rails.application.configure do
  config.cache_classes = true

  config.action_mailer.delivery_method = :test

  # Raises error for missing translations
  # config.action_view.raise_on_missing_translations = true
end
"#;

const PRODUCTION_RB: &str = r#"Rails.application.configure do
  config.cache_classes = true

  # Enable serving of images, stylesheets, and JavaScripts from an asset server.
  # config.action_controller.asset_host = 'http://assets.example.com'

  # Ignore bad email addresses and do not raise email delivery errors.
  # config.action_mailer.raise_delivery_errors = false

  config.active_record.dump_schema_after_migration = false
end
"#;

const ROUTES_RB: &str = r#"Rails.application.routes.draw do
  # For details on the DSL available within this file, see http://guides.rubyonrails.org/routing.html
end
"#;

const ERROR_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Error</title>
</head>

<body>
  <!-- This file lives in public/__PAGE__.html -->
  <div class="dialog"></div>
</body>
</html>
"#;

/// Write the subset of a `rails new` tree the default recipe edits.
pub fn write_rails_scaffold(root: &Path, module: &str) -> std::io::Result<()> {
    let files: Vec<(String, String)> = vec![
        ("Gemfile".into(), "source 'https://rubygems.org'\n".into()),
        ("README.md".into(), "# README\n".into()),
        (
            "Rakefile".into(),
            "require_relative 'config/application'\n\nRails.application.load_tasks\n".into(),
        ),
        (
            "config/application.rb".into(),
            APPLICATION_RB.replace("__MODULE__", module),
        ),
        ("config/environment.rb".into(), ENVIRONMENT_RB.into()),
        ("config/environments/development.rb".into(), DEVELOPMENT_RB.into()),
        ("config/environments/test.rb".into(), TEST_RB.into()),
        ("config/environments/production.rb".into(), PRODUCTION_RB.into()),
        (
            "config/initializers/assets.rb".into(),
            "# Version of your assets.\nRails.application.config.assets.version = '1.0'\n".into(),
        ),
        (
            "config/initializers/wrap_parameters.rb".into(),
            "ActiveSupport.on_load(:action_controller) do\nend\n".into(),
        ),
        ("config/locales/en.yml".into(), "en:\n  hello: \"Hello world\"\n".into()),
        ("config/routes.rb".into(), ROUTES_RB.into()),
        (
            "app/views/layouts/application.html.erb".into(),
            "<html><body><%= yield %></body></html>\n".into(),
        ),
    ];
    for (rel, body) in files {
        write(root, &rel, &body)?;
    }
    for page in ["404", "422", "500"] {
        write(
            root,
            &format!("public/{page}.html"),
            &ERROR_PAGE.replace("__PAGE__", page),
        )?;
    }
    Ok(())
}

/// Fresh temporary directory holding a [`write_rails_scaffold`] tree.
pub fn rails_scaffold(module: &str) -> std::io::Result<tempfile::TempDir> {
    let dir = tempfile::tempdir()?;
    write_rails_scaffold(dir.path(), module)?;
    Ok(dir)
}

fn write(root: &Path, rel: &str, body: &str) -> std::io::Result<()> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, body)
}
