//! The default manifest applied to a freshly generated Rails application.
//!
//! Steps are hand-ordered. Each step that edits scaffold text declares the
//! anchor tag it relies on, so the builder can check that an anchor removed
//! or introduced by another step is scheduled correctly.

use std::path::PathBuf;

use crate::core::anchor::Anchor;
use crate::core::manifest::{
    Cleanup, ConfigValue, HostingAction, Manifest, ManifestBuilder, Operation, Step,
};
use crate::core::ops::Position;
use crate::error::ManifestError;

const APPLICATION: &str = "config/application.rb";
const DEVELOPMENT: &str = "config/environments/development.rb";
const PRODUCTION: &str = "config/environments/production.rb";
const TEST: &str = "config/environments/test.rb";
const ROUTES: &str = "config/routes.rb";
const SETUP_SCRIPT: &str = "bin/setup";
const REVIEW_APP_SCRIPT: &str = "bin/setup-review-app";

/// Anchors the base Rails scaffold is expected to contain.
pub const SCAFFOLD_ANCHORS: &[&str] = &[
    tags::APPLICATION_CLASS,
    tags::ENVIRONMENT_BLOCKS,
    tags::DEV_DELIVERY_ERRORS,
    tags::PROD_DELIVERY_ERRORS,
    tags::MISSING_TRANSLATIONS,
    tags::ASSET_HOST,
    tags::ASSETS_VERSION,
    tags::ROUTES_BLOCK,
    tags::ERROR_PAGES,
];

/// Anchor tags shared between steps and the scaffold.
pub mod tags {
    pub const APPLICATION_CLASS: &str = "application_class";
    pub const ENVIRONMENT_BLOCKS: &str = "environment_blocks";
    pub const DEV_DELIVERY_ERRORS: &str = "development_delivery_errors";
    pub const DEV_DELIVERY_ERRORS_RAISED: &str = "development_delivery_errors_raised";
    pub const PROD_DELIVERY_ERRORS: &str = "production_delivery_errors";
    pub const MISSING_TRANSLATIONS: &str = "missing_translations_comment";
    pub const ASSET_HOST: &str = "asset_host_comment";
    pub const ASSETS_VERSION: &str = "assets_version";
    pub const ROUTES_BLOCK: &str = "routes_block";
    pub const ERROR_PAGES: &str = "error_page_heads";
    pub const SETUP_SCRIPT: &str = "setup_script";
    pub const README: &str = "readme";
}

/// Default directories created with a `.keep` placeholder.
const DEFAULT_DIRECTORIES: &[&str] = &[
    "app/decorators",
    "app/forms",
    "app/queries",
    "app/services",
    "app/views/pages",
    "spec/decorators",
    "spec/fixtures",
    "spec/forms",
    "spec/helpers",
    "spec/lib",
    "spec/queries",
    "spec/requests",
    "spec/services",
    "spec/support/matchers",
    "spec/support/mixins",
    "spec/support/shared_examples",
];

/// Config files whose comments and blank lines are stripped at the end.
const STRIPPED_CONFIG_FILES: &[&str] = &[
    "config/application.rb",
    "config/environment.rb",
    DEVELOPMENT,
    PRODUCTION,
    TEST,
];

const ERROR_PAGES: &[&str] = &["500", "404", "422"];

/// Inputs that vary between generated applications.
#[derive(Debug, Clone)]
pub struct RecipeOptions {
    pub ruby_version: String,
    /// Dependency manager program and leading arguments, e.g. `["bundle"]`.
    pub bundler: Vec<String>,
    /// `None` leaves out every remote provisioning step.
    pub hosting: Option<HostingPlan>,
}

#[derive(Debug, Clone)]
pub struct HostingPlan {
    pub environments: Vec<String>,
    pub backup_at: String,
}

/// Build the default manifest.
pub fn default_manifest(options: &RecipeOptions) -> Result<Manifest, ManifestError> {
    let mut builder = ManifestBuilder::new();
    builder.scaffold_provides(SCAFFOLD_ANCHORS.iter().copied());

    project_files(&mut builder, options);
    development_environment(&mut builder);
    test_environment(&mut builder);
    production_environment(&mut builder);
    application_config(&mut builder);
    app_generators(&mut builder, options);
    views(&mut builder);
    specs(&mut builder, options);
    miscellaneous(&mut builder);
    lint_tasks(&mut builder);
    error_pages(&mut builder);
    routes(&mut builder);
    builder
        .step(Step::new("init_git", Operation::command("git", &["init"])))
        .step(bundle(
            "create_database",
            options,
            &["exec", "rake", "db:create", "db:migrate"],
        ));
    if let Some(plan) = &options.hosting {
        hosting(&mut builder, plan);
    }
    binstubs(&mut builder, options);

    builder.cleanup(Cleanup::new(
        "remove_config_comment_lines",
        STRIPPED_CONFIG_FILES.iter().map(PathBuf::from).collect(),
    ));
    builder.build()
}

fn project_files(builder: &mut ManifestBuilder, options: &RecipeOptions) {
    builder
        .step(
            Step::new("readme", Operation::template("README.md", "README.md.j2", true))
                .provides(tags::README),
        )
        .step(Step::new("gitignore", Operation::copy("gitignore", ".gitignore")))
        .step(Step::new("gemfile", Operation::template("Gemfile", "Gemfile.j2", true)))
        .step(Step::new(
            "ruby_version",
            Operation::CreateFile {
                path: PathBuf::from(".ruby-version"),
                content: format!("{}\n", options.ruby_version),
                overwrite: true,
            },
        ))
        .step(bundle("bundle_install", options, &["install"]))
        .step(Step::new(
            "database_config",
            Operation::template("config/database.yml", "database.yml.j2", true),
        ))
        .step(Step::new("sample_env", Operation::copy("env", ".sample.env")))
        .step(
            Step::new(
                "setup_script",
                Operation::template(SETUP_SCRIPT, "bin_setup.j2", true),
            )
            .provides(tags::SETUP_SCRIPT),
        )
        .step(
            Step::new(
                "setup_script_executable",
                Operation::MakeExecutable {
                    path: PathBuf::from(SETUP_SCRIPT),
                },
            )
            .requires(tags::SETUP_SCRIPT),
        )
        .step(Step::new(
            "dev_prime_task",
            Operation::copy("dev.rake", "lib/tasks/dev.rake"),
        ));
}

fn development_environment(builder: &mut ManifestBuilder) {
    builder
        .step(
            Step::new(
                "raise_on_delivery_errors",
                Operation::replace(
                    DEVELOPMENT,
                    Anchor::literal("raise_delivery_errors = false"),
                    "raise_delivery_errors = true",
                ),
            )
            .requires(tags::DEV_DELIVERY_ERRORS)
            .provides(tags::DEV_DELIVERY_ERRORS_RAISED),
        )
        .step(
            Step::new(
                "letter_opener_delivery",
                Operation::inject(
                    DEVELOPMENT,
                    Anchor::literal("config.action_mailer.raise_delivery_errors = true"),
                    Position::After,
                    "\n  config.action_mailer.delivery_method = :letter_opener",
                ),
            )
            .requires(tags::DEV_DELIVERY_ERRORS_RAISED),
        )
        .step(
            Step::new(
                "bullet_configuration",
                Operation::inject(
                    DEVELOPMENT,
                    Anchor::literal("config.action_mailer.raise_delivery_errors = true"),
                    Position::After,
                    "\n  config.after_initialize do\n    Bullet.enable = true\n    Bullet.bullet_logger = true\n    Bullet.rails_logger = true\n  end\n",
                ),
            )
            .requires(tags::DEV_DELIVERY_ERRORS_RAISED),
        )
        .step(
            Step::new(
                "raise_on_missing_translations_development",
                Operation::uncomment(
                    DEVELOPMENT,
                    "config.action_view.raise_on_missing_translations = true",
                ),
            )
            .requires(tags::MISSING_TRANSLATIONS),
        )
        .step(configure_environment(
            "mailer_host_development",
            DEVELOPMENT,
            "config.action_mailer.default_url_options = { host: \"localhost:3000\" }",
        ));
}

fn test_environment(builder: &mut ManifestBuilder) {
    builder
        .step(configure_environment(
            "raise_on_missing_assets_in_test",
            TEST,
            "config.assets.raise_runtime_errors = true",
        ))
        .step(
            Step::new(
                "raise_on_missing_translations_test",
                Operation::uncomment(
                    TEST,
                    "config.action_view.raise_on_missing_translations = true",
                ),
            )
            .requires(tags::MISSING_TRANSLATIONS),
        )
        .step(configure_environment(
            "mailer_host_test",
            TEST,
            "config.action_mailer.default_url_options = { host: \"www.example.com\" }",
        ));
}

fn production_environment(builder: &mut ManifestBuilder) {
    builder
        .step(Step::new("smtp_settings_file", Operation::copy("smtp.rb", "config/smtp.rb")))
        .step(Step::new(
            "require_smtp_settings",
            Operation::Prepend {
                path: PathBuf::from(PRODUCTION),
                text: "require Rails.root.join(\"config/smtp\")\n".to_string(),
            },
        ))
        .step(
            Step::new(
                "smtp_delivery",
                Operation::inject(
                    PRODUCTION,
                    Anchor::literal("config.action_mailer.raise_delivery_errors = false"),
                    Position::After,
                    "\n  config.action_mailer.delivery_method = :smtp\n  config.action_mailer.smtp_settings = SMTP_SETTINGS",
                ),
            )
            .requires(tags::PROD_DELIVERY_ERRORS),
        )
        .step(
            Step::new(
                "rack_canonical_host",
                Operation::inject(
                    PRODUCTION,
                    Anchor::pattern(r"^Rails\.application\.configure do"),
                    Position::After,
                    concat!(
                        "\n",
                        "  if ENV.fetch(\"HEROKU_APP_NAME\", \"\").include?(\"staging-pr-\")\n",
                        "    ENV[\"APPLICATION_HOST\"] = ENV[\"HEROKU_APP_NAME\"] + \".herokuapp.com\"\n",
                        "  end\n",
                        "\n",
                        "  config.middleware.use Rack::CanonicalHost, ENV.fetch(\"APPLICATION_HOST\")",
                    ),
                ),
            )
            .requires(tags::ENVIRONMENT_BLOCKS),
        )
        .step(configure_environment(
            "rack_deflater",
            PRODUCTION,
            "config.middleware.use Rack::Deflater",
        ))
        .step(
            Step::new(
                "asset_host",
                Operation::replace(
                    PRODUCTION,
                    Anchor::literal("# config.action_controller.asset_host = 'http://assets.example.com'"),
                    "config.action_controller.asset_host = ENV.fetch(\"ASSET_HOST\", ENV.fetch(\"APPLICATION_HOST\"))",
                ),
            )
            .requires(tags::ASSET_HOST),
        )
        .step(
            Step::new(
                "assets_version",
                Operation::replace(
                    "config/initializers/assets.rb",
                    Anchor::literal("config.assets.version = '1.0'"),
                    "config.assets.version = (ENV[\"ASSETS_VERSION\"] || \"1.0\")",
                ),
            )
            .requires(tags::ASSETS_VERSION),
        )
        .step(configure_environment(
            "public_file_server_headers",
            PRODUCTION,
            "config.public_file_server.headers = {\n    \"Cache-Control\" => \"public, max-age=31557600\",\n  }",
        ))
        .step(configure_environment(
            "mailer_host_production",
            PRODUCTION,
            "config.action_mailer.default_url_options = { host: ENV.fetch(\"APPLICATION_HOST\") }",
        ))
        .step(Step::new(
            "rack_timeout",
            Operation::Append {
                path: PathBuf::from(PRODUCTION),
                text: "Rack::Timeout.timeout = (ENV[\"RACK_TIMEOUT\"] || 10).to_i\n".to_string(),
            },
        ));
}

fn application_config(builder: &mut ManifestBuilder) {
    builder
        .step(inject_into_application(
            "raise_on_unpermitted_parameters",
            "    config.action_controller.action_on_unpermitted_parameters = :raise",
        ))
        .step(inject_into_application(
            "quiet_assets",
            "    config.assets.quiet = true",
        ))
        .step(inject_into_application(
            "generators",
            concat!(
                "\n",
                "    config.generators do |generate|\n",
                "      generate.controller_specs false\n",
                "      generate.helper false\n",
                "      generate.javascripts false\n",
                "      generate.request_specs false\n",
                "      generate.routing_specs false\n",
                "      generate.stylesheets false\n",
                "      generate.test_framework :rspec\n",
                "      generate.view_specs false\n",
                "    end\n",
            ),
        ))
        .step(Step::new(
            "remove_default_locale",
            Operation::DeleteFile {
                path: PathBuf::from("config/locales/en.yml"),
            },
        ))
        .step(Step::new(
            "italian_locale",
            Operation::template("config/locales/it.yml", "locales_it.yml.j2", false),
        ))
        .step(inject_into_application(
            "locales_and_time_zone",
            concat!(
                "    config.i18n.available_locales = [:en, :it]\n",
                "    config.i18n.default_locale = :it\n",
                "    config.time_zone = 'Rome'",
            ),
        ))
        .step(Step::new(
            "disallow_wrapping_parameters",
            Operation::DeleteFile {
                path: PathBuf::from("config/initializers/wrap_parameters.rb"),
            },
        ))
        .step(Step::new("puma_config", Operation::copy("puma.rb", "config/puma.rb")))
        .step(Step::new("secrets", Operation::copy("secrets.yml", "config/secrets.yml")))
        .step(Step::new(
            "rack_mini_profiler",
            Operation::copy(
                "rack_mini_profiler.rb",
                "config/initializers/rack_mini_profiler.rb",
            ),
        ));
}

fn app_generators(builder: &mut ManifestBuilder, options: &RecipeOptions) {
    builder
        .step(bundle(
            "configure_simple_form",
            options,
            &["exec", "rails", "generate", "simple_form:install"],
        ))
        .step(bundle(
            "configure_draper",
            options,
            &["exec", "rails", "generate", "draper:install"],
        ));
}

fn views(builder: &mut ManifestBuilder) {
    builder
        .step(Step::new(
            "partials_directory",
            Operation::CreateDirectory {
                path: PathBuf::from("app/views/application"),
                keep: false,
            },
        ))
        .step(Step::new(
            "shared_flashes",
            Operation::copy("_flashes.html.slim", "app/views/application/_flashes.html.slim"),
        ))
        .step(Step::new(
            "flashes_helper",
            Operation::copy("flashes_helper.rb", "app/helpers/flashes_helper.rb"),
        ))
        .step(Step::new(
            "remove_erb_layout",
            Operation::DeleteFile {
                path: PathBuf::from("app/views/layouts/application.html.erb"),
            },
        ))
        .step(Step::new(
            "application_layout",
            Operation::template(
                "app/views/layouts/application.html.slim",
                "layout.html.slim.j2",
                true,
            ),
        ));
}

fn specs(builder: &mut ManifestBuilder, options: &RecipeOptions) {
    builder
        .step(bundle(
            "generate_rspec",
            options,
            &["exec", "rails", "generate", "rspec:install"],
        ))
        .step(Step::new(
            "spec_helper",
            Operation::copy("spec_helper.rb", "spec/spec_helper.rb"),
        ))
        .step(Step::new(
            "rails_helper",
            Operation::copy("rails_helper.rb", "spec/rails_helper.rb"),
        ))
        .step(Step::new(
            "factory_bot_support",
            Operation::copy("factory_bot_rspec.rb", "spec/support/factory_bot.rb"),
        ))
        .step(Step::new(
            "action_mailer_support",
            Operation::copy("action_mailer_rspec.rb", "spec/support/action_mailer.rb"),
        ));
    for dir in ["spec/features", "spec/support/features"] {
        builder.step(keep_directory(dir));
    }
    builder.step(Step::new(
        "configure_ci",
        Operation::template("circle.yml", "circle.yml.j2", true),
    ));
}

fn miscellaneous(builder: &mut ManifestBuilder) {
    for dir in DEFAULT_DIRECTORIES {
        builder.step(keep_directory(dir));
    }
    builder
        .step(Step::new("procfile", Operation::copy("Procfile", "Procfile")))
        .step(Step::new(
            "error_reporting",
            Operation::copy("errors.rb", "config/initializers/errors.rb"),
        ))
        .step(Step::new(
            "deploy_script",
            Operation::template("bin/deploy", "bin_deploy.j2", true),
        ))
        .step(Step::new(
            "deploy_script_executable",
            Operation::MakeExecutable {
                path: PathBuf::from("bin/deploy"),
            },
        ))
        .step(
            Step::new(
                "deploy_instructions",
                Operation::Append {
                    path: PathBuf::from("README.md"),
                    text: concat!(
                        "\n",
                        "## Deploying\n",
                        "\n",
                        "If you have previously run the `./bin/setup` script,\n",
                        "you can deploy to staging and production with:\n",
                        "\n",
                        "    % ./bin/deploy staging\n",
                        "    % ./bin/deploy production\n",
                    )
                    .to_string(),
                },
            )
            .requires(tags::README),
        )
        .step(Step::new(
            "default_rake_task",
            Operation::Append {
                path: PathBuf::from("Rakefile"),
                text: concat!(
                    "task(:default).clear\n",
                    "\n",
                    "if defined? RSpec\n",
                    "  task(:spec).clear\n",
                    "  RSpec::Core::RakeTask.new(:spec) do |t|\n",
                    "    t.verbose = false\n",
                    "  end\n",
                    "end\n",
                    "\n",
                    "task default: :rubocop\n",
                    "task default: :slim_lint\n",
                    "task default: 'brakeman:check'\n",
                    "task default: 'bundle:audit'\n",
                    "task default: :spec\n",
                )
                .to_string(),
            },
        ));
}

fn lint_tasks(builder: &mut ManifestBuilder) {
    const FILES: &[(&str, &str, &str)] = &[
        ("setup_rubocop_task", "rubocop.rake", "lib/tasks/rubocop.rake"),
        ("setup_rubocop_config", "rubocop.yml", ".rubocop.yml"),
        ("setup_rubocop_todo", "rubocop_todo.yml", ".rubocop_todo.yml"),
        ("setup_brakeman", "brakeman.rake", "lib/tasks/brakeman.rake"),
        ("setup_bundler_audit", "bundler_audit.rake", "lib/tasks/bundler_audit.rake"),
        ("setup_slim_lint_task", "slim-lint.rake", "lib/tasks/slim-lint.rake"),
        ("setup_slim_lint_config", "slim-lint.yml", ".slim-lint.yml"),
    ];
    for (name, asset, path) in FILES {
        builder.step(Step::new(*name, Operation::copy(asset, *path)));
    }
}

fn error_pages(builder: &mut ManifestBuilder) {
    for page in ERROR_PAGES {
        let path = format!("public/{page}.html");
        builder
            .step(
                Step::new(
                    format!("error_page_{page}_meta_tags"),
                    Operation::inject(
                        path.as_str(),
                        Anchor::literal("<head>"),
                        Position::After,
                        concat!(
                            "  <meta charset=\"utf-8\" />\n",
                            "  <meta name=\"ROBOTS\" content=\"NOODP\" />\n",
                            "  <meta name=\"viewport\" content=\"initial-scale=1\" />",
                        ),
                    ),
                )
                .requires(tags::ERROR_PAGES),
            )
            .step(Step::new(
                format!("error_page_{page}_comment"),
                Operation::replace(path.as_str(), Anchor::pattern(r"<!--.*-->\n"), ""),
            ));
    }
}

fn routes(builder: &mut ManifestBuilder) {
    builder.step(
        Step::new(
            "remove_routes_comment_lines",
            Operation::ReplaceRange {
                path: PathBuf::from(ROUTES),
                start: Anchor::literal("Rails.application.routes.draw do"),
                end: Anchor::pattern(r"(?m)^end"),
                replacement: "Rails.application.routes.draw do\nend".to_string(),
            },
        )
        .requires(tags::ROUTES_BLOCK),
    );
}

fn hosting(builder: &mut ManifestBuilder, plan: &HostingPlan) {
    builder
        .step(Step::new(
            "application_manifest",
            Operation::Hosting(HostingAction::WriteApplicationManifest {
                path: PathBuf::from("app.json"),
            }),
        ))
        .step(Step::new(
            "review_app_script",
            Operation::Hosting(HostingAction::GenerateReviewAppScript {
                path: PathBuf::from(REVIEW_APP_SCRIPT),
            }),
        ));

    for environment in &plan.environments {
        builder.step(
            Step::new(
                format!("remote_{environment}"),
                Operation::Hosting(HostingAction::SetRemoteGitUrl {
                    environment: environment.clone(),
                    script: PathBuf::from(SETUP_SCRIPT),
                }),
            )
            .requires(tags::SETUP_SCRIPT),
        );
    }
    for environment in &plan.environments {
        builder.step(Step::new(
            format!("create_{environment}_app"),
            Operation::Hosting(HostingAction::CreateEnvironment {
                environment: environment.clone(),
            }),
        ));
    }
    builder.step(Step::new(
        "create_pipeline",
        Operation::Hosting(HostingAction::CreatePipeline),
    ));
    for environment in &plan.environments {
        builder
            .step(config_variable(environment, "SECRET_KEY_BASE", ConfigValue::GeneratedSecret))
            .step(config_variable(environment, "APPLICATION_HOST", ConfigValue::ApplicationHost))
            .step(Step::new(
                format!("backup_schedule_{environment}"),
                Operation::Hosting(HostingAction::ScheduleBackup {
                    environment: environment.clone(),
                    at: plan.backup_at.clone(),
                }),
            ));
    }
}

fn binstubs(builder: &mut ManifestBuilder, options: &RecipeOptions) {
    builder.step(bundle(
        "setup_spring",
        options,
        &["exec", "spring", "binstub", "--all"],
    ));
    for gem in ["brakeman", "rubocop", "slim_lint"] {
        builder.step(bundle(&format!("binstubs_{gem}"), options, &["binstubs", gem]));
    }
}

fn config_variable(environment: &str, key: &str, value: ConfigValue) -> Step {
    Step::new(
        format!("{}_{environment}", key.to_ascii_lowercase()),
        Operation::Hosting(HostingAction::SetConfigVariable {
            environment: environment.to_string(),
            key: key.to_string(),
            value,
        }),
    )
}

/// Run the configured dependency manager with `args`.
fn bundle(name: &str, options: &RecipeOptions, args: &[&str]) -> Step {
    let (program, prefix) = match options.bundler.split_first() {
        Some((program, prefix)) => (program.clone(), prefix.to_vec()),
        None => ("bundle".to_string(), Vec::new()),
    };
    Step::new(
        name,
        Operation::RunExternalCommand {
            program,
            args: prefix
                .into_iter()
                .chain(args.iter().map(|arg| arg.to_string()))
                .collect(),
            workdir: None,
        },
    )
}

/// Insert one setting just before the closing `end` of an environment file.
fn configure_environment(name: &str, path: &str, setting: &str) -> Step {
    Step::new(
        name,
        Operation::inject(
            path,
            Anchor::pattern("^end$"),
            Position::Before,
            &format!("\n  {setting}"),
        ),
    )
    .requires(tags::ENVIRONMENT_BLOCKS)
}

fn inject_into_application(name: &str, text: &str) -> Step {
    Step::new(
        name,
        Operation::inject(
            APPLICATION,
            Anchor::literal("class Application < Rails::Application"),
            Position::After,
            text,
        ),
    )
    .requires(tags::APPLICATION_CLASS)
}

fn keep_directory(dir: &str) -> Step {
    Step::new(
        format!("directory_{}", dir.replace('/', "_")),
        Operation::CreateDirectory {
            path: PathBuf::from(dir),
            keep: true,
        },
    )
}
