//! Pipeline lifecycle tests against real scratch trees.
//!
//! These drive a [`Pipeline`] end to end: fail-fast abort with no later
//! effects, and hosting commands issued in order through a scripted runner.

use std::fs;
use std::path::{Path, PathBuf};

use groundwork::core::anchor::Anchor;
use groundwork::core::manifest::{
    Cleanup, ConfigValue, HostingAction, ManifestBuilder, Operation, Step,
};
use groundwork::core::ops::Position;
use groundwork::error::{ErrorKind, PipelineError};
use groundwork::generate::{global_bindings, plan_manifest};
use groundwork::hosting::HostingAdapter;
use groundwork::io::assets::Assets;
use groundwork::io::config::{GeneratorConfig, HostingConfig};
use groundwork::io::tree::ScaffoldTree;
use groundwork::pipeline::{Pipeline, PipelineState};
use groundwork::test_support::{ScriptedRunner, rails_scaffold};

fn append(name: &str, path: &str, text: &str) -> Step {
    Step::new(
        name,
        Operation::Append {
            path: PathBuf::from(path),
            text: text.to_string(),
        },
    )
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).expect("read")
}

/// Five steps, the third of which cannot find its anchor:
///
/// 1. append to `a.txt`
/// 2. append to `b.txt`
/// 3. inject into `c.txt` after a missing anchor
/// 4. append to `d.txt`
/// 5. create `e.txt`
///
/// Steps 1-2 take effect, step 3 aborts, and nothing from 4-5 happens.
#[test]
fn abort_at_step_three_leaves_later_steps_unapplied() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    for name in ["a.txt", "b.txt", "c.txt", "d.txt"] {
        fs::write(root.join(name), "start\n").expect("write");
    }

    let mut builder = ManifestBuilder::new();
    builder
        .step(append("one", "a.txt", "one\n"))
        .step(append("two", "b.txt", "two\n"))
        .step(Step::new(
            "three",
            Operation::inject("c.txt", Anchor::literal("MISSING"), Position::After, "three"),
        ))
        .step(append("four", "d.txt", "four\n"))
        .step(Step::new(
            "five",
            Operation::CreateFile {
                path: PathBuf::from("e.txt"),
                content: "five\n".to_string(),
                overwrite: true,
            },
        ));
    let manifest = builder.build().expect("build");

    let (assets, runner) = (Assets::embedded(), ScriptedRunner::new());
    let hosting = HostingAdapter::new("demo", &HostingConfig::default());
    let mut pipeline = Pipeline::new(ScaffoldTree::new(root), &assets, &runner, &hosting);
    let err = pipeline.run(&manifest).unwrap_err();

    let PipelineError::Aborted(report) = err else {
        panic!("expected abort");
    };
    assert_eq!(report.step, "three");
    assert_eq!(report.position, 3);
    assert_eq!(report.total, 5);
    assert_eq!(report.kind(), ErrorKind::AnchorNotFound);
    assert_eq!(report.subject(), "c.txt @ literal \"MISSING\"");
    assert_eq!(pipeline.state(), PipelineState::Aborted);

    assert_eq!(read(root, "a.txt"), "start\none\n");
    assert_eq!(read(root, "b.txt"), "start\ntwo\n");
    assert_eq!(read(root, "c.txt"), "start\n");
    assert_eq!(read(root, "d.txt"), "start\n");
    assert!(!root.join("e.txt").exists());

    // A fresh run on the same pipeline is refused.
    assert!(matches!(
        pipeline.run(&manifest).unwrap_err(),
        PipelineError::AlreadyFinished {
            state: PipelineState::Aborted
        }
    ));
}

#[test]
fn inject_keeps_prefix_and_inserts_contiguously() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    fs::write(
        root.join("application.rb"),
        "module Shop\n  class Application < Rails::Application\n    config.load_defaults 5.1\n  end\nend\n",
    )
    .expect("write");

    let mut builder = ManifestBuilder::new();
    builder.step(Step::new(
        "quiet_assets",
        Operation::inject(
            "application.rb",
            Anchor::literal("class Application"),
            Position::After,
            "    config.assets.quiet = true\n    config.time_zone = 'Rome'\n",
        ),
    ));
    let manifest = builder.build().expect("build");

    let (assets, runner) = (Assets::embedded(), ScriptedRunner::new());
    let hosting = HostingAdapter::new("shop", &HostingConfig::default());
    Pipeline::new(ScaffoldTree::new(root), &assets, &runner, &hosting)
        .run(&manifest)
        .expect("run");

    assert_eq!(
        read(root, "application.rb"),
        "module Shop\n  class Application < Rails::Application\n    config.assets.quiet = true\n    config.time_zone = 'Rome'\n    config.load_defaults 5.1\n  end\nend\n"
    );
}

#[test]
fn hosting_steps_issue_commands_in_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();

    let mut builder = ManifestBuilder::new();
    for environment in ["staging", "production"] {
        builder.step(Step::new(
            format!("create_{environment}"),
            Operation::Hosting(HostingAction::CreateEnvironment {
                environment: environment.to_string(),
            }),
        ));
    }
    builder
        .step(Step::new(
            "pipeline",
            Operation::Hosting(HostingAction::CreatePipeline),
        ))
        .step(Step::new(
            "secret_staging",
            Operation::Hosting(HostingAction::SetConfigVariable {
                environment: "staging".to_string(),
                key: "SECRET_KEY_BASE".to_string(),
                value: ConfigValue::GeneratedSecret,
            }),
        ))
        .step(Step::new(
            "host_production",
            Operation::Hosting(HostingAction::SetConfigVariable {
                environment: "production".to_string(),
                key: "APPLICATION_HOST".to_string(),
                value: ConfigValue::ApplicationHost,
            }),
        ));
    let manifest = builder.build().expect("build");

    let (assets, runner) = (Assets::embedded(), ScriptedRunner::new());
    let hosting = HostingAdapter::new("My Cool App", &HostingConfig::default())
        .with_host_name(Some("www.mycoolapp.com".to_string()));
    let summary = Pipeline::new(ScaffoldTree::new(root), &assets, &runner, &hosting)
        .run(&manifest)
        .expect("run");

    let expected = vec![
        "heroku create my-cool-app-staging --remote staging",
        "heroku create my-cool-app-production --remote production",
        "heroku pipelines:create my-cool-app -a my-cool-app-staging --stage staging",
        "heroku pipelines:add my-cool-app -a my-cool-app-production --stage production",
        "heroku config:add 'SECRET_KEY_BASE=[generated]' --remote staging",
        "heroku config:add APPLICATION_HOST=www.mycoolapp.com --remote production",
    ];
    assert_eq!(summary.commands, expected);
    assert_eq!(runner.commands(), expected);
    assert_eq!(summary.steps, 5);

    // The real secret reaches the runner but never the summary.
    let requests = runner.requests();
    let secret_arg = &requests[4].args[1];
    assert_eq!(secret_arg.len(), "SECRET_KEY_BASE=".len() + 128);
}

#[test]
fn failed_environment_creation_is_provisioning_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut builder = ManifestBuilder::new();
    builder
        .step(Step::new(
            "create_staging",
            Operation::Hosting(HostingAction::CreateEnvironment {
                environment: "staging".to_string(),
            }),
        ))
        .step(Step::new(
            "create_production",
            Operation::Hosting(HostingAction::CreateEnvironment {
                environment: "production".to_string(),
            }),
        ));
    let manifest = builder.build().expect("build");

    let assets = Assets::embedded();
    let runner =
        ScriptedRunner::new().fail_matching("create shop-staging", 1, "name is already taken");
    let hosting = HostingAdapter::new("shop", &HostingConfig::default());
    let err = Pipeline::new(ScaffoldTree::new(temp.path()), &assets, &runner, &hosting)
        .run(&manifest)
        .unwrap_err();

    let PipelineError::Aborted(report) = err else {
        panic!("expected abort");
    };
    assert_eq!(report.kind(), ErrorKind::ProvisioningFailed);
    assert_eq!(report.position, 1);
    assert!(report.error.to_string().contains("name is already taken"));
    assert_eq!(runner.commands().len(), 1);
}

#[test]
fn review_app_script_is_written_executable() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    let mut builder = ManifestBuilder::new();
    builder.step(Step::new(
        "review_app_script",
        Operation::Hosting(HostingAction::GenerateReviewAppScript {
            path: PathBuf::from("bin/setup-review-app"),
        }),
    ));
    let manifest = builder.build().expect("build");

    let (assets, runner) = (Assets::embedded(), ScriptedRunner::new());
    let hosting = HostingAdapter::new("My Cool App", &HostingConfig::default());
    let summary = Pipeline::new(ScaffoldTree::new(root), &assets, &runner, &hosting)
        .run(&manifest)
        .expect("run");

    assert!(summary.commands.is_empty());
    assert!(summary.touched.contains(Path::new("bin/setup-review-app")));
    let script = read(root, "bin/setup-review-app");
    assert!(script.contains("APP_NAME=my-cool-app-staging-pr-$PR_NUMBER"));
    assert_eq!(
        hosting.review_app_name("42"),
        "my-cool-app-staging-pr-42"
    );

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(root.join("bin/setup-review-app"))
            .expect("metadata")
            .permissions()
            .mode();
        assert_ne!(mode & 0o111, 0);
    }
}

#[test]
fn default_recipe_then_second_strip_changes_nothing() {
    let scaffold = rails_scaffold("Shop").expect("scaffold");
    let root = scaffold.path();
    let config = GeneratorConfig::default();
    let manifest = plan_manifest(&config, true).expect("plan");

    let (assets, runner) = (Assets::embedded(), ScriptedRunner::new());
    let hosting = HostingAdapter::new("shop", &config.hosting);
    Pipeline::new(ScaffoldTree::new(root), &assets, &runner, &hosting)
        .with_bindings(global_bindings("shop", &config))
        .run(&manifest)
        .expect("run recipe");

    let files = [
        "config/application.rb",
        "config/environment.rb",
        "config/environments/development.rb",
        "config/environments/production.rb",
        "config/environments/test.rb",
    ];
    let before: Vec<String> = files.iter().map(|rel| read(root, rel)).collect();
    for content in &before {
        assert!(!content.contains('#'));
        assert!(!content.lines().any(|line| line.trim().is_empty()));
    }

    let mut builder = ManifestBuilder::new();
    builder.cleanup(Cleanup::new(
        "strip_again",
        files.iter().map(PathBuf::from).collect(),
    ));
    let again = builder.build().expect("build");
    Pipeline::new(ScaffoldTree::new(root), &assets, &runner, &hosting)
        .run(&again)
        .expect("strip again");

    let after: Vec<String> = files.iter().map(|rel| read(root, rel)).collect();
    assert_eq!(before, after);
    assert_eq!(read(root, ".ruby-version"), format!("{}\n", config.ruby_version));
}
