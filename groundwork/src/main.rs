//! `groundwork` command-line interface.
//!
//! `new` generates an application and provisions its hosting environments;
//! `plan` prints the manifest `new` would execute.

use std::path::{Path, PathBuf};
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};

use groundwork::error::PipelineError;
use groundwork::exit_codes;
use groundwork::generate::{NewOptions, generate_app, plan_manifest, validate_app_name};
use groundwork::io::config::{CONFIG_FILE, load_config};
use groundwork::io::runner::SystemRunner;
use groundwork::logging;
use groundwork::pipeline::CompletionSummary;

#[derive(Parser)]
#[command(
    name = "groundwork",
    version,
    about = "Generate an opinionated, deployable Rails application"
)]
struct Cli {
    /// Log step progress to stderr (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Generator config file.
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a new application and provision its environments.
    New {
        app_name: String,

        /// Public host name for the production environment.
        #[arg(long)]
        host_name: Option<String>,

        /// Skip every remote provisioning step.
        #[arg(long)]
        skip_hosting: bool,

        /// Directory to create the application in.
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
    /// Print the manifest as an ordered JSON array of steps.
    Plan {
        app_name: String,

        /// Leave remote provisioning steps out of the plan.
        #[arg(long)]
        skip_hosting: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    if let Err(err) = run(cli) {
        process::exit(report_error(&err));
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config)?;
    match cli.command {
        Command::New {
            app_name,
            host_name,
            skip_hosting,
            path,
        } => {
            let runner = SystemRunner {
                timeout: config.runtime.command_timeout(),
                output_limit_bytes: config.runtime.output_limit_bytes,
            };
            let options = NewOptions {
                app_name,
                parent_dir: path,
                host_name,
                skip_hosting,
            };
            let generated = generate_app(&options, &config, &runner)?;
            print_summary(&generated.root, &generated.summary);
            Ok(())
        }
        Command::Plan {
            app_name,
            skip_hosting,
        } => {
            validate_app_name(&app_name)?;
            let manifest = plan_manifest(&config, skip_hosting)?;
            println!("{}", manifest.to_json()?);
            Ok(())
        }
    }
}

fn print_summary(root: &Path, summary: &CompletionSummary) {
    println!("Generated {}", root.display());
    print!("{summary}");
}

/// Print `err` and return the exit code for it.
fn report_error(err: &anyhow::Error) -> i32 {
    if let Some(PipelineError::Aborted(report)) = err.downcast_ref::<PipelineError>() {
        eprintln!(
            "aborted at step {} of {}: {}",
            report.position, report.total, report.step
        );
        eprintln!("  error:   {:?}", report.kind());
        eprintln!("  subject: {}", report.subject());
        eprintln!("  {}", report.error);
        eprintln!("The application tree was left as is and is not safe to resume.");
        return exit_codes::ABORTED;
    }
    eprintln!("{err:#}");
    exit_codes::INVALID
}
