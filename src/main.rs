// ABOUTME: Entry point for the shipwright CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{AuditCommands, Cli, Commands};
use shipwright::config::{self, Config};
use shipwright::error::Result;
use shipwright::manager::{DeployOptions, DeploymentManager};
use shipwright::output::{Output, OutputMode};
use shipwright::validate::DeploymentRequest;
use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = output_mode(&cli);
    if let Err(e) = run(cli, mode).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(1);
    }
}

fn output_mode(cli: &Cli) -> OutputMode {
    if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    }
}

/// Actor from `--actor`/`SHIPWRIGHT_ACTOR`, then the login name.
fn actor(cli: &Cli) -> String {
    cli.actor
        .clone()
        .or_else(|| env::var("USER").ok())
        .or_else(|| env::var("USERNAME").ok())
        .unwrap_or_else(|| "unknown".to_string())
}

fn manager(cwd: &Path) -> Result<DeploymentManager> {
    let config = Config::discover(cwd)?;
    DeploymentManager::new(config, cwd)
}

async fn run(cli: Cli, mode: OutputMode) -> Result<()> {
    let cwd = env::current_dir()?;
    let output = Output::new(mode);
    let actor = actor(&cli);

    match cli.command {
        Commands::Init {
            application,
            artifact,
            force,
        } => {
            config::init_config(&cwd, application.as_deref(), artifact.as_deref(), force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Validate {
            environment,
            version,
            artifact,
        } => {
            let manager = manager(&cwd)?;
            commands::validate(&manager, request(environment, version, artifact), output)
        }
        Commands::Deploy {
            environment,
            version,
            artifact,
            force,
        } => {
            let manager = manager(&cwd)?;
            let opts = DeployOptions::new(actor).force_lock(force);
            commands::deploy(
                &manager,
                request(environment, version, artifact),
                &opts,
                output,
            )
            .await
        }
        Commands::Promote { version, to, force } => {
            let manager = manager(&cwd)?;
            let opts = DeployOptions::new(actor).force_lock(force);
            commands::promote(&manager, &version, &to, &opts, output).await
        }
        Commands::Approve {
            environment,
            version,
        } => {
            let manager = manager(&cwd)?;
            commands::approve(&manager, &environment, &version, &actor, output).await
        }
        Commands::Rollback {
            environment,
            to,
            force,
        } => {
            let manager = manager(&cwd)?;
            let opts = DeployOptions::new(actor).force_lock(force);
            commands::rollback(&manager, &environment, to.as_deref(), &opts, output).await
        }
        Commands::Status => commands::status(&manager(&cwd)?, output),
        Commands::History { environment } => {
            commands::history(&manager(&cwd)?, &environment, output)
        }
        Commands::Audit {
            command: AuditCommands::Verify,
        } => commands::verify_audit(&manager(&cwd)?, output),
    }
}

fn request(environment: String, version: String, artifact: Option<String>) -> DeploymentRequest {
    let request = DeploymentRequest::new(environment, version);
    match artifact {
        Some(artifact) => request.with_artifact(artifact),
        None => request,
    }
}
