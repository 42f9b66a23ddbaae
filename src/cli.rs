// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "shipwright")]
#[command(about = "Promote versioned artifacts through environments with approval gates and rollback")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print the final result
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Who is acting; recorded in the ledger and audit log (defaults to $USER)
    #[arg(long, global = true, env = "SHIPWRIGHT_ACTOR")]
    pub actor: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new shipwright.yml configuration file
    Init {
        /// Application name
        #[arg(long)]
        application: Option<String>,

        /// Artifact template with a {version} placeholder
        #[arg(long)]
        artifact: Option<String>,

        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Check a deployment request against policy without deploying
    Validate {
        /// Target environment
        environment: String,

        /// Version to deploy
        version: String,

        /// Explicit artifact instead of the configured template
        #[arg(long)]
        artifact: Option<String>,
    },

    /// Deploy a version to an environment
    Deploy {
        /// Target environment
        environment: String,

        /// Version to deploy
        version: String,

        /// Explicit artifact instead of the configured template
        #[arg(long)]
        artifact: Option<String>,

        /// Break an existing deploy lock
        #[arg(long)]
        force: bool,
    },

    /// Deploy the artifact that ran in the previous environment
    Promote {
        /// Version to promote
        version: String,

        /// Environment to promote into
        #[arg(long)]
        to: String,

        /// Break an existing deploy lock
        #[arg(long)]
        force: bool,
    },

    /// Approve a version for an environment with an approval gate
    Approve {
        /// Environment being approved for
        environment: String,

        /// Version being approved
        version: String,
    },

    /// Restore an earlier release
    Rollback {
        /// Environment to roll back
        environment: String,

        /// Version to restore (defaults to the previous release)
        #[arg(long)]
        to: Option<String>,

        /// Break an existing deploy lock
        #[arg(long)]
        force: bool,
    },

    /// Show what runs in each environment and what is waiting
    Status,

    /// Show the release history of an environment
    History {
        /// Environment to show
        environment: String,
    },

    /// Inspect the audit log
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
}

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Verify the audit log's hash chain
    Verify,
}
