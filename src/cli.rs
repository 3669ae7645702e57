// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands, their arguments and the global output flags.

use clap::{Parser, Subcommand};

use crate::output::OutputMode;

#[derive(Parser)]
#[command(name = "deckhand")]
#[command(about = "Deploy, update and roll back workloads on container engines and clusters")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print only final results
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Emit JSON for scripting
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a deckhand.yml in the current directory
    Init {
        /// Deployment name
        #[arg(long)]
        name: Option<String>,

        /// Container image
        #[arg(long)]
        image: Option<String>,

        /// Overwrite an existing manifest
        #[arg(short, long)]
        force: bool,
    },

    /// Deploy the manifest's deployments, updating those already deployed
    Deploy {
        /// Environment overrides to apply (defined in the manifest)
        #[arg(short, long)]
        environment: Option<String>,

        /// Only these deployment ids
        ids: Vec<String>,
    },

    /// Show deployment status
    Status {
        #[arg(short, long)]
        environment: Option<String>,

        /// A single deployment; all registered deployments when omitted
        id: Option<String>,

        /// Include live resource usage
        #[arg(long)]
        usage: bool,
    },

    /// Roll a deployment back to its previous image or a given version
    Rollback {
        #[arg(short, long)]
        environment: Option<String>,

        id: String,

        /// Tag, full image reference or chart revision to return to
        #[arg(long)]
        to: Option<String>,
    },

    /// Change a deployment's replica count
    Scale {
        #[arg(short, long)]
        environment: Option<String>,

        id: String,

        replicas: u32,
    },

    /// Print recent log lines
    Logs {
        #[arg(short, long)]
        environment: Option<String>,

        id: String,

        /// Number of lines from the end
        #[arg(short = 'n', long)]
        tail: Option<u32>,

        /// Only lines newer than this Unix timestamp
        #[arg(long)]
        since: Option<i64>,

        /// Prefix lines with timestamps
        #[arg(short, long)]
        timestamps: bool,
    },

    /// Remove a deployment and its registration
    Delete {
        #[arg(short, long)]
        environment: Option<String>,

        id: String,
    },
}

impl Commands {
    pub fn environment(&self) -> Option<&str> {
        match self {
            Commands::Init { .. } => None,
            Commands::Deploy { environment, .. }
            | Commands::Status { environment, .. }
            | Commands::Rollback { environment, .. }
            | Commands::Scale { environment, .. }
            | Commands::Logs { environment, .. }
            | Commands::Delete { environment, .. } => environment.as_deref(),
        }
    }
}
