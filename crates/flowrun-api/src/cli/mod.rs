//! CLI command definitions for the `flowrun` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Run step-chained LLM workflows from the command line or over HTTP.
#[derive(Parser)]
#[command(name = "flowrun", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the config file (default: ./flowrun.toml).
    #[arg(long, global = true, env = "FLOWRUN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server.
    Serve {
        /// Port to listen on (overrides server.port).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides server.host).
        #[arg(long)]
        host: Option<String>,
    },

    /// Run a workflow to completion and print its result.
    Run {
        /// Workflow name.
        workflow: String,

        /// Trigger input as JSON, or @path to read it from a file.
        #[arg(short, long)]
        input: String,
    },

    /// List registered workflows.
    #[command(alias = "ls")]
    Workflows,

    /// Show the steps and branches of a workflow.
    Describe {
        /// Workflow name.
        workflow: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
