use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Provisions the Snowflake side of a SageMaker Autopilot stack as a
/// CloudFormation custom resource.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve invocations from the Lambda runtime API (the default)
    Serve,
    /// Handle a single custom resource event read from a file
    Invoke {
        /// Path to a JSON CloudFormation custom resource request
        #[arg(long)]
        event: PathBuf,

        /// Log stream name reported back as the physical resource id
        #[arg(long, default_value = "local")]
        log_stream: String,
    },
}
