use anyhow::Result;
use autopilot_provisioner::cli::{Cli, Commands};
use autopilot_provisioner::commands::{default_provisioner, invoke, serve};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // CloudWatch stamps every line already.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .without_time()
        .init();

    let provisioner = default_provisioner().await;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(provisioner).await?,
        Commands::Invoke { event, log_stream } => {
            let status = invoke(&provisioner, &event, &log_stream).await?;
            println!("{}", serde_json::to_string(&status)?);
        }
    }

    Ok(())
}
