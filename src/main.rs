use clap::Parser;
use tracing_subscriber::EnvFilter;

use foreman::config::CoordinatorConfig;
use foreman::coordinator::Coordinator;
use foreman::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "foreman")]
#[command(about = "A distributed task coordinator with leased dispatch and bounded retries")]
struct Args {
    /// Port for the coordinator HTTP surface (registration, submission, metrics)
    #[arg(long, default_value = "9000")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = CoordinatorConfig::from_env(args.port)?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        max_retries = config.max_retries,
        lease_timeout_secs = config.lease_timeout_secs,
        "Starting foreman coordinator"
    );

    let coordinator = Coordinator::connect(config).await?;
    let shutdown = install_shutdown_handler();
    coordinator.run(shutdown).await?;

    Ok(())
}
