//! tandem-relay: Shared-state relay for tandem sandbox clients

mod config;
mod server;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "tandem-relay", version, about = "Relay authority for tandem sessions")]
struct Args {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
    /// Address to bind
    #[arg(long)]
    bind: Option<String>,
    /// Config file (defaults to the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = config::load_config(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    // Initialize logging
    let filter = match &config.log_filter {
        Some(directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,tandem_relay=debug,tandem_services=debug")),
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    tracing::info!("Starting tandem relay");

    server::run_server(config).await
}
