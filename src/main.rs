//! uStreamer dataplane CLI entry point.

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use ustreamer_dataplane::{Controller, LoggingGateway};

#[derive(Parser, Debug)]
#[command(name = "ustreamer-dataplane")]
#[command(about = "Low-latency H.264/OPUS RTP streaming dataplane fed by a memsink shared-memory intake")]
#[command(version)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "ustreamer-dataplane.toml")]
    config: String,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    ustreamer_dataplane::logging::init(cli.verbose);

    info!("uStreamer dataplane starting");
    info!(config_path = %cli.config, "loading configuration");

    let gateway = Arc::new(LoggingGateway);
    let mut controller = match Controller::init(&cli.config, gateway) {
        Ok(controller) => controller,
        Err(e) => {
            error!(error = %e, "failed to initialize controller");
            return Err(e.into());
        }
    };

    info!("dataplane running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    controller.destroy();
    Ok(())
}
