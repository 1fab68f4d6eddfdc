//! Shield admission gateway.
//!
//! Single-upstream reverse proxy that admits or refuses each request before
//! relaying it to the origin.
//!
//! ```text
//!                 ┌──────────────────────────── SHIELD ────────────────────────────┐
//!  Client ───────▶│ bot check → rate check → header rules → body rules → forward ──┼──▶ Origin
//!         ◀───────┤   403          429           403            403         reply  │
//!                 │                                                                 │
//!                 │  mode (normal / restricted)   event log   metrics   admin API   │
//!                 └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use shield_gateway::config::{load_config, GatewayConfig};
use shield_gateway::lifecycle::{signals, startup};
use shield_gateway::observability::logging;
use shield_gateway::{Gateway, Shutdown};

#[derive(Parser)]
#[command(name = "shield-gateway", version, about = "Admission-control reverse proxy")]
struct Args {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(short, long, env = "SHIELD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability)?;

    tracing::info!("shield-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    match &args.config {
        Some(path) => tracing::info!(path = %path.display(), "Configuration loaded"),
        None => tracing::warn!("No configuration file given, using defaults"),
    }

    startup::init_metrics(&config)?;

    let gateway = Gateway::build(config)?;
    let listeners = gateway.bind().await?;

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        trigger.trigger();
    });

    gateway.serve(listeners, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
