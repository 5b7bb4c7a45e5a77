//! FleetBill CLI
//!
//! Prints the fleet (or single-app) cost estimate as JSON on stdout.
//! Logs go to stderr, filtered by `RUST_LOG`.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetbill_engine::{config::FleetBillConfig, FleetBill, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting FleetBill v{}", VERSION);

    // Load configuration
    let config = FleetBillConfig::load()?;
    info!("Loaded configuration: {:?}", config);

    let engine = FleetBill::from_config(&config)?;
    let report = engine
        .report(config.app.as_deref(), config.since.as_deref())
        .await?;

    println!("{}", report.to_json_pretty()?);
    Ok(())
}
