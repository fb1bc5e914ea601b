use anyhow::Result;
use clap::Parser;
use inventory_service::{
    ExpirySweeper, InMemoryCatalog, InventoryConfig, ReservationManager, SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "inventory-service")]
struct Args {
    #[arg(long, env = "RESERVATION_TTL_MINUTES", default_value_t = 15)]
    reservation_ttl_minutes: i64,

    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value_t = 60)]
    sweep_interval_secs: u64,

    /// Bound on how long a request waits for a contended variant. Unset waits
    /// indefinitely.
    #[arg(long, env = "LOCK_TIMEOUT_MS")]
    lock_timeout_ms: Option<u64>,

    /// JSON array of variants to load into the in-memory catalog.
    #[arg(long, env = "CATALOG_SEED")]
    catalog_seed: Option<PathBuf>,
}

/// One week; longer holds are never intended and keep `now + ttl` far from
/// chrono's range limits.
const MAX_RESERVATION_TTL_MINUTES: i64 = 7 * 24 * 60;

impl Args {
    fn config(&self) -> Result<InventoryConfig> {
        anyhow::ensure!(
            self.reservation_ttl_minutes > 0,
            "reservation TTL must be positive"
        );
        anyhow::ensure!(
            self.reservation_ttl_minutes <= MAX_RESERVATION_TTL_MINUTES,
            "reservation TTL must be at most {} minutes",
            MAX_RESERVATION_TTL_MINUTES
        );
        anyhow::ensure!(self.sweep_interval_secs > 0, "sweep interval must be positive");
        Ok(InventoryConfig {
            reservation_ttl: chrono::Duration::minutes(self.reservation_ttl_minutes),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            lock_timeout: self.lock_timeout_ms.map(Duration::from_millis),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();
    let config = args.config()?;

    let catalog = match &args.catalog_seed {
        Some(path) => {
            let catalog = InMemoryCatalog::from_seed_file(path)?;
            info!("Loaded {} variants from {}", catalog.len(), path.display());
            catalog
        }
        None => {
            warn!("No catalog seed given; starting with an empty catalog");
            InMemoryCatalog::new()
        }
    };

    let manager = Arc::new(ReservationManager::new(
        Arc::new(catalog),
        Arc::new(SystemClock),
        config,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::new(manager.clone()).spawn(shutdown_rx);

    info!(
        "Inventory service started (reservation TTL {} minutes)",
        manager.config().ttl_minutes()
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    shutdown_tx.send(true)?;
    sweeper.await?;

    Ok(())
}
