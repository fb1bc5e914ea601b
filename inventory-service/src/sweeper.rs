use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::Result;
use crate::manager::ReservationManager;
use crate::models::SweepReport;
use shared::VariantId;

/// Moves Active reservations past their expiry to Expired, returning their
/// quantity to the available pool.
pub struct ExpirySweeper {
    manager: Arc<ReservationManager>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(manager: Arc<ReservationManager>) -> Self {
        let interval = manager.config().sweep_interval;
        Self { manager, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One pass over the ledger. Rows are expired one variant lock at a time;
    /// a row that fails is logged and counted, and the pass carries on.
    pub async fn run_expiry_sweep(&self) -> SweepReport {
        debug!("Cleaning up expired reservations...");
        let now = self.manager.now();
        let candidates = self.manager.ledger().expired_candidates(now);

        let mut report = SweepReport::default();
        for (reservation_id, variant_id) in candidates {
            match self.expire_one(reservation_id, variant_id).await {
                Ok(true) => report.expired += 1,
                Ok(false) => {}
                Err(e) => {
                    e.flag_defect();
                    error!(
                        "Failed to expire reservation {} on variant {}: {}",
                        reservation_id, variant_id, e
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            "Cleaned up {} expired reservations ({} failed)",
            report.expired, report.failed
        );
        report
    }

    async fn expire_one(&self, reservation_id: Uuid, variant_id: VariantId) -> Result<bool> {
        let _guard = self.manager.locks().acquire(variant_id).await?;
        // Re-read the clock under the lock; a confirm or release that won the
        // lock first leaves the row terminal and it is skipped.
        self.manager
            .ledger()
            .expire_if_due(reservation_id, self.manager.now())
    }

    /// Sweeps on a fixed interval until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Expiry sweeper started (interval {:?})", self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_expiry_sweep().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Expiry sweeper stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
