use parking_lot::Mutex;
use shared::VariantId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::{InventoryError, Result};

/// One exclusive lock per variant. The unit of mutual exclusion is a
/// variant's reservations together with its stock record, so shoppers only
/// contend when they want the same variant.
///
/// Callers that need several variants must take them one at a time in
/// ascending [`VariantId`] order and release each before taking the next.
#[derive(Debug, Default)]
pub struct VariantLocks {
    table: Mutex<HashMap<VariantId, Arc<AsyncMutex<()>>>>,
    timeout: Option<Duration>,
}

/// Held for the duration of one read-check-write sequence on a variant.
#[derive(Debug)]
pub struct VariantGuard {
    _guard: OwnedMutexGuard<()>,
}

impl VariantLocks {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    fn slot(&self, variant_id: VariantId) -> Arc<AsyncMutex<()>> {
        self.table
            .lock()
            .entry(variant_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Waits for the variant's lock. Without a configured timeout this waits
    /// until the current holder releases.
    pub async fn acquire(&self, variant_id: VariantId) -> Result<VariantGuard> {
        let slot = self.slot(variant_id);
        let guard = match self.timeout {
            None => slot.lock_owned().await,
            Some(waited) => tokio::time::timeout(waited, slot.lock_owned())
                .await
                .map_err(|_| InventoryError::LockTimeout { variant_id, waited })?,
        };
        Ok(VariantGuard { _guard: guard })
    }
}
