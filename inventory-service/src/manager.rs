use chrono::{DateTime, Utc};
use shared::{Reservation, SessionId, VariantId};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::availability;
use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::config::InventoryConfig;
use crate::error::{InventoryError, Result};
use crate::ledger::ReservationLedger;
use crate::locks::VariantLocks;
use crate::models::{ConfirmFailure, ConfirmReport, StockLevel, VariantStock};

/// Reserve, release and confirm stock against the ledger.
///
/// Every mutation takes the variant lock, re-derives availability under it,
/// writes, and lets the lock go before returning. Nothing else serializes
/// competing shoppers, so no path may write the ledger or the stock record
/// for a variant without that lock.
pub struct ReservationManager {
    catalog: Arc<dyn Catalog>,
    ledger: ReservationLedger,
    locks: VariantLocks,
    clock: Arc<dyn Clock>,
    config: InventoryConfig,
}

impl ReservationManager {
    pub fn new(catalog: Arc<dyn Catalog>, clock: Arc<dyn Clock>, config: InventoryConfig) -> Self {
        Self {
            catalog,
            ledger: ReservationLedger::new(),
            locks: VariantLocks::new(config.lock_timeout),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn ledger(&self) -> &ReservationLedger {
        &self.ledger
    }

    pub(crate) fn locks(&self) -> &VariantLocks {
        &self.locks
    }

    /// Places a hold that expires one TTL from now.
    pub async fn reserve(
        &self,
        variant_id: VariantId,
        quantity: i32,
        session_id: &SessionId,
    ) -> Result<Reservation> {
        let expires_at = self.clock.now() + self.config.reservation_ttl;
        let (reservation, _) = self
            .reserve_until(variant_id, quantity, session_id, expires_at)
            .await?;
        Ok(reservation)
    }

    /// Places a hold with an explicit expiry, returning the variant as it was
    /// read under the lock so callers can price the line.
    pub(crate) async fn reserve_until(
        &self,
        variant_id: VariantId,
        quantity: i32,
        session_id: &SessionId,
        expires_at: DateTime<Utc>,
    ) -> Result<(Reservation, VariantStock)> {
        debug!(
            "Reserving stock: variant_id={}, quantity={}, session_id={}",
            variant_id, quantity, session_id
        );
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity { quantity });
        }

        let _guard = self.locks.acquire(variant_id).await?;

        let variant = self.variant(variant_id).await?;
        let available = availability::available(&variant, &self.ledger);
        if available < quantity {
            warn!(
                "Insufficient stock: variant_id={}, requested={}, available={}",
                variant_id, quantity, available
            );
            return Err(InventoryError::InsufficientStock {
                variant_id,
                requested: quantity,
                available,
            });
        }

        let reservation = Reservation::new(
            variant_id,
            quantity,
            session_id.clone(),
            self.clock.now(),
            expires_at,
        );
        self.ledger.insert(reservation.clone());

        info!(
            "Stock reserved: variant_id={}, quantity={}, reservation_id={}",
            variant_id, quantity, reservation.id
        );
        Ok((reservation, variant))
    }

    /// Cancels every Active reservation of the session. Returns how many rows
    /// changed; a session with nothing Active is a no-op.
    ///
    /// A variant whose lock cannot be taken does not stop the others from
    /// being released; the first such error is returned after the pass.
    pub async fn release(&self, session_id: &SessionId) -> Result<usize> {
        debug!("Releasing stock for session: {}", session_id);

        let variants: BTreeSet<VariantId> = self
            .ledger
            .active_for_session(session_id)
            .into_iter()
            .map(|r| r.variant_id)
            .collect();

        let mut released = 0;
        let mut first_error = None;
        for variant_id in variants {
            match self.release_variant(session_id, variant_id).await {
                Ok(count) => released += count,
                Err(e) => {
                    e.flag_defect();
                    warn!(
                        "Failed to release session {} on variant {}: {}",
                        session_id, variant_id, e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        info!(
            "Stock released for session: {} ({} reservations)",
            session_id, released
        );
        match first_error {
            Some(e) => Err(e),
            None => Ok(released),
        }
    }

    async fn release_variant(&self, session_id: &SessionId, variant_id: VariantId) -> Result<usize> {
        let _guard = self.locks.acquire(variant_id).await?;
        Ok(self
            .ledger
            .cancel_session_on_variant(session_id, variant_id)?
            .len())
    }

    /// Turns the session's Active holds into permanent stock deductions.
    ///
    /// Each reservation is confirmed under its own variant lock. A failure on
    /// one line is recorded in the report and does not undo lines already
    /// confirmed, since their deduction is already visible to other shoppers.
    pub async fn confirm(&self, session_id: &SessionId) -> Result<ConfirmReport> {
        debug!("Confirming stock for session: {}", session_id);

        let mut pending = self.ledger.active_for_session(session_id);
        if pending.is_empty() {
            return Err(InventoryError::NoActiveReservations {
                session_id: session_id.clone(),
            });
        }
        pending.sort_by_key(|r| (r.variant_id, r.created_at, r.id));

        let mut report = ConfirmReport::default();
        for reservation in pending {
            match self.confirm_one(&reservation).await {
                Ok(()) => report.confirmed.push(reservation.id),
                Err(e) => {
                    e.flag_defect();
                    warn!(
                        "Failed to confirm reservation {} on variant {}: {}",
                        reservation.id, reservation.variant_id, e
                    );
                    report.failures.push(ConfirmFailure {
                        reservation_id: reservation.id,
                        variant_id: reservation.variant_id,
                        error: e,
                    });
                }
            }
        }

        info!(
            "Stock confirmed for session: {} (confirmed={}, failed={})",
            session_id,
            report.confirmed.len(),
            report.failures.len()
        );
        Ok(report)
    }

    async fn confirm_one(&self, reservation: &Reservation) -> Result<()> {
        let _guard = self.locks.acquire(reservation.variant_id).await?;

        // The sweeper or a release may have finished the row before we got
        // the lock.
        let current = self
            .ledger
            .get(reservation.id)
            .ok_or(InventoryError::UnknownReservation {
                reservation_id: reservation.id,
            })?;
        if !current.is_active() {
            return Err(InventoryError::ReservationNotActive {
                reservation_id: current.id,
                status: current.status,
            });
        }

        let variant = self.variant(current.variant_id).await?;
        let remaining = variant.on_hand_quantity - current.quantity;
        if remaining < 0 {
            error!(
                "On-hand stock below held quantity: variant_id={}, on_hand={}, held={}",
                variant.id, variant.on_hand_quantity, current.quantity
            );
            return Err(InventoryError::InsufficientStock {
                variant_id: variant.id,
                requested: current.quantity,
                available: variant.on_hand_quantity,
            });
        }

        self.catalog
            .set_on_hand_quantity(variant.id, remaining)
            .await?;
        self.ledger.complete(current.id)?;
        Ok(())
    }

    /// Puts units of a placed-then-cancelled order back on hand. Returns the
    /// new on-hand quantity.
    pub async fn restock(&self, variant_id: VariantId, quantity: i32) -> Result<i32> {
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity { quantity });
        }

        let _guard = self.locks.acquire(variant_id).await?;
        let variant = self.variant(variant_id).await?;
        let on_hand = variant.on_hand_quantity.checked_add(quantity).ok_or(
            InventoryError::StockOverflow {
                variant_id,
                on_hand: variant.on_hand_quantity,
                quantity,
            },
        )?;
        self.catalog.set_on_hand_quantity(variant_id, on_hand).await?;

        info!(
            "Stock restored: variant_id={}, quantity={}, on_hand={}",
            variant_id, quantity, on_hand
        );
        Ok(on_hand)
    }

    /// Advisory read; stale as soon as it returns.
    pub async fn available_stock(&self, variant_id: VariantId) -> Result<i32> {
        Ok(self.stock_level(variant_id).await?.available)
    }

    pub async fn stock_level(&self, variant_id: VariantId) -> Result<StockLevel> {
        availability::current_stock_level(self.catalog.as_ref(), &self.ledger, variant_id).await
    }

    pub fn has_active_reservations(&self, session_id: &SessionId) -> bool {
        self.ledger.count_active_for_session(session_id) > 0
    }

    pub fn reservation(&self, id: Uuid) -> Option<Reservation> {
        self.ledger.get(id)
    }

    pub fn reservations_for_session(&self, session_id: &SessionId) -> Vec<Reservation> {
        self.ledger.for_session(session_id)
    }

    pub fn reservations(&self) -> Vec<Reservation> {
        self.ledger.snapshot()
    }

    async fn variant(&self, variant_id: VariantId) -> Result<VariantStock> {
        self.catalog
            .get_variant(variant_id)
            .await?
            .ok_or(InventoryError::NotFound { variant_id })
    }
}
