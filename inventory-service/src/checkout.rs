use bigdecimal::BigDecimal;
use num_traits::Zero;
use shared::{CheckoutLine, ReservationSession, ReservedItem, SessionId};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{InventoryError, Result};
use crate::manager::ReservationManager;

/// Reserves a whole cart as one all-or-nothing step.
pub struct CheckoutOrchestrator {
    manager: Arc<ReservationManager>,
}

impl CheckoutOrchestrator {
    pub fn new(manager: Arc<ReservationManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<ReservationManager> {
        &self.manager
    }

    /// Holds every line for `session_id` under one shared expiry.
    ///
    /// Lines are reserved in ascending variant order regardless of cart
    /// order; two carts holding the same variants in opposite order would
    /// otherwise be able to deadlock. If any line fails, every hold written
    /// for the session is released before the error is returned.
    ///
    /// A session that still holds reservations from an earlier prepare has
    /// them released first, so re-entering checkout replaces the hold.
    pub async fn prepare(
        &self,
        lines: &[CheckoutLine],
        session_id: &SessionId,
    ) -> Result<ReservationSession> {
        debug!(
            "Preparing checkout: session_id={}, lines={}",
            session_id,
            lines.len()
        );
        if lines.is_empty() {
            return Err(InventoryError::EmptyCheckout);
        }
        if let Some(line) = lines.iter().find(|l| l.quantity <= 0) {
            return Err(InventoryError::InvalidQuantity {
                quantity: line.quantity,
            });
        }

        if self.manager.has_active_reservations(session_id) {
            let replaced = self.manager.release(session_id).await?;
            info!(
                "Replaced {} earlier reservations for session: {}",
                replaced, session_id
            );
        }

        let mut ordered = lines.to_vec();
        ordered.sort_by_key(|l| l.variant_id);

        let ttl = self.manager.config().reservation_ttl;
        let expires_at = self.manager.now() + ttl;

        let mut items = Vec::with_capacity(ordered.len());
        let mut total_amount = BigDecimal::zero();
        for line in &ordered {
            let reserved = self
                .manager
                .reserve_until(line.variant_id, line.quantity, session_id, expires_at)
                .await;
            let (reservation, variant) = match reserved {
                Ok(held) => held,
                Err(e) => {
                    warn!(
                        "Checkout failed on variant {} for session {}: {}",
                        line.variant_id, session_id, e
                    );
                    if let Err(release_err) = self.manager.release(session_id).await {
                        error!(
                            "Failed to release partial checkout for session {}: {}",
                            session_id, release_err
                        );
                    }
                    return Err(e);
                }
            };

            let subtotal = &variant.unit_price * BigDecimal::from(line.quantity);
            total_amount += subtotal.clone();
            items.push(ReservedItem {
                reservation_id: reservation.id,
                variant_id: variant.id,
                sku: variant.sku,
                quantity: line.quantity,
                unit_price: variant.unit_price,
                subtotal,
            });
        }

        info!(
            "Checkout prepared: session_id={}, items={}, expires_at={}",
            session_id,
            items.len(),
            expires_at
        );

        Ok(ReservationSession {
            session_id: session_id.clone(),
            reservation_ids: items.iter().map(|i| i.reservation_id).collect(),
            items,
            total_amount,
            expires_at,
            message: format!(
                "Stock reserved for {} minutes. Please complete your order.",
                ttl.num_minutes()
            ),
        })
    }

    /// True while at least one reservation of the session is still Active.
    pub fn verify(&self, session_id: &SessionId) -> bool {
        let valid = self.manager.has_active_reservations(session_id);
        debug!("Reservation valid: session_id={}, valid={}", session_id, valid);
        valid
    }

    pub async fn release(&self, session_id: &SessionId) -> Result<usize> {
        self.manager.release(session_id).await
    }

    pub async fn confirm(&self, session_id: &SessionId) -> Result<crate::models::ConfirmReport> {
        self.manager.confirm(session_id).await
    }
}
