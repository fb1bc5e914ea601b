use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use shared::{Reservation, ReservationStatus, SessionId, VariantId};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{InventoryError, Result};

/// Every reservation ever written, indexed by session and by variant.
///
/// The ledger's own lock only guards memory. Callers that read availability
/// and then write must hold the variant lock from [`crate::locks`] across
/// both steps.
#[derive(Debug, Default)]
pub struct ReservationLedger {
    inner: RwLock<LedgerInner>,
}

#[derive(Debug, Default)]
struct LedgerInner {
    rows: HashMap<Uuid, Reservation>,
    by_session: HashMap<SessionId, Vec<Uuid>>,
    by_variant: HashMap<VariantId, Vec<Uuid>>,
}

impl LedgerInner {
    fn rows_for<'a>(&'a self, ids: Option<&'a Vec<Uuid>>) -> impl Iterator<Item = &'a Reservation> {
        ids.into_iter()
            .flatten()
            .filter_map(move |id| self.rows.get(id))
    }
}

impl ReservationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, reservation: Reservation) {
        let mut inner = self.inner.write();
        inner
            .by_session
            .entry(reservation.session_id.clone())
            .or_default()
            .push(reservation.id);
        inner
            .by_variant
            .entry(reservation.variant_id)
            .or_default()
            .push(reservation.id);
        inner.rows.insert(reservation.id, reservation);
    }

    pub fn get(&self, id: Uuid) -> Option<Reservation> {
        self.inner.read().rows.get(&id).cloned()
    }

    /// Sum of Active quantities held against `variant_id`.
    pub fn active_quantity(&self, variant_id: VariantId) -> i32 {
        let inner = self.inner.read();
        inner
            .rows_for(inner.by_variant.get(&variant_id))
            .filter(|r| r.is_active())
            .map(|r| r.quantity)
            .sum()
    }

    pub fn for_session(&self, session_id: &SessionId) -> Vec<Reservation> {
        let inner = self.inner.read();
        inner
            .rows_for(inner.by_session.get(session_id))
            .cloned()
            .collect()
    }

    pub fn active_for_session(&self, session_id: &SessionId) -> Vec<Reservation> {
        let inner = self.inner.read();
        inner
            .rows_for(inner.by_session.get(session_id))
            .filter(|r| r.is_active())
            .cloned()
            .collect()
    }

    pub fn count_active_for_session(&self, session_id: &SessionId) -> usize {
        let inner = self.inner.read();
        inner
            .rows_for(inner.by_session.get(session_id))
            .filter(|r| r.is_active())
            .count()
    }

    /// Active rows whose expiry time is strictly before `now`, ordered by
    /// variant so the sweeper visits locks in the same order as checkout.
    pub fn expired_candidates(&self, now: DateTime<Utc>) -> Vec<(Uuid, VariantId)> {
        let inner = self.inner.read();
        let mut candidates: Vec<(Uuid, VariantId)> = inner
            .rows
            .values()
            .filter(|r| r.is_expired_at(now))
            .map(|r| (r.id, r.variant_id))
            .collect();
        candidates.sort_by_key(|(id, variant_id)| (*variant_id, *id));
        candidates
    }

    pub fn complete(&self, id: Uuid) -> Result<Reservation> {
        self.apply(id, Reservation::complete)
    }

    pub fn cancel(&self, id: Uuid) -> Result<Reservation> {
        self.apply(id, Reservation::cancel)
    }

    /// Expires `id` if it is still Active and past due at `now`. Returns
    /// whether the row changed; a row that another path already finished is
    /// left alone.
    pub fn expire_if_due(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.write();
        match inner.rows.get_mut(&id) {
            Some(row) if row.is_expired_at(now) => {
                row.expire()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Cancels the Active rows of `session_id` on one variant.
    pub fn cancel_session_on_variant(
        &self,
        session_id: &SessionId,
        variant_id: VariantId,
    ) -> Result<Vec<Reservation>> {
        let mut inner = self.inner.write();
        let ids: Vec<Uuid> = inner.by_session.get(session_id).cloned().unwrap_or_default();
        let mut cancelled = Vec::new();
        for id in ids {
            if let Some(row) = inner.rows.get_mut(&id) {
                if row.variant_id == variant_id && row.status == ReservationStatus::Active {
                    row.cancel()?;
                    cancelled.push(row.clone());
                }
            }
        }
        Ok(cancelled)
    }

    pub fn len(&self) -> usize {
        self.inner.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().rows.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Reservation> {
        let mut rows: Vec<Reservation> = self.inner.read().rows.values().cloned().collect();
        rows.sort_by_key(|r| (r.created_at, r.id));
        rows
    }

    fn apply<F>(&self, id: Uuid, transition: F) -> Result<Reservation>
    where
        F: FnOnce(&mut Reservation) -> std::result::Result<(), shared::TransitionError>,
    {
        let mut inner = self.inner.write();
        let row = inner
            .rows
            .get_mut(&id)
            .ok_or(InventoryError::UnknownReservation { reservation_id: id })?;
        transition(row)?;
        Ok(row.clone())
    }
}
