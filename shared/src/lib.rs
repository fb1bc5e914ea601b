use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantId(pub i64);

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for VariantId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Groups every reservation written by one checkout attempt.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Active,
    Completed,
    Expired,
    Cancelled,
}

impl ReservationStatus {
    /// Active is the only status a reservation can leave.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ReservationStatus::Active)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReservationStatus::Active => "ACTIVE",
            ReservationStatus::Completed => "COMPLETED",
            ReservationStatus::Expired => "EXPIRED",
            ReservationStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("reservation {reservation_id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub reservation_id: Uuid,
    pub from: ReservationStatus,
    pub to: ReservationStatus,
}

/// A time-bound hold on `quantity` units of one variant.
///
/// Rows are never deleted; a finished hold stays in the ledger with its
/// terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub variant_id: VariantId,
    pub quantity: i32,
    pub session_id: SessionId,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,
}

impl Reservation {
    pub fn new(
        variant_id: VariantId,
        quantity: i32,
        session_id: SessionId,
        created_at: DateTime<Utc>,
        expiry_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            variant_id,
            quantity,
            session_id,
            status: ReservationStatus::Active,
            created_at,
            expiry_time,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expiry_time < now
    }

    pub fn complete(&mut self) -> Result<(), TransitionError> {
        self.transition(ReservationStatus::Completed)
    }

    pub fn expire(&mut self) -> Result<(), TransitionError> {
        self.transition(ReservationStatus::Expired)
    }

    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.transition(ReservationStatus::Cancelled)
    }

    fn transition(&mut self, to: ReservationStatus) -> Result<(), TransitionError> {
        if self.status.is_terminal() || to == ReservationStatus::Active {
            return Err(TransitionError {
                reservation_id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub variant_id: VariantId,
    pub quantity: i32,
}

impl CheckoutLine {
    pub fn new(variant_id: VariantId, quantity: i32) -> Self {
        Self {
            variant_id,
            quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedItem {
    pub reservation_id: Uuid,
    pub variant_id: VariantId,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub subtotal: BigDecimal,
}

/// Result of a successful checkout preparation. All members share
/// `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationSession {
    pub session_id: SessionId,
    pub reservation_ids: Vec<Uuid>,
    pub items: Vec<ReservedItem>,
    pub total_amount: BigDecimal,
    pub expires_at: DateTime<Utc>,
    pub message: String,
}
