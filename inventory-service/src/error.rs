use shared::{ReservationStatus, SessionId, TransitionError, VariantId};
use std::time::Duration;
use tracing::error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, InventoryError>;

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("insufficient stock for variant {variant_id}: requested {requested}, available {available}")]
    InsufficientStock {
        variant_id: VariantId,
        requested: i32,
        available: i32,
    },

    #[error("variant not found: {variant_id}")]
    NotFound { variant_id: VariantId },

    #[error("quantity must be positive, got {quantity}")]
    InvalidQuantity { quantity: i32 },

    #[error("restocking variant {variant_id} by {quantity} overflows on-hand quantity {on_hand}")]
    StockOverflow {
        variant_id: VariantId,
        on_hand: i32,
        quantity: i32,
    },

    #[error("checkout has no lines")]
    EmptyCheckout,

    #[error("session {session_id} has no active reservations")]
    NoActiveReservations { session_id: SessionId },

    #[error("timed out after {waited:?} waiting for lock on variant {variant_id}")]
    LockTimeout { variant_id: VariantId, waited: Duration },

    #[error("reservation {reservation_id} is not in the ledger")]
    UnknownReservation { reservation_id: Uuid },

    #[error("reservation {reservation_id} is {status}, not active")]
    ReservationNotActive {
        reservation_id: Uuid,
        status: ReservationStatus,
    },

    /// A terminal reservation was asked to change status. This is a logic
    /// defect, never an expected outcome.
    #[error("reservation {reservation_id} cannot move from {from} to {to}")]
    IllegalTransition {
        reservation_id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("catalog error: {0}")]
    Catalog(#[from] anyhow::Error),
}

impl From<TransitionError> for InventoryError {
    fn from(e: TransitionError) -> Self {
        InventoryError::IllegalTransition {
            reservation_id: e.reservation_id,
            from: e.from,
            to: e.to,
        }
    }
}

impl InventoryError {
    /// Business-rule failures callers are expected to see under contention.
    pub fn is_insufficient_stock(&self) -> bool {
        matches!(self, InventoryError::InsufficientStock { .. })
    }

    /// Transitions are only attempted on rows read as Active under the
    /// variant lock, so an `IllegalTransition` reaching a caller means the
    /// ledger and its lock protocol disagree. Debug builds stop here.
    pub(crate) fn flag_defect(&self) {
        if let InventoryError::IllegalTransition { .. } = self {
            error!("Ledger invariant violated: {}", self);
            debug_assert!(false, "{}", self);
        }
    }
}
