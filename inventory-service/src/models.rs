use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use shared::VariantId;
use uuid::Uuid;

use crate::error::InventoryError;

/// The catalog's view of one variant: the stock record plus what checkout
/// needs to price a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantStock {
    pub id: VariantId,
    pub sku: String,
    pub on_hand_quantity: i32,
    pub unit_price: BigDecimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub variant_id: VariantId,
    pub on_hand: i32,
    pub reserved: i32,
    pub available: i32,
}

#[derive(Debug)]
pub struct ConfirmFailure {
    pub reservation_id: Uuid,
    pub variant_id: VariantId,
    pub error: InventoryError,
}

/// Outcome of confirming a session. Confirmation is per reservation, so a
/// report may hold both confirmed ids and failures.
#[derive(Debug, Default)]
pub struct ConfirmReport {
    pub confirmed: Vec<Uuid>,
    pub failures: Vec<ConfirmFailure>,
}

impl ConfirmReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub failed: usize,
}
