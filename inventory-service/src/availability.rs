use shared::VariantId;

use crate::catalog::Catalog;
use crate::error::{InventoryError, Result};
use crate::ledger::ReservationLedger;
use crate::models::{StockLevel, VariantStock};

/// `on_hand - Σ active`. Never negative while the no-oversell invariant holds.
pub fn available(variant: &VariantStock, ledger: &ReservationLedger) -> i32 {
    stock_level(variant, ledger).available
}

pub fn stock_level(variant: &VariantStock, ledger: &ReservationLedger) -> StockLevel {
    let reserved = ledger.active_quantity(variant.id);
    StockLevel {
        variant_id: variant.id,
        on_hand: variant.on_hand_quantity,
        reserved,
        available: variant.on_hand_quantity - reserved,
    }
}

/// Looks the variant up and derives its stock level. Read outside a variant
/// lock the answer is advisory only.
pub async fn current_stock_level(
    catalog: &dyn Catalog,
    ledger: &ReservationLedger,
    variant_id: VariantId,
) -> Result<StockLevel> {
    let variant = catalog
        .get_variant(variant_id)
        .await?
        .ok_or(InventoryError::NotFound { variant_id })?;
    Ok(stock_level(&variant, ledger))
}
