use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use shared::VariantId;
use std::collections::HashMap;
use std::path::Path;

use crate::models::VariantStock;

/// The product catalog as seen by the reservation core. The only write the
/// core performs is `set_on_hand_quantity`, and only while holding the
/// variant's lock.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_variant(&self, id: VariantId) -> Result<Option<VariantStock>>;

    async fn set_on_hand_quantity(&self, id: VariantId, quantity: i32) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    variants: RwLock<HashMap<VariantId, VariantStock>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variants(variants: impl IntoIterator<Item = VariantStock>) -> Self {
        let catalog = Self::new();
        for variant in variants {
            catalog.insert(variant);
        }
        catalog
    }

    /// Loads a JSON array of variants.
    pub fn from_seed_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog seed {}", path.display()))?;
        let variants: Vec<VariantStock> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing catalog seed {}", path.display()))?;
        Ok(Self::with_variants(variants))
    }

    pub fn insert(&self, variant: VariantStock) {
        self.variants.write().insert(variant.id, variant);
    }

    pub fn remove(&self, id: VariantId) -> Option<VariantStock> {
        self.variants.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.variants.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.read().is_empty()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn get_variant(&self, id: VariantId) -> Result<Option<VariantStock>> {
        Ok(self.variants.read().get(&id).cloned())
    }

    async fn set_on_hand_quantity(&self, id: VariantId, quantity: i32) -> Result<()> {
        anyhow::ensure!(quantity >= 0, "on-hand quantity for variant {id} would be {quantity}");
        let mut variants = self.variants.write();
        let variant = variants
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("variant {id} disappeared from catalog"))?;
        variant.on_hand_quantity = quantity;
        Ok(())
    }
}
