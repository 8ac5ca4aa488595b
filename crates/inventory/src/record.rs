use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopkeep_core::{DomainError, DomainResult, ProductId, Sku, VariantId, Versioned};

use crate::adjustment::AdjustmentKind;

/// Identity of an inventory record: one per (product, optional variant).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InventoryKey {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
}

impl InventoryKey {
    pub fn product(product_id: ProductId) -> Self {
        Self {
            product_id,
            variant_id: None,
        }
    }

    pub fn variant(product_id: ProductId, variant_id: VariantId) -> Self {
        Self {
            product_id,
            variant_id: Some(variant_id),
        }
    }
}

impl core::fmt::Display for InventoryKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.variant_id {
            Some(variant_id) => write!(f, "{}/{}", self.product_id, variant_id),
            None => core::fmt::Display::fmt(&self.product_id, f),
        }
    }
}

/// Stock state for one product or variant.
///
/// `available_quantity` (stock − reserved) must not go negative except
/// transiently through an explicit correction adjustment. Records are never
/// deleted, only zeroed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub key: InventoryKey,
    pub sku: Sku,
    pub stock_quantity: i64,
    pub reserved_quantity: i64,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    /// Created alongside the product/variant, with empty stock.
    pub fn new(key: InventoryKey, sku: Sku, now: DateTime<Utc>) -> Self {
        Self {
            key,
            sku,
            stock_quantity: 0,
            reserved_quantity: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn available_quantity(&self) -> i64 {
        self.stock_quantity - self.reserved_quantity
    }

    /// Compute the stock level a signed delta would land on.
    ///
    /// For every kind except `Correction`, the adjustment is rejected with
    /// `InsufficientStock` when the resulting available quantity would be
    /// negative. Corrections bypass the guard: the administrative override
    /// is deliberate and must not be silently "fixed".
    pub fn plan_adjustment(&self, delta: i64, kind: AdjustmentKind) -> DomainResult<i64> {
        let new_stock = self.stock_quantity + delta;
        let new_available = new_stock - self.reserved_quantity;

        if kind != AdjustmentKind::Correction && new_available < 0 {
            return Err(DomainError::InsufficientStock {
                sku: self.sku.to_string(),
                requested: delta,
                available: self.available_quantity(),
            });
        }

        Ok(new_stock)
    }

    /// Apply a signed delta (guarded by `plan_adjustment`).
    pub fn apply_adjustment(
        &mut self,
        delta: i64,
        kind: AdjustmentKind,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.stock_quantity = self.plan_adjustment(delta, kind)?;
        self.updated_at = now;
        Ok(())
    }

    /// Hold stock for a placed order. Touches `reserved_quantity` only.
    pub fn reserve(&mut self, quantity: u32, now: DateTime<Utc>) -> DomainResult<()> {
        let quantity = i64::from(quantity);
        if quantity > self.available_quantity() {
            return Err(DomainError::InsufficientStock {
                sku: self.sku.to_string(),
                requested: quantity,
                available: self.available_quantity(),
            });
        }
        self.reserved_quantity += quantity;
        self.updated_at = now;
        Ok(())
    }

    /// Release a hold (order cancelled).
    pub fn release(&mut self, quantity: u32, now: DateTime<Utc>) -> DomainResult<()> {
        let quantity = i64::from(quantity);
        if quantity > self.reserved_quantity {
            return Err(DomainError::validation(format!(
                "cannot release {quantity} from '{}': only {} reserved",
                self.sku, self.reserved_quantity
            )));
        }
        self.reserved_quantity -= quantity;
        self.updated_at = now;
        Ok(())
    }

    /// Consume a hold on shipment: stock and reservation move together.
    pub fn fulfill(&mut self, quantity: u32, now: DateTime<Utc>) -> DomainResult<()> {
        let quantity = i64::from(quantity);
        if quantity > self.reserved_quantity {
            return Err(DomainError::validation(format!(
                "cannot fulfill {quantity} from '{}': only {} reserved",
                self.sku, self.reserved_quantity
            )));
        }
        self.stock_quantity -= quantity;
        self.reserved_quantity -= quantity;
        self.updated_at = now;
        Ok(())
    }

    /// Records are never deleted; retiring a product zeroes its quantities.
    pub fn zero(&mut self, now: DateTime<Utc>) {
        self.stock_quantity = 0;
        self.reserved_quantity = 0;
        self.updated_at = now;
    }
}

impl Versioned for InventoryRecord {
    fn version(&self) -> u64 {
        self.version
    }

    fn bump_version(&mut self) {
        self.version += 1;
    }
}
