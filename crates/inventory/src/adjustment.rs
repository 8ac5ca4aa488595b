use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopkeep_core::{ActorId, Sku};

use crate::record::InventoryKey;

/// Why a stock quantity moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentKind {
    /// Hand-entered adjustment by an administrator.
    Manual,
    /// Bulk import row.
    Import,
    /// Administrative correction. The only kind allowed to drive available
    /// stock negative.
    Correction,
    /// Stock movement driven by an order (fulfillment, return).
    Order,
}

impl AdjustmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AdjustmentKind::Manual => "manual",
            AdjustmentKind::Import => "import",
            AdjustmentKind::Correction => "correction",
            AdjustmentKind::Order => "order",
        }
    }
}

/// Append-only ledger entry. Write-once: the current stock quantity is the
/// fold of all entries for a record, maintained incrementally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub key: InventoryKey,
    /// Signed delta applied to `stock_quantity`.
    pub quantity: i64,
    pub kind: AdjustmentKind,
    pub reason: String,
    pub adjusted_by: ActorId,
    pub adjusted_at: DateTime<Utc>,
}

impl StockAdjustment {
    pub fn new(
        key: InventoryKey,
        quantity: i64,
        kind: AdjustmentKind,
        reason: impl Into<String>,
        adjusted_by: ActorId,
        adjusted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            quantity,
            kind,
            reason: reason.into(),
            adjusted_by,
            adjusted_at,
        }
    }
}

/// How a bulk import row is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Row value is the target stock level; delta = target − current.
    Set,
    /// Row value is the delta itself.
    Add,
}

/// One row of a bulk stock import, resolved by SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRow {
    pub sku: Sku,
    pub quantity: i64,
}

/// Compute the signed delta an import row implies against current stock.
///
/// A zero result is a no-op for the caller: counted as processed, never an
/// error.
pub fn import_delta(mode: ImportMode, current_stock: i64, supplied: i64) -> i64 {
    match mode {
        ImportMode::Set => supplied - current_stock,
        ImportMode::Add => supplied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_mode_computes_delta_against_current_stock() {
        assert_eq!(import_delta(ImportMode::Set, 20, 15), -5);
        assert_eq!(import_delta(ImportMode::Set, 0, 10), 10);
        assert_eq!(import_delta(ImportMode::Set, 7, 7), 0);
    }

    #[test]
    fn add_mode_uses_supplied_value_directly() {
        assert_eq!(import_delta(ImportMode::Add, 20, 15), 15);
        assert_eq!(import_delta(ImportMode::Add, 20, -3), -3);
    }
}
