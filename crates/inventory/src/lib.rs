//! Inventory domain module.
//!
//! This crate contains business rules for inventory, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage): the stock record
//! with its reservation semantics and the append-only adjustment ledger
//! entries.

pub mod adjustment;
pub mod record;

pub use adjustment::{import_delta, AdjustmentKind, ImportMode, ImportRow, StockAdjustment};
pub use record::{InventoryKey, InventoryRecord};
