//! Storage abstractions for versioned documents.
//!
//! ## Design principles
//!
//! - **No storage assumptions**: works with the in-memory backend (tests/dev)
//!   and future document-store backends (production)
//! - **Optimistic locking**: every write presents an `ExpectedVersion`; a
//!   stale writer gets `StoreError::VersionConflict` and must re-read
//! - **Append-only ledger**: stock adjustments are write-once; the aggregate
//!   quantity is committed together with its ledger entry
//!
//! Implementations must bump the record `version` on every successful write
//! and must never perform read-then-write outside their own atomic section.

use std::sync::Arc;

use async_trait::async_trait;

use shopkeep_core::{ExpectedVersion, OrderId, Sku};
use shopkeep_inventory::{InventoryKey, InventoryRecord, StockAdjustment};
use shopkeep_orders::Order;

use crate::error::StoreError;

/// Versioned order documents.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, id: OrderId) -> Result<Order, StoreError>;

    /// Insert a new order. Fails with `Backend` if the id already exists.
    async fn insert(&self, order: Order) -> Result<Order, StoreError>;

    /// Replace an order, enforcing optimistic concurrency against the stored
    /// version. On success the returned order carries the bumped version.
    async fn update(&self, order: Order, expected: ExpectedVersion) -> Result<Order, StoreError>;
}

/// Inventory records plus their append-only adjustment ledger.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get(&self, key: &InventoryKey) -> Result<InventoryRecord, StoreError>;

    /// Resolve a record by product or variant SKU (import flows).
    async fn find_by_sku(&self, sku: &Sku) -> Result<InventoryRecord, StoreError>;

    async fn insert(&self, record: InventoryRecord) -> Result<InventoryRecord, StoreError>;

    /// Replace a record (reservation changes), enforcing optimistic
    /// concurrency against the stored version.
    async fn update(
        &self,
        record: InventoryRecord,
        expected: ExpectedVersion,
    ) -> Result<InventoryRecord, StoreError>;

    /// Commit a quantity change together with its ledger entry: both are
    /// persisted atomically or not at all.
    async fn commit_adjustment(
        &self,
        record: InventoryRecord,
        entry: StockAdjustment,
        expected: ExpectedVersion,
    ) -> Result<InventoryRecord, StoreError>;

    /// Read the adjustment ledger for a record, oldest first.
    async fn adjustments(&self, key: &InventoryKey) -> Result<Vec<StockAdjustment>, StoreError>;

    /// Records whose available quantity is at or below `threshold`.
    /// Out-of-stock records (stock ≤ 0) are included only when requested.
    async fn low_stock(
        &self,
        threshold: i64,
        include_out_of_stock: bool,
    ) -> Result<Vec<InventoryRecord>, StoreError>;

    async fn list(&self) -> Result<Vec<InventoryRecord>, StoreError>;
}

#[async_trait]
impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    async fn get(&self, id: OrderId) -> Result<Order, StoreError> {
        (**self).get(id).await
    }

    async fn insert(&self, order: Order) -> Result<Order, StoreError> {
        (**self).insert(order).await
    }

    async fn update(&self, order: Order, expected: ExpectedVersion) -> Result<Order, StoreError> {
        (**self).update(order, expected).await
    }
}

#[async_trait]
impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    async fn get(&self, key: &InventoryKey) -> Result<InventoryRecord, StoreError> {
        (**self).get(key).await
    }

    async fn find_by_sku(&self, sku: &Sku) -> Result<InventoryRecord, StoreError> {
        (**self).find_by_sku(sku).await
    }

    async fn insert(&self, record: InventoryRecord) -> Result<InventoryRecord, StoreError> {
        (**self).insert(record).await
    }

    async fn update(
        &self,
        record: InventoryRecord,
        expected: ExpectedVersion,
    ) -> Result<InventoryRecord, StoreError> {
        (**self).update(record, expected).await
    }

    async fn commit_adjustment(
        &self,
        record: InventoryRecord,
        entry: StockAdjustment,
        expected: ExpectedVersion,
    ) -> Result<InventoryRecord, StoreError> {
        (**self).commit_adjustment(record, entry, expected).await
    }

    async fn adjustments(&self, key: &InventoryKey) -> Result<Vec<StockAdjustment>, StoreError> {
        (**self).adjustments(key).await
    }

    async fn low_stock(
        &self,
        threshold: i64,
        include_out_of_stock: bool,
    ) -> Result<Vec<InventoryRecord>, StoreError> {
        (**self).low_stock(threshold, include_out_of_stock).await
    }

    async fn list(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        (**self).list().await
    }
}
