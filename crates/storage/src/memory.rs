use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use shopkeep_core::{ExpectedVersion, OrderId, Sku, Versioned};
use shopkeep_inventory::{InventoryKey, InventoryRecord, StockAdjustment};
use shopkeep_orders::Order;

use crate::coordinator::TransactionBackend;
use crate::error::StoreError;
use crate::store::{InventoryStore, OrderStore};

/// Inventory records and their ledger live under one lock so that a quantity
/// update and its ledger entry commit together or not at all.
#[derive(Debug, Default)]
struct InventoryTables {
    records: HashMap<InventoryKey, InventoryRecord>,
    ledger: HashMap<InventoryKey, Vec<StockAdjustment>>,
}

/// In-memory document store backend.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug)]
pub struct InMemoryBackend {
    orders: RwLock<HashMap<OrderId, Order>>,
    inventory: RwLock<InventoryTables>,
    transactions_supported: bool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
            inventory: RwLock::new(InventoryTables::default()),
            transactions_supported: true,
        }
    }

    /// Backend variant that reports no multi-document transaction support,
    /// for exercising the coordinator's degraded mode.
    pub fn without_transaction_support() -> Self {
        Self {
            transactions_supported: false,
            ..Self::new()
        }
    }

    fn check_version(expected: ExpectedVersion, actual: u64) -> Result<(), StoreError> {
        if expected.matches(actual) {
            return Ok(());
        }
        let expected = match expected {
            ExpectedVersion::Exact(v) => v,
            ExpectedVersion::Any => actual,
        };
        Err(StoreError::VersionConflict { expected, actual })
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned(_: impl core::fmt::Debug) -> StoreError {
    StoreError::backend("lock poisoned")
}

#[async_trait]
impl OrderStore for InMemoryBackend {
    async fn get(&self, id: OrderId) -> Result<Order, StoreError> {
        let orders = self.orders.read().map_err(poisoned)?;
        orders.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn insert(&self, order: Order) -> Result<Order, StoreError> {
        let mut orders = self.orders.write().map_err(poisoned)?;
        if orders.contains_key(&order.id) {
            return Err(StoreError::backend(format!(
                "order {} already exists",
                order.id
            )));
        }
        orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn update(
        &self,
        mut order: Order,
        expected: ExpectedVersion,
    ) -> Result<Order, StoreError> {
        let mut orders = self.orders.write().map_err(poisoned)?;
        let stored = orders.get(&order.id).ok_or(StoreError::NotFound)?;

        Self::check_version(expected, stored.version())?;

        order.version = stored.version();
        order.bump_version();
        orders.insert(order.id, order.clone());
        Ok(order)
    }
}

#[async_trait]
impl InventoryStore for InMemoryBackend {
    async fn get(&self, key: &InventoryKey) -> Result<InventoryRecord, StoreError> {
        let tables = self.inventory.read().map_err(poisoned)?;
        tables.records.get(key).cloned().ok_or(StoreError::NotFound)
    }

    async fn find_by_sku(&self, sku: &Sku) -> Result<InventoryRecord, StoreError> {
        let tables = self.inventory.read().map_err(poisoned)?;
        tables
            .records
            .values()
            .find(|r| &r.sku == sku)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn insert(&self, record: InventoryRecord) -> Result<InventoryRecord, StoreError> {
        let mut tables = self.inventory.write().map_err(poisoned)?;
        if tables.records.contains_key(&record.key) {
            return Err(StoreError::backend(format!(
                "inventory record {} already exists",
                record.key
            )));
        }
        tables.records.insert(record.key, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        mut record: InventoryRecord,
        expected: ExpectedVersion,
    ) -> Result<InventoryRecord, StoreError> {
        let mut tables = self.inventory.write().map_err(poisoned)?;
        let stored = tables.records.get(&record.key).ok_or(StoreError::NotFound)?;

        Self::check_version(expected, stored.version())?;

        record.version = stored.version();
        record.bump_version();
        tables.records.insert(record.key, record.clone());
        Ok(record)
    }

    async fn commit_adjustment(
        &self,
        mut record: InventoryRecord,
        entry: StockAdjustment,
        expected: ExpectedVersion,
    ) -> Result<InventoryRecord, StoreError> {
        // One write-lock acquisition covers the version check, the ledger
        // append, and the quantity update.
        let mut tables = self.inventory.write().map_err(poisoned)?;
        let stored = tables.records.get(&record.key).ok_or(StoreError::NotFound)?;

        Self::check_version(expected, stored.version())?;

        record.version = stored.version();
        record.bump_version();
        tables.ledger.entry(record.key).or_default().push(entry);
        tables.records.insert(record.key, record.clone());
        Ok(record)
    }

    async fn adjustments(&self, key: &InventoryKey) -> Result<Vec<StockAdjustment>, StoreError> {
        let tables = self.inventory.read().map_err(poisoned)?;
        Ok(tables.ledger.get(key).cloned().unwrap_or_default())
    }

    async fn low_stock(
        &self,
        threshold: i64,
        include_out_of_stock: bool,
    ) -> Result<Vec<InventoryRecord>, StoreError> {
        let tables = self.inventory.read().map_err(poisoned)?;
        let mut hits: Vec<InventoryRecord> = tables
            .records
            .values()
            .filter(|r| r.available_quantity() <= threshold)
            .filter(|r| include_out_of_stock || r.stock_quantity > 0)
            .cloned()
            .collect();
        hits.sort_by_key(|r| r.available_quantity());
        Ok(hits)
    }

    async fn list(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        let tables = self.inventory.read().map_err(poisoned)?;
        Ok(tables.records.values().cloned().collect())
    }
}

#[async_trait]
impl TransactionBackend for InMemoryBackend {
    async fn probe_transaction_support(&self) -> Result<bool, StoreError> {
        Ok(self.transactions_supported)
    }
}
