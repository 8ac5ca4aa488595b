//! Inventory mutation and query orchestration.
//!
//! Every stock change flows through the append-only adjustment ledger: the
//! service plans the delta against the current record, then commits the
//! ledger entry and the updated aggregate quantity as one storage write.
//! Reservation changes touch only `reserved_quantity` and bypass the ledger.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use shopkeep_cache::{CacheKind, QueryCache};
use shopkeep_core::{Actor, ActorId, DomainError, ExpectedVersion, ProductId, Sku};
use shopkeep_inventory::{
    AdjustmentKind, ImportMode, ImportRow, InventoryKey, InventoryRecord, StockAdjustment,
    import_delta,
};
use shopkeep_storage::{
    InventoryStore, StoreError, TransactionBackend, TransactionCoordinator,
};
use tracing::{info, warn};

use crate::collaborators::{HistoryEntry, HistorySink};
use crate::error::EngineError;

/// Outcome of a bulk stock import: row independence means one report, not
/// one error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportReport {
    pub processed: u32,
    pub failed: Vec<ImportRowError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRowError {
    pub row: usize,
    pub sku: Sku,
    pub code: String,
    pub message: String,
}

/// Days-until-stockout estimate derived from recent order outflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockoutForecast {
    pub key: InventoryKey,
    pub sku: Sku,
    pub available: i64,
    /// Total order-driven outflow over the sampled window.
    pub window_outflow: i64,
    /// `None` when nothing left in the window to extrapolate from.
    pub days_until_stockout: Option<i64>,
}

pub struct InventoryService<S> {
    store: S,
    coordinator: Arc<TransactionCoordinator<S>>,
    cache: Arc<QueryCache>,
    history: Arc<dyn HistorySink>,
}

impl<S> InventoryService<S>
where
    S: InventoryStore + TransactionBackend + Clone + Send + Sync + 'static,
{
    pub fn new(
        store: S,
        coordinator: Arc<TransactionCoordinator<S>>,
        cache: Arc<QueryCache>,
        history: Arc<dyn HistorySink>,
    ) -> Self {
        Self {
            store,
            coordinator,
            cache,
            history,
        }
    }

    /// Start tracking stock for a product/variant, at zero quantity.
    pub async fn register_item(
        &self,
        key: InventoryKey,
        sku: Sku,
        actor: &Actor,
    ) -> Result<InventoryRecord, EngineError> {
        let record = self
            .store
            .insert(InventoryRecord::new(key, sku.clone(), Utc::now()))
            .await?;
        self.append_history(HistoryEntry::new(
            key.to_string(),
            "inventory_registered",
            format!("started tracking sku {sku}"),
            actor.clone(),
            serde_json::json!({ "sku": sku }),
            Utc::now(),
        ))
        .await;
        Ok(record)
    }

    pub async fn get(&self, key: &InventoryKey) -> Result<InventoryRecord, EngineError> {
        Ok(self.store.get(key).await?)
    }

    pub async fn adjustment_history(
        &self,
        key: &InventoryKey,
    ) -> Result<Vec<StockAdjustment>, EngineError> {
        Ok(self.store.adjustments(key).await?)
    }

    /// Apply a signed manual/correction delta against the caller's expected
    /// version, committing the ledger entry atomically with the new
    /// quantity.
    pub async fn adjust_stock(
        &self,
        key: InventoryKey,
        delta: i64,
        kind: AdjustmentKind,
        reason: &str,
        expected_version: u64,
        actor: &Actor,
    ) -> Result<InventoryRecord, EngineError> {
        if delta == 0 {
            return Err(DomainError::validation("adjustment delta must be non-zero").into());
        }
        if reason.trim().is_empty() {
            return Err(DomainError::validation("adjustment reason cannot be empty").into());
        }

        let store = self.store.clone();
        let actor_id = actor.id;
        let reason_owned = reason.to_string();
        let record = self
            .coordinator
            .with_transaction(|| {
                let store = store.clone();
                let reason = reason_owned.clone();
                async move {
                    let now = Utc::now();
                    let mut record = store.get(&key).await?;
                    record.apply_adjustment(delta, kind, now)?;
                    let entry = StockAdjustment::new(key, delta, kind, reason, actor_id, now);
                    let record = store
                        .commit_adjustment(record, entry, ExpectedVersion::Exact(expected_version))
                        .await?;
                    Ok::<_, EngineError>(record)
                }
            })
            .await?;

        self.cache.invalidate_by_product(key.product_id);
        self.append_history(HistoryEntry::new(
            key.to_string(),
            "stock_adjusted",
            format!("{} adjustment of {delta}", kind.as_str()),
            actor.clone(),
            serde_json::json!({
                "delta": delta,
                "kind": kind,
                "stock_quantity": record.stock_quantity,
            }),
            Utc::now(),
        ))
        .await;
        Ok(record)
    }

    /// Import stock levels by SKU. Rows fail independently; a zero computed
    /// delta counts as processed without touching the ledger.
    pub async fn bulk_import(
        &self,
        rows: &[ImportRow],
        mode: ImportMode,
        actor: &Actor,
    ) -> Result<ImportReport, EngineError> {
        let mut report = ImportReport::default();

        for (index, row) in rows.iter().enumerate() {
            match self.import_row(row, mode, actor).await {
                Ok(()) => report.processed += 1,
                Err(err) => report.failed.push(ImportRowError {
                    row: index,
                    sku: row.sku.clone(),
                    code: err.code().to_string(),
                    message: err.to_string(),
                }),
            }
        }

        // Imports can touch any number of products; flush everything.
        self.cache.invalidate_all();
        info!(
            processed = report.processed,
            failed = report.failed.len(),
            mode = ?mode,
            "bulk stock import finished"
        );
        self.append_history(HistoryEntry::new(
            "inventory",
            "bulk_import",
            format!(
                "imported {} rows ({} failed)",
                report.processed,
                report.failed.len()
            ),
            actor.clone(),
            serde_json::json!({ "mode": mode, "processed": report.processed }),
            Utc::now(),
        ))
        .await;
        Ok(report)
    }

    async fn import_row(
        &self,
        row: &ImportRow,
        mode: ImportMode,
        actor: &Actor,
    ) -> Result<(), EngineError> {
        let record = self.store.find_by_sku(&row.sku).await?;
        let delta = import_delta(mode, record.stock_quantity, row.quantity);
        if delta == 0 {
            return Ok(());
        }

        let store = self.store.clone();
        let actor_id = actor.id;
        let key = record.key;
        let expected = record.version;
        self.coordinator
            .with_transaction(|| {
                let store = store.clone();
                async move {
                    let now = Utc::now();
                    let mut record = store.get(&key).await?;
                    record.apply_adjustment(delta, AdjustmentKind::Import, now)?;
                    let entry = StockAdjustment::new(
                        key,
                        delta,
                        AdjustmentKind::Import,
                        "bulk import",
                        actor_id,
                        now,
                    );
                    store
                        .commit_adjustment(record, entry, ExpectedVersion::Exact(expected))
                        .await?;
                    Ok::<_, EngineError>(())
                }
            })
            .await
    }

    /// Hold stock for an order line.
    pub async fn reserve_for_order(
        &self,
        key: InventoryKey,
        quantity: u32,
        actor: &Actor,
    ) -> Result<InventoryRecord, EngineError> {
        let store = self.store.clone();
        let record = self
            .coordinator
            .with_transaction(|| {
                let store = store.clone();
                async move { reserve_line(&store, key, quantity).await }
            })
            .await?;
        self.cache.invalidate_by_product(key.product_id);
        self.append_history(HistoryEntry::new(
            key.to_string(),
            "stock_reserved",
            format!("reserved {quantity} units"),
            actor.clone(),
            serde_json::json!({ "quantity": quantity }),
            Utc::now(),
        ))
        .await;
        Ok(record)
    }

    /// Release a previously held reservation.
    pub async fn release_reservation(
        &self,
        key: InventoryKey,
        quantity: u32,
        actor: &Actor,
    ) -> Result<InventoryRecord, EngineError> {
        let store = self.store.clone();
        let record = self
            .coordinator
            .with_transaction(|| {
                let store = store.clone();
                async move {
                    let now = Utc::now();
                    let mut record = store.get(&key).await?;
                    let expected = record.version;
                    record.release(quantity, now)?;
                    let record = store
                        .update(record, ExpectedVersion::Exact(expected))
                        .await?;
                    Ok::<_, EngineError>(record)
                }
            })
            .await?;
        self.cache.invalidate_by_product(key.product_id);
        self.append_history(HistoryEntry::new(
            key.to_string(),
            "reservation_released",
            format!("released {quantity} reserved units"),
            actor.clone(),
            serde_json::json!({ "quantity": quantity }),
            Utc::now(),
        ))
        .await;
        Ok(record)
    }

    /// Ship reserved stock: decrements stock and reservation together, with
    /// a ledger entry for the stock movement.
    pub async fn fulfill(
        &self,
        key: InventoryKey,
        quantity: u32,
        reference: &str,
        actor: &Actor,
    ) -> Result<InventoryRecord, EngineError> {
        let store = self.store.clone();
        let actor_id = actor.id;
        let reference = reference.to_string();
        let record = self
            .coordinator
            .with_transaction(|| {
                let store = store.clone();
                let reference = reference.clone();
                async move {
                    fulfill_line(&store, key, quantity, actor_id, &reference)
                        .await?
                        .ok_or_else(|| EngineError::from(StoreError::NotFound))
                }
            })
            .await?;
        self.cache.invalidate_by_product(key.product_id);
        Ok(record)
    }

    /// Records at or below `threshold` available, served through the cache.
    pub async fn low_stock_items(
        &self,
        threshold: i64,
        include_out_of_stock: bool,
    ) -> Result<Vec<InventoryRecord>, EngineError> {
        self.cache
            .with_cache(
                CacheKind::LowStock,
                &(threshold, include_out_of_stock),
                || async {
                    self.store
                        .low_stock(threshold, include_out_of_stock)
                        .await
                        .map_err(EngineError::from)
                },
            )
            .await
    }

    /// Extrapolate days-until-stockout from order outflow over the last
    /// `window_days` days. Served through the cache; forecasts tolerate
    /// minutes of staleness.
    pub async fn stockout_forecast(
        &self,
        window_days: u32,
    ) -> Result<Vec<StockoutForecast>, EngineError> {
        self.cache
            .with_cache(CacheKind::StockForecast, &window_days, || async {
                self.compute_forecast(window_days).await
            })
            .await
    }

    async fn compute_forecast(
        &self,
        window_days: u32,
    ) -> Result<Vec<StockoutForecast>, EngineError> {
        let window_days = window_days.max(1);
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(window_days));
        let mut forecasts = Vec::new();

        for record in self.store.list().await? {
            let outflow: i64 = self
                .store
                .adjustments(&record.key)
                .await?
                .iter()
                .filter(|adj| {
                    adj.kind == AdjustmentKind::Order
                        && adj.quantity < 0
                        && adj.adjusted_at >= cutoff
                })
                .map(|adj| -adj.quantity)
                .sum();

            let available = record.available_quantity();
            let days_until_stockout = if outflow > 0 && available > 0 {
                Some(available * i64::from(window_days) / outflow)
            } else if outflow > 0 {
                Some(0)
            } else {
                None
            };

            forecasts.push(StockoutForecast {
                key: record.key,
                sku: record.sku.clone(),
                available,
                window_outflow: outflow,
                days_until_stockout,
            });
        }

        forecasts.sort_by_key(|f| f.days_until_stockout.unwrap_or(i64::MAX));
        Ok(forecasts)
    }

    async fn append_history(&self, entry: HistoryEntry) {
        if let Err(err) = self.history.record_history(entry).await {
            warn!(error = %err, "history delivery failed; continuing");
        }
    }
}

/// Reserve one order line against its record's current version.
pub(crate) async fn reserve_line<S: InventoryStore>(
    store: &S,
    key: InventoryKey,
    quantity: u32,
) -> Result<InventoryRecord, EngineError> {
    let now = Utc::now();
    let mut record = store.get(&key).await?;
    let expected = record.version;
    record.reserve(quantity, now)?;
    Ok(store.update(record, ExpectedVersion::Exact(expected)).await?)
}

/// Release up to `quantity` from a record's reservation, clamped to what is
/// actually held. Skips silently when the product is untracked.
pub(crate) async fn release_line_clamped<S: InventoryStore>(
    store: &S,
    key: InventoryKey,
    quantity: u32,
) -> Result<Option<ProductId>, EngineError> {
    let now = Utc::now();
    let mut record = match store.get(&key).await {
        Ok(record) => record,
        Err(StoreError::NotFound) => {
            warn!(key = %key, "no inventory record for order line; nothing to release");
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };

    let held = u32::try_from(record.reserved_quantity.max(0)).unwrap_or(u32::MAX);
    let to_release = quantity.min(held);
    if to_release == 0 {
        return Ok(None);
    }

    let expected = record.version;
    record.release(to_release, now)?;
    store.update(record, ExpectedVersion::Exact(expected)).await?;
    Ok(Some(key.product_id))
}

/// Fulfill one order line: stock and reservation down together, plus a
/// ledger entry. Returns `None` when the product is untracked.
pub(crate) async fn fulfill_line<S: InventoryStore>(
    store: &S,
    key: InventoryKey,
    quantity: u32,
    actor_id: ActorId,
    reference: &str,
) -> Result<Option<InventoryRecord>, EngineError> {
    let now = Utc::now();
    let mut record = match store.get(&key).await {
        Ok(record) => record,
        Err(StoreError::NotFound) => {
            warn!(key = %key, "no inventory record for order line; skipping fulfillment");
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };

    let expected = record.version;
    record.fulfill(quantity, now)?;
    let entry = StockAdjustment::new(
        key,
        -i64::from(quantity),
        AdjustmentKind::Order,
        format!("fulfilled for {reference}"),
        actor_id,
        now,
    );
    let record = store
        .commit_adjustment(record, entry, ExpectedVersion::Exact(expected))
        .await?;
    Ok(Some(record))
}
