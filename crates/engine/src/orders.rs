//! Order mutation orchestration.
//!
//! Every mutation reads the current document, enforces the caller's expected
//! version before any side effect, applies the validated domain change, and
//! commits through the coordinator. Losing an optimistic-concurrency race
//! surfaces as a version conflict; it is never merged away. History entries
//! are appended after the commit on a log-and-continue basis.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use shopkeep_cache::{CacheKind, QueryCache};
use shopkeep_core::{Actor, DomainError, ExpectedVersion, OrderId};
use shopkeep_inventory::InventoryKey;
use shopkeep_orders::{
    Order, OrderItem, OrderStatus, ShippingAddress, validate_transition,
};
use shopkeep_storage::{
    InventoryStore, OrderStore, StoreError, TransactionBackend, TransactionCoordinator,
};
use tracing::{info, warn};

use crate::collaborators::{
    CarrierService, CouponCatalog, HistoryEntry, HistorySink, ShipmentLabel, ShipmentRequest,
    ShippingQuoter,
};
use crate::error::EngineError;
use crate::inventory::{fulfill_line, release_line_clamped, reserve_line};

pub struct OrderService<S> {
    store: S,
    coordinator: Arc<TransactionCoordinator<S>>,
    cache: Arc<QueryCache>,
    history: Arc<dyn HistorySink>,
    carrier: Arc<dyn CarrierService>,
    quoter: Arc<dyn ShippingQuoter>,
    coupons: Arc<dyn CouponCatalog>,
}

impl<S> OrderService<S>
where
    S: OrderStore + InventoryStore + TransactionBackend + Clone + Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: S,
        coordinator: Arc<TransactionCoordinator<S>>,
        cache: Arc<QueryCache>,
        history: Arc<dyn HistorySink>,
        carrier: Arc<dyn CarrierService>,
        quoter: Arc<dyn ShippingQuoter>,
        coupons: Arc<dyn CouponCatalog>,
    ) -> Self {
        Self {
            store,
            coordinator,
            cache,
            history,
            carrier,
            quoter,
            coupons,
        }
    }

    pub async fn get(&self, order_id: OrderId) -> Result<Order, EngineError> {
        Ok(OrderStore::get(&self.store, order_id).await?)
    }

    /// Create a pending order at checkout, quoting shipping for the
    /// destination.
    pub async fn place_order(
        &self,
        items: Vec<OrderItem>,
        address: ShippingAddress,
        actor: &Actor,
    ) -> Result<Order, EngineError> {
        let shipping = self
            .quoter
            .quote(&address)
            .await
            .map_err(|err| EngineError::Quote(err.0))?;
        let order = Order::new(OrderId::new(), items, address, shipping, Utc::now())?;
        let order = OrderStore::insert(&self.store, order).await?;

        self.cache.invalidate_kind(CacheKind::Dashboard);
        self.append_history(HistoryEntry::new(
            order.id.to_string(),
            "order_placed",
            format!("order placed, grand total {}", order.grand_total),
            actor.clone(),
            serde_json::json!({ "grand_total": order.grand_total }),
            Utc::now(),
        ))
        .await;
        Ok(order)
    }

    /// Resolve a coupon code through the catalog and apply it. The discount
    /// always comes from the catalog, never the caller.
    pub async fn apply_coupon(
        &self,
        order_id: OrderId,
        expected_version: u64,
        code: &str,
        actor: &Actor,
    ) -> Result<Order, EngineError> {
        let coupon = self
            .coupons
            .resolve(code)
            .await
            .ok_or_else(|| DomainError::validation(format!("unknown coupon code: {code}")))?;

        let store = self.store.clone();
        let (order, old_discount) = self
            .coordinator
            .with_transaction(|| {
                let store = store.clone();
                let coupon = coupon.clone();
                async move {
                    let mut order = OrderStore::get(&store, order_id).await?;
                    let old_discount = order.discount_total;
                    order.apply_coupon(&coupon, Utc::now())?;
                    let order = OrderStore::update(
                        &store,
                        order,
                        ExpectedVersion::Exact(expected_version),
                    )
                    .await?;
                    Ok::<_, EngineError>((order, old_discount))
                }
            })
            .await?;

        self.cache.invalidate_kind(CacheKind::Dashboard);
        self.append_history(HistoryEntry::new(
            order.id.to_string(),
            "coupon_applied",
            format!("applied coupon {code}"),
            actor.clone(),
            serde_json::json!({
                "code": code,
                "old_discount": old_discount,
                "new_discount": order.discount_total,
            }),
            Utc::now(),
        ))
        .await;
        Ok(order)
    }

    /// Clear any applied coupon and re-derive totals.
    pub async fn remove_coupon(
        &self,
        order_id: OrderId,
        expected_version: u64,
        actor: &Actor,
    ) -> Result<Order, EngineError> {
        let store = self.store.clone();
        let (order, old_discount) = self
            .coordinator
            .with_transaction(|| {
                let store = store.clone();
                async move {
                    let mut order = OrderStore::get(&store, order_id).await?;
                    let old_discount = order.discount_total;
                    order.remove_coupon(Utc::now())?;
                    let order = OrderStore::update(
                        &store,
                        order,
                        ExpectedVersion::Exact(expected_version),
                    )
                    .await?;
                    Ok::<_, EngineError>((order, old_discount))
                }
            })
            .await?;

        self.cache.invalidate_kind(CacheKind::Dashboard);
        self.append_history(HistoryEntry::new(
            order.id.to_string(),
            "coupon_removed",
            "removed coupon",
            actor.clone(),
            serde_json::json!({ "old_discount": old_discount }),
            Utc::now(),
        ))
        .await;
        Ok(order)
    }

    /// Replace the shipping address, fetching a fresh carrier quote only
    /// when the address actually changed.
    pub async fn update_shipping_address(
        &self,
        order_id: OrderId,
        expected_version: u64,
        address: ShippingAddress,
        actor: &Actor,
    ) -> Result<Order, EngineError> {
        let current = OrderStore::get(&self.store, order_id).await?;
        let requoted = if current.shipping_address != address {
            Some(
                self.quoter
                    .quote(&address)
                    .await
                    .map_err(|err| EngineError::Quote(err.0))?,
            )
        } else {
            None
        };

        let store = self.store.clone();
        let order = self
            .coordinator
            .with_transaction(|| {
                let store = store.clone();
                let address = address.clone();
                async move {
                    let mut order = OrderStore::get(&store, order_id).await?;
                    order.set_shipping_address(address, requoted, Utc::now())?;
                    let order = OrderStore::update(
                        &store,
                        order,
                        ExpectedVersion::Exact(expected_version),
                    )
                    .await?;
                    Ok::<_, EngineError>(order)
                }
            })
            .await?;

        self.append_history(HistoryEntry::new(
            order.id.to_string(),
            "shipping_address_updated",
            if requoted.is_some() {
                "shipping address changed; shipping re-quoted"
            } else {
                "shipping address rewritten unchanged"
            },
            actor.clone(),
            serde_json::json!({ "shipping_total": order.shipping_total }),
            Utc::now(),
        ))
        .await;
        Ok(order)
    }

    /// Purchase a label and move the order from processing to shipping,
    /// fulfilling the reservation on every line.
    ///
    /// The label is purchased before the commit: a conflicting commit can
    /// orphan a label, but retrying inside the write loop would purchase
    /// duplicates.
    pub async fn create_shipment(
        &self,
        order_id: OrderId,
        expected_version: u64,
        carrier: &str,
        service: &str,
        weight_grams: u32,
        actor: &Actor,
    ) -> Result<(Order, ShipmentLabel), EngineError> {
        let order = OrderStore::get(&self.store, order_id).await?;
        require_version(&order, expected_version)?;
        validate_transition(order.status, OrderStatus::Shipping)?;

        let request = ShipmentRequest {
            order_id: order.id.to_string(),
            carrier: carrier.to_string(),
            service: service.to_string(),
            weight_grams,
            destination: order.shipping_address.clone(),
        };
        let label = self
            .carrier
            .create_shipment(&request)
            .await
            .map_err(|err| EngineError::Carrier(err.0))?;

        let store = self.store.clone();
        let tracking = label.tracking_number.clone();
        let actor_id = actor.id;
        // Lines fulfilled by a failed earlier attempt of this unit of work
        // stay fulfilled; a coordinator retry must not decrement them again.
        let fulfilled = Arc::new(AtomicUsize::new(0));
        let (order, touched) = self
            .coordinator
            .with_transaction(|| {
                let store = store.clone();
                let tracking = tracking.clone();
                let fulfilled = Arc::clone(&fulfilled);
                async move {
                    let now = Utc::now();
                    let mut order = OrderStore::get(&store, order_id).await?;
                    require_version(&order, expected_version)?;
                    validate_transition(order.status, OrderStatus::Shipping)?;

                    // Fulfill lines before committing the order so a failed
                    // fulfillment never strands a "shipping" order.
                    let reference = format!("order {}", order.id);
                    let mut touched = Vec::new();
                    for (index, item) in order.items.iter().enumerate() {
                        let key = line_key(item);
                        if index >= fulfilled.load(Ordering::SeqCst) {
                            fulfill_line(&store, key, item.quantity, actor_id, &reference)
                                .await?;
                            fulfilled.store(index + 1, Ordering::SeqCst);
                        }
                        touched.push(key.product_id);
                    }

                    order.transition_to(OrderStatus::Shipping, now)?;
                    order.record_tracking(tracking, now);
                    let order = OrderStore::update(
                        &store,
                        order,
                        ExpectedVersion::Exact(expected_version),
                    )
                    .await?;
                    Ok::<_, EngineError>((order, touched))
                }
            })
            .await?;

        for product_id in touched {
            self.cache.invalidate_by_product(product_id);
        }
        info!(
            order_id = %order.id,
            tracking_number = %label.tracking_number,
            carrier = %label.carrier,
            "shipment created"
        );
        self.append_history(HistoryEntry::new(
            order.id.to_string(),
            "shipment_created",
            format!("label purchased from {}", label.carrier),
            actor.clone(),
            serde_json::json!({
                "tracking_number": label.tracking_number,
                "carrier": label.carrier,
                "weight_grams": label.weight_grams,
            }),
            Utc::now(),
        ))
        .await;
        Ok((order, label))
    }

    /// Validated status change. Confirming reserves every line; cancelling
    /// releases whatever is still held.
    pub async fn transition_order(
        &self,
        order_id: OrderId,
        expected_version: u64,
        target: OrderStatus,
        actor: &Actor,
    ) -> Result<Order, EngineError> {
        let store = self.store.clone();
        // Lines a failed earlier attempt already committed are skipped on
        // retry so the hold is never doubled.
        let applied = Arc::new(AtomicUsize::new(0));
        let (order, from, touched) = self
            .coordinator
            .with_transaction(|| {
                let store = store.clone();
                let applied = Arc::clone(&applied);
                async move {
                    let now = Utc::now();
                    let mut order = OrderStore::get(&store, order_id).await?;
                    require_version(&order, expected_version)?;
                    let from = order.status;
                    validate_transition(from, target)?;

                    // Inventory effects first: a rejected reservation must
                    // not leave the order confirmed.
                    let mut touched = Vec::new();
                    match target {
                        OrderStatus::Confirmed => {
                            for (index, item) in order.items.iter().enumerate() {
                                let key = line_key(item);
                                if index >= applied.load(Ordering::SeqCst) {
                                    reserve_line(&store, key, item.quantity).await?;
                                    applied.store(index + 1, Ordering::SeqCst);
                                }
                                touched.push(key.product_id);
                            }
                        }
                        OrderStatus::Cancelled => {
                            for (index, item) in order.items.iter().enumerate() {
                                let key = line_key(item);
                                if index >= applied.load(Ordering::SeqCst) {
                                    release_line_clamped(&store, key, item.quantity).await?;
                                    applied.store(index + 1, Ordering::SeqCst);
                                }
                                touched.push(key.product_id);
                            }
                        }
                        _ => {}
                    }

                    order.transition_to(target, now)?;
                    let order = OrderStore::update(
                        &store,
                        order,
                        ExpectedVersion::Exact(expected_version),
                    )
                    .await?;
                    Ok::<_, EngineError>((order, from, touched))
                }
            })
            .await?;

        for product_id in touched {
            self.cache.invalidate_by_product(product_id);
        }
        self.cache.invalidate_kind(CacheKind::Dashboard);
        self.append_history(HistoryEntry::new(
            order.id.to_string(),
            "status_changed",
            format!("{from} -> {target}"),
            actor.clone(),
            serde_json::json!({ "from": from, "to": target }),
            Utc::now(),
        ))
        .await;
        Ok(order)
    }

    async fn append_history(&self, entry: HistoryEntry) {
        if let Err(err) = self.history.record_history(entry).await {
            warn!(error = %err, "history delivery failed; continuing");
        }
    }
}

/// Enforce the caller's expected version against the freshly loaded order.
/// A stale read fails here, before any inventory write is committed on the
/// order's behalf; the final update enforces the same expectation.
fn require_version(order: &Order, expected: u64) -> Result<(), StoreError> {
    if order.version == expected {
        Ok(())
    } else {
        Err(StoreError::VersionConflict {
            expected,
            actual: order.version,
        })
    }
}

fn line_key(item: &OrderItem) -> InventoryKey {
    match item.variant_id {
        Some(variant_id) => InventoryKey::variant(item.product_id, variant_id),
        None => InventoryKey::product(item.product_id),
    }
}
