//! External collaborator seams.
//!
//! The engine talks to carriers, shipping raters, coupon catalogs, and the
//! audit-history pipeline through these traits; in-memory implementations
//! back the tests and double as sensible defaults for local runs. The
//! engine only ever records an already-authenticated [`Actor`]; it performs
//! no authentication of its own.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopkeep_core::Actor;
use shopkeep_orders::{Coupon, Money, ShippingAddress};
use thiserror::Error;

/// One audit-trail line for an entity mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub entity_id: String,
    pub action: String,
    pub description: String,
    pub actor: Actor,
    pub metadata: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        entity_id: impl Into<String>,
        action: impl Into<String>,
        description: impl Into<String>,
        actor: Actor,
        metadata: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            action: action.into(),
            description: description.into(),
            actor,
            metadata,
            recorded_at: now,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("history sink error: {0}")]
pub struct HistoryError(pub String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("carrier error: {0}")]
pub struct CarrierError(pub String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("shipping quote error: {0}")]
pub struct QuoteError(pub String);

/// Audit-history delivery. Failures are logged and never block the
/// mutation that produced the entry.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record_history(&self, entry: HistoryEntry) -> Result<(), HistoryError>;
}

/// Label purchase request sent to a carrier integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentRequest {
    pub order_id: String,
    pub carrier: String,
    pub service: String,
    pub weight_grams: u32,
    pub destination: ShippingAddress,
}

/// Purchased label, as returned by the carrier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentLabel {
    pub tracking_number: String,
    pub carrier: String,
    pub weight_grams: u32,
}

#[async_trait]
pub trait CarrierService: Send + Sync {
    async fn create_shipment(&self, request: &ShipmentRequest) -> Result<ShipmentLabel, CarrierError>;
}

/// Shipping cost oracle, consulted only when an order's address changes.
#[async_trait]
pub trait ShippingQuoter: Send + Sync {
    async fn quote(&self, address: &ShippingAddress) -> Result<Money, QuoteError>;
}

/// Coupon lookup. Discount values always come from the catalog, never from
/// the caller.
#[async_trait]
pub trait CouponCatalog: Send + Sync {
    async fn resolve(&self, code: &str) -> Option<Coupon>;
}

/// History sink that keeps entries in memory, for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryHistorySink {
    entries: Mutex<Vec<HistoryEntry>>,
    fail: std::sync::atomic::AtomicBool,
}

impl InMemoryHistorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent delivery fail, to exercise the
    /// log-and-continue policy.
    pub fn fail_deliveries(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl HistorySink for InMemoryHistorySink {
    async fn record_history(&self, entry: HistoryEntry) -> Result<(), HistoryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HistoryError("sink unavailable".into()));
        }
        self.entries
            .lock()
            .map_err(|_| HistoryError("sink lock poisoned".into()))?
            .push(entry);
        Ok(())
    }
}

/// Carrier stub that issues sequential tracking numbers.
#[derive(Debug, Default)]
pub struct InMemoryCarrier {
    sequence: AtomicU64,
    fail: std::sync::atomic::AtomicBool,
}

impl InMemoryCarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_labels(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CarrierService for InMemoryCarrier {
    async fn create_shipment(&self, request: &ShipmentRequest) -> Result<ShipmentLabel, CarrierError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CarrierError("label API unavailable".into()));
        }
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ShipmentLabel {
            tracking_number: format!("TRK-{seq:08}"),
            carrier: request.carrier.clone(),
            weight_grams: request.weight_grams,
        })
    }
}

/// Flat-rate quoter that counts how often it is consulted.
#[derive(Debug)]
pub struct FlatRateQuoter {
    rate: Money,
    calls: AtomicU32,
}

impl FlatRateQuoter {
    pub fn new(rate: Money) -> Self {
        Self {
            rate,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShippingQuoter for FlatRateQuoter {
    async fn quote(&self, _address: &ShippingAddress) -> Result<Money, QuoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rate)
    }
}

/// Coupon catalog backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryCouponCatalog {
    coupons: HashMap<String, Coupon>,
}

impl InMemoryCouponCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_coupon(mut self, coupon: Coupon) -> Self {
        self.coupons.insert(coupon.code.clone(), coupon);
        self
    }
}

#[async_trait]
impl CouponCatalog for InMemoryCouponCatalog {
    async fn resolve(&self, code: &str) -> Option<Coupon> {
        self.coupons.get(code).cloned()
    }
}
