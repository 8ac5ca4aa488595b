//! Mutation and query orchestration over the order and inventory domains.
//!
//! Services here tie the pure domain crates to storage: optimistic-version
//! commits through the transaction coordinator, cache invalidation, carrier
//! and coupon collaborators, and best-effort audit history.

pub mod collaborators;
pub mod error;
pub mod inventory;
pub mod orders;
pub mod telemetry;


pub use collaborators::{
    CarrierService, CouponCatalog, FlatRateQuoter, HistoryEntry, HistorySink, InMemoryCarrier,
    InMemoryCouponCatalog, InMemoryHistorySink, ShipmentLabel, ShipmentRequest, ShippingQuoter,
};
pub use error::EngineError;
pub use inventory::{ImportReport, ImportRowError, InventoryService, StockoutForecast};
pub use orders::OrderService;
