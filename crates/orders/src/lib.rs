//! Order domain module.
//!
//! This crate contains business rules for orders, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage): the lifecycle
//! state machine, the totals recalculation engine, and the order records.

pub mod order;
pub mod status;
pub mod totals;

pub use order::{Order, OrderItem, ShippingAddress};
pub use status::{allowed_transitions, can_edit, ensure_editable, validate_transition, OrderStatus};
pub use totals::{recalc_totals, Coupon, CouponValue, Money, Totals};
