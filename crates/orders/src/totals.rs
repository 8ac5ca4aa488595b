//! Totals recalculation engine.
//!
//! Pure functions only: money totals are always derived here, never accepted
//! from a caller. Amounts are in the smallest currency unit (e.g., cents).

use serde::{Deserialize, Serialize};

use shopkeep_core::{DomainError, DomainResult};

use crate::order::OrderItem;

/// Monetary amount in the smallest currency unit.
pub type Money = u64;

/// Derived money totals for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Money,
    pub shipping_total: Money,
    pub discount_total: Money,
    pub grand_total: Money,
}

/// Recompute an order's totals.
///
/// - `subtotal` is the sum of line totals.
/// - `shipping_total` takes `requoted_shipping` when the caller fetched a
///   fresh quote (address changed); otherwise the stored value is preserved
///   to avoid spurious carrier re-quotes.
/// - `discount_total` is clamped to `[0, subtotal + shipping_total]`.
/// - `grand_total = subtotal + shipping_total − discount_total`, which cannot
///   go negative once the discount is clamped.
///
/// Idempotent: identical inputs always produce identical outputs.
pub fn recalc_totals(
    items: &[OrderItem],
    current_shipping_total: Money,
    requoted_shipping: Option<Money>,
    discount_total: Money,
) -> Totals {
    let subtotal = items
        .iter()
        .fold(0u64, |acc, item| acc.saturating_add(item.line_total()));

    let shipping_total = requoted_shipping.unwrap_or(current_shipping_total);

    let ceiling = subtotal.saturating_add(shipping_total);
    let discount_total = discount_total.min(ceiling);

    Totals {
        subtotal,
        shipping_total,
        discount_total,
        grand_total: ceiling - discount_total,
    }
}

/// Discount carried by a coupon code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouponValue {
    /// Flat amount off, in minor units.
    Fixed(Money),
    /// Percentage off the pre-discount total (0..=100).
    Percent(u8),
}

/// A resolved coupon. Codes are resolved by the catalog collaborator; the
/// engine never trusts a caller-supplied discount amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub value: CouponValue,
}

impl Coupon {
    pub fn new(code: impl Into<String>, value: CouponValue) -> DomainResult<Self> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(DomainError::validation("coupon code cannot be empty"));
        }
        if let CouponValue::Percent(pct) = value {
            if pct > 100 {
                return Err(DomainError::validation(format!(
                    "coupon percentage must be 0..=100, got {pct}"
                )));
            }
        }
        Ok(Self { code, value })
    }

    /// Raw discount against a pre-discount base; the totals engine clamps it.
    pub fn discount_for(&self, base: Money) -> Money {
        match self.value {
            CouponValue::Fixed(amount) => amount,
            CouponValue::Percent(pct) => base.saturating_mul(u64::from(pct)) / 100,
        }
    }
}
