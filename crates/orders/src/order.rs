use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopkeep_core::{DomainError, DomainResult, OrderId, ProductId, VariantId, Versioned};

use crate::status::{ensure_editable, validate_transition, OrderStatus};
use crate::totals::{recalc_totals, Coupon, Money};

/// One line of an order: product (or variant), quantity, unit price.
///
/// Created at checkout, read by recalculation; never mutated outside the
/// owning order's edit flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    /// Positive quantity.
    pub quantity: u32,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: Money,
}

impl OrderItem {
    pub fn line_total(&self) -> Money {
        self.unit_price.saturating_mul(u64::from(self.quantity))
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        Ok(())
    }
}

/// Shipping destination. Equality drives the "address changed" check that
/// decides whether shipping gets re-quoted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

impl ShippingAddress {
    pub fn validate(&self) -> DomainResult<()> {
        if self.recipient.trim().is_empty() {
            return Err(DomainError::validation("recipient cannot be empty"));
        }
        if self.line1.trim().is_empty() {
            return Err(DomainError::validation("address line1 cannot be empty"));
        }
        if self.country.trim().is_empty() {
            return Err(DomainError::validation("country cannot be empty"));
        }
        Ok(())
    }
}

/// A versioned order document.
///
/// Money fields are always derived by the totals engine; the store bumps
/// `version` on every successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub version: u64,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub coupon_code: Option<String>,
    pub subtotal: Money,
    pub discount_total: Money,
    pub shipping_total: Money,
    pub grand_total: Money,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a pending order at checkout with derived totals.
    pub fn new(
        id: OrderId,
        items: Vec<OrderItem>,
        shipping_address: ShippingAddress,
        shipping_total: Money,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(DomainError::validation("order must have at least one item"));
        }
        for item in &items {
            item.validate()?;
        }
        shipping_address.validate()?;

        let totals = recalc_totals(&items, shipping_total, None, 0);

        Ok(Self {
            id,
            status: OrderStatus::Pending,
            version: 0,
            items,
            shipping_address,
            coupon_code: None,
            subtotal: totals.subtotal,
            discount_total: totals.discount_total,
            shipping_total: totals.shipping_total,
            grand_total: totals.grand_total,
            tracking_number: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_editable(&self) -> bool {
        crate::status::can_edit(self.status)
    }

    /// Validated status change.
    pub fn transition_to(&mut self, target: OrderStatus, now: DateTime<Utc>) -> DomainResult<()> {
        validate_transition(self.status, target)?;
        self.status = target;
        self.updated_at = now;
        Ok(())
    }

    /// Apply a resolved coupon and re-derive totals.
    pub fn apply_coupon(&mut self, coupon: &Coupon, now: DateTime<Utc>) -> DomainResult<()> {
        ensure_editable(self.status)?;

        let base = recalc_totals(&self.items, self.shipping_total, None, 0);
        let discount = coupon.discount_for(base.subtotal + base.shipping_total);

        self.coupon_code = Some(coupon.code.clone());
        self.discount_total = discount;
        self.recompute(None);
        self.updated_at = now;
        Ok(())
    }

    /// Remove any applied coupon and re-derive totals.
    pub fn remove_coupon(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        ensure_editable(self.status)?;

        self.coupon_code = None;
        self.discount_total = 0;
        self.recompute(None);
        self.updated_at = now;
        Ok(())
    }

    /// Replace the shipping address.
    ///
    /// `requoted_shipping` is `Some` only when the caller fetched a fresh
    /// carrier quote because the address actually changed.
    pub fn set_shipping_address(
        &mut self,
        address: ShippingAddress,
        requoted_shipping: Option<Money>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        ensure_editable(self.status)?;
        address.validate()?;

        self.shipping_address = address;
        self.recompute(requoted_shipping);
        self.updated_at = now;
        Ok(())
    }

    /// Record the carrier's tracking number alongside the shipping transition.
    pub fn record_tracking(&mut self, tracking_number: impl Into<String>, now: DateTime<Utc>) {
        self.tracking_number = Some(tracking_number.into());
        self.updated_at = now;
    }

    fn recompute(&mut self, requoted_shipping: Option<Money>) {
        let totals = recalc_totals(
            &self.items,
            self.shipping_total,
            requoted_shipping,
            self.discount_total,
        );
        self.subtotal = totals.subtotal;
        self.shipping_total = totals.shipping_total;
        self.discount_total = totals.discount_total;
        self.grand_total = totals.grand_total;
    }
}

impl Versioned for Order {
    fn version(&self) -> u64 {
        self.version
    }

    fn bump_version(&mut self) {
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::totals::CouponValue;

    fn test_address() -> ShippingAddress {
        ShippingAddress {
            recipient: "Jo Bloom".to_string(),
            line1: "12 Harbor Way".to_string(),
            line2: None,
            city: "Portsmouth".to_string(),
            postal_code: "PO1 2AB".to_string(),
            country: "GB".to_string(),
        }
    }

    fn test_item(quantity: u32, unit_price: Money) -> OrderItem {
        OrderItem {
            product_id: ProductId::new(),
            variant_id: None,
            quantity,
            unit_price,
        }
    }

    fn test_order() -> Order {
        Order::new(
            OrderId::new(),
            vec![test_item(2, 500), test_item(1, 250)],
            test_address(),
            300,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn new_order_derives_totals() {
        let order = test_order();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.subtotal, 1250);
        assert_eq!(order.shipping_total, 300);
        assert_eq!(order.grand_total, 1550);
        assert_eq!(order.version, 0);
    }

    #[test]
    fn order_without_items_is_rejected() {
        let err = Order::new(OrderId::new(), vec![], test_address(), 0, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn zero_quantity_item_is_rejected() {
        let err = Order::new(
            OrderId::new(),
            vec![test_item(0, 500)],
            test_address(),
            0,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn coupon_apply_and_remove_round_trip_totals() {
        let mut order = test_order();
        let coupon = Coupon::new("SAVE10", CouponValue::Percent(10)).unwrap();

        order.apply_coupon(&coupon, Utc::now()).unwrap();
        assert_eq!(order.coupon_code.as_deref(), Some("SAVE10"));
        assert_eq!(order.discount_total, 155);
        assert_eq!(order.grand_total, 1395);

        order.remove_coupon(Utc::now()).unwrap();
        assert_eq!(order.coupon_code, None);
        assert_eq!(order.discount_total, 0);
        assert_eq!(order.grand_total, 1550);
    }

    #[test]
    fn coupon_on_shipped_order_is_rejected() {
        let mut order = test_order();
        order.transition_to(OrderStatus::Confirmed, Utc::now()).unwrap();
        order.transition_to(OrderStatus::Processing, Utc::now()).unwrap();

        let coupon = Coupon::new("LATE", CouponValue::Fixed(100)).unwrap();
        let err = order.apply_coupon(&coupon, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::OrderNotEditable(_)));
    }

    #[test]
    fn address_change_with_requote_updates_shipping() {
        let mut order = test_order();
        let mut address = test_address();
        address.city = "Leeds".to_string();
        address.postal_code = "LS1 4AB".to_string();

        order
            .set_shipping_address(address, Some(450), Utc::now())
            .unwrap();
        assert_eq!(order.shipping_total, 450);
        assert_eq!(order.grand_total, 1700);
    }

    #[test]
    fn address_update_without_requote_preserves_shipping() {
        let mut order = test_order();
        let address = test_address();

        order.set_shipping_address(address, None, Utc::now()).unwrap();
        assert_eq!(order.shipping_total, 300);
        assert_eq!(order.grand_total, 1550);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut order = test_order();
        let err = order
            .transition_to(OrderStatus::Completed, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert_eq!(order.status, OrderStatus::Pending);
    }
}
