//! Order Aggregate
//!
//! Lifecycle: `pending -> processing -> shipped -> delivered`, with
//! `pending | processing -> cancelled`. Delivered and cancelled are terminal.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::cart::PricedCart;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{CouponCode, Money};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    pub fn is_returnable(&self) -> bool {
        matches!(self, Self::Shipped | Self::Delivered)
    }

    /// The single forward step, if any.
    pub fn next(&self) -> Option<OrderStatus> {
        match self {
            Self::Pending => Some(Self::Processing),
            Self::Processing => Some(Self::Shipped),
            Self::Shipped => Some(Self::Delivered),
            Self::Delivered | Self::Cancelled => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

/// How strictly admin status changes are checked. Under either policy an
/// order can only be cancelled while it is pending or processing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransitionPolicy {
    /// Any forward or backward move, skipping steps, except leaving a terminal state.
    #[default]
    Permissive,
    /// Only the next forward step, or cancellation while cancellable.
    Strict,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub unit_price: Money,
    pub box_price: Money,
    pub quantity: u32,
    pub size: Option<String>,
    pub color: Option<String>,
    pub box_type: Option<String>,
    pub line_total: Money,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedCoupon {
    pub code: CouponCode,
    pub discount: Money,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub full_name: String,
    pub phone: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub discount: Money,
    pub total_amount: Money,
    pub applied_coupon: Option<AppliedCoupon>,
    pub shipping_address: ShippingAddress,
    pub status: OrderStatus,
    pub cancellation_reason: Option<String>,
    pub order_date: DateTime<Utc>,
    pub delivered_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Crockford base32, without the look-alike letters I, L, O and U.
const ORDER_NUMBER_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// `ORD-` followed by 12 random base32 characters (60 bits). Uniqueness is
/// still enforced by the store.
fn new_order_number() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..12)
        .map(|_| char::from(ORDER_NUMBER_ALPHABET[rng.gen_range(0..ORDER_NUMBER_ALPHABET.len())]))
        .collect();
    format!("ORD-{suffix}")
}

impl Order {
    /// Snapshots a priced cart into a pending order.
    pub fn place(
        user_id: Uuid,
        cart: &PricedCart,
        coupon: Option<AppliedCoupon>,
        shipping_address: ShippingAddress,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if cart.lines.is_empty() {
            return Err(OrderError::NoItems);
        }
        let items: Vec<OrderItem> = cart
            .lines
            .iter()
            .map(|l| OrderItem {
                product_id: l.item.product_id,
                name: l.name.clone(),
                image: l.image.clone(),
                unit_price: l.unit_price,
                box_price: l.item.box_price,
                quantity: l.item.quantity.value(),
                size: l.item.selected_size.clone(),
                color: l.item.selected_color.clone(),
                box_type: l.item.selected_box_type.clone(),
                line_total: l.line_total,
            })
            .collect();
        let subtotal: Money = items.iter().map(|i| i.line_total).sum();
        let discount = coupon.as_ref().map_or(Money::ZERO, |c| c.discount.min(subtotal));
        let id = Uuid::now_v7();
        let mut order = Self {
            id,
            order_number: new_order_number(),
            user_id,
            items,
            subtotal,
            discount,
            total_amount: subtotal.saturating_sub(discount),
            applied_coupon: coupon,
            shipping_address,
            status: OrderStatus::Pending,
            cancellation_reason: None,
            order_date: now,
            delivered_date: None,
            updated_at: now,
            events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_id: id,
            user_id,
            total: order.total_amount,
            coupon: order.applied_coupon.as_ref().map(|c| c.code.clone()),
        }));
        Ok(order)
    }

    /// Rebuilds an order from storage; raises no events.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid,
        order_number: String,
        user_id: Uuid,
        items: Vec<OrderItem>,
        applied_coupon: Option<AppliedCoupon>,
        shipping_address: ShippingAddress,
        status: OrderStatus,
        cancellation_reason: Option<String>,
        order_date: DateTime<Utc>,
        delivered_date: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let subtotal: Money = items.iter().map(|i| i.line_total).sum();
        let discount = applied_coupon.as_ref().map_or(Money::ZERO, |c| c.discount.min(subtotal));
        Self {
            id,
            order_number,
            user_id,
            items,
            subtotal,
            discount,
            total_amount: subtotal.saturating_sub(discount),
            applied_coupon,
            shipping_address,
            status,
            cancellation_reason,
            order_date,
            delivered_date,
            updated_at,
            events: vec![],
        }
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Customer cancellation.
    pub fn cancel(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.is_cancellable() {
            return Err(OrderError::NotCancellable(self.status));
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(OrderError::ReasonRequired);
        }
        self.status = OrderStatus::Cancelled;
        self.cancellation_reason = Some(reason.to_string());
        self.updated_at = now;
        self.raise_event(DomainEvent::Order(OrderEvent::Cancelled {
            order_id: self.id,
            reason: reason.to_string(),
        }));
        Ok(())
    }

    /// Admin status change under `policy`.
    pub fn set_status(
        &mut self,
        target: OrderStatus,
        reason: Option<&str>,
        policy: TransitionPolicy,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        let from = self.status;
        if from == target {
            return Ok(());
        }
        // Cancellation is only ever possible before shipping, whoever asks.
        let allowed = if target == OrderStatus::Cancelled {
            from.is_cancellable()
        } else {
            match policy {
                TransitionPolicy::Permissive => !from.is_terminal(),
                TransitionPolicy::Strict => from.next() == Some(target),
            }
        };
        if !allowed {
            return Err(OrderError::InvalidTransition { from, to: target });
        }
        if target == OrderStatus::Cancelled {
            let reason = reason.map(str::trim).filter(|r| !r.is_empty()).ok_or(OrderError::ReasonRequired)?;
            self.cancellation_reason = Some(reason.to_string());
        }
        if target == OrderStatus::Delivered {
            self.delivered_date = Some(now);
        }
        self.status = target;
        self.updated_at = now;
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from, to: target }));
        Ok(())
    }

    /// Checks whether a return may be filed at `now`. The window runs from
    /// the delivery date, or the order date when delivery was never
    /// recorded, and includes its last day.
    pub fn ensure_returnable(&self, now: DateTime<Utc>, window_days: i64) -> Result<(), OrderError> {
        if !self.status.is_returnable() {
            return Err(OrderError::NotReturnable(self.status));
        }
        let start = self.delivered_date.unwrap_or(self.order_date);
        if now > start + Duration::days(window_days) {
            return Err(OrderError::ReturnWindowClosed { days: window_days });
        }
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }

    fn raise_event(&mut self, e: DomainEvent) {
        self.events.push(e);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
    #[error("a reason is required")]
    ReasonRequired,
    #[error("order cannot be cancelled once {0}")]
    NotCancellable(OrderStatus),
    #[error("order cannot be returned while {0}")]
    NotReturnable(OrderStatus),
    #[error("the {days}-day return window has closed")]
    ReturnWindowClosed { days: i64 },
    #[error("cannot change order status from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

impl OrderError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoItems => "empty_cart",
            Self::ReasonRequired => "reason_required",
            Self::NotCancellable(_) => "not_cancellable",
            Self::NotReturnable(_) => "not_returnable",
            Self::ReturnWindowClosed { .. } => "return_window_closed",
            Self::InvalidTransition { .. } => "invalid_transition",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::cart::{CartItem, PricedLine};
    use crate::domain::value_objects::Quantity;

    fn priced(lines: &[(i64, i64, u32)]) -> PricedCart {
        let lines: Vec<PricedLine> = lines
            .iter()
            .map(|&(price, box_price, qty)| {
                let item = CartItem {
                    product_id: Uuid::new_v4(),
                    quantity: Quantity::new(qty).unwrap(),
                    selected_size: None,
                    selected_color: None,
                    selected_box_type: None,
                    box_price: Money::from_major(box_price),
                };
                let unit = Money::from_major(price);
                let line_total = item.line_total(unit);
                PricedLine { line_total, item, name: "Item".into(), image: None, unit_price: unit }
            })
            .collect();
        let subtotal = lines.iter().map(|l| l.line_total).sum();
        PricedCart { lines, subtotal }
    }

    fn order_with(status: OrderStatus) -> Order {
        let cart = priced(&[(500, 0, 1)]);
        let mut o = Order::place(Uuid::new_v4(), &cart, None, ShippingAddress::default(), Utc::now()).unwrap();
        o.status = status;
        o
    }

    #[test]
    fn test_total_is_lines_minus_discount() {
        let coupon = AppliedCoupon { code: CouponCode::new("SAVE20").unwrap(), discount: Money::from_major(150) };
        let cart = priced(&[(300, 50, 2), (200, 0, 1)]);
        let mut o =
            Order::place(Uuid::new_v4(), &cart, Some(coupon), ShippingAddress::default(), Utc::now()).unwrap();
        assert_eq!(o.subtotal, Money::from_major(900));
        assert_eq!(o.total_amount, Money::from_major(750));
        assert_eq!(o.status(), OrderStatus::Pending);
        assert_eq!(o.take_events().len(), 1);
    }

    #[test]
    fn test_empty_cart_cannot_be_ordered() {
        let err = Order::place(Uuid::new_v4(), &priced(&[]), None, ShippingAddress::default(), Utc::now()).unwrap_err();
        assert_eq!(err, OrderError::NoItems);
    }

    #[test]
    fn test_cancel_boundaries() {
        let now = Utc::now();
        let mut processing = order_with(OrderStatus::Processing);
        processing.cancel("changed my mind", now).unwrap();
        assert_eq!(processing.status(), OrderStatus::Cancelled);
        assert_eq!(processing.cancellation_reason.as_deref(), Some("changed my mind"));

        let mut shipped = order_with(OrderStatus::Shipped);
        assert_eq!(shipped.cancel("too late", now), Err(OrderError::NotCancellable(OrderStatus::Shipped)));
        assert_eq!(shipped.cancel("", now), Err(OrderError::NotCancellable(OrderStatus::Shipped)));

        let mut pending = order_with(OrderStatus::Pending);
        assert_eq!(pending.cancel("  ", now), Err(OrderError::ReasonRequired));
    }

    #[test]
    fn test_return_window_edges() {
        let delivered_at = Utc::now() - Duration::days(60);
        let mut o = order_with(OrderStatus::Delivered);
        o.delivered_date = Some(delivered_at);
        assert!(o.ensure_returnable(delivered_at + Duration::days(30), 30).is_ok());
        assert_eq!(
            o.ensure_returnable(delivered_at + Duration::days(31), 30),
            Err(OrderError::ReturnWindowClosed { days: 30 })
        );
    }

    #[test]
    fn test_return_window_falls_back_to_order_date() {
        let o = order_with(OrderStatus::Shipped);
        assert!(o.ensure_returnable(o.order_date + Duration::days(30), 30).is_ok());
        assert!(o.ensure_returnable(o.order_date + Duration::days(31), 30).is_err());
        let pending = order_with(OrderStatus::Pending);
        assert_eq!(pending.ensure_returnable(Utc::now(), 30), Err(OrderError::NotReturnable(OrderStatus::Pending)));
    }

    #[test]
    fn test_permissive_policy_allows_skipping() {
        let mut o = order_with(OrderStatus::Pending);
        o.set_status(OrderStatus::Delivered, None, TransitionPolicy::Permissive, Utc::now()).unwrap();
        assert!(o.delivered_date.is_some());
        let err = o.set_status(OrderStatus::Processing, None, TransitionPolicy::Permissive, Utc::now()).unwrap_err();
        assert_eq!(err, OrderError::InvalidTransition { from: OrderStatus::Delivered, to: OrderStatus::Processing });
    }

    #[test]
    fn test_admin_cannot_cancel_once_shipped() {
        for policy in [TransitionPolicy::Permissive, TransitionPolicy::Strict] {
            for status in [OrderStatus::Shipped, OrderStatus::Delivered] {
                let mut o = order_with(status);
                assert_eq!(
                    o.set_status(OrderStatus::Cancelled, Some("admin"), policy, Utc::now()),
                    Err(OrderError::InvalidTransition { from: status, to: OrderStatus::Cancelled })
                );
                assert_eq!(o.status(), status);
                assert!(o.cancellation_reason.is_none());
            }
        }

        let mut pending = order_with(OrderStatus::Pending);
        pending
            .set_status(OrderStatus::Cancelled, Some("fraud check"), TransitionPolicy::Permissive, Utc::now())
            .unwrap();
        assert_eq!(pending.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn test_order_numbers() {
        let a = order_with(OrderStatus::Pending);
        let b = order_with(OrderStatus::Pending);
        assert_ne!(a.order_number, b.order_number);
        let suffix = a.order_number.strip_prefix("ORD-").unwrap();
        assert_eq!(suffix.len(), 12);
        assert!(suffix.bytes().all(|c| ORDER_NUMBER_ALPHABET.contains(&c)));
    }

    #[test]
    fn test_strict_policy_forward_only() {
        let mut o = order_with(OrderStatus::Pending);
        assert!(o.set_status(OrderStatus::Shipped, None, TransitionPolicy::Strict, Utc::now()).is_err());
        o.set_status(OrderStatus::Processing, None, TransitionPolicy::Strict, Utc::now()).unwrap();
        assert_eq!(
            o.set_status(OrderStatus::Cancelled, None, TransitionPolicy::Strict, Utc::now()),
            Err(OrderError::ReasonRequired)
        );
        o.set_status(OrderStatus::Cancelled, Some("out of stock"), TransitionPolicy::Strict, Utc::now()).unwrap();
        assert_eq!(o.status(), OrderStatus::Cancelled);
    }
}
