//! Domain events
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::order::OrderStatus;
use crate::domain::aggregates::return_request::ReturnStatus;
use crate::domain::value_objects::{CouponCode, Money};

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Coupon(CouponEvent),
    Return(ReturnEvent),
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, user_id: Uuid, total: Money, coupon: Option<CouponCode> },
    Cancelled { order_id: Uuid, reason: String },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CouponEvent {
    Redeemed { coupon_id: Uuid, code: CouponCode, user_id: Uuid, order_id: Uuid },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReturnEvent {
    Requested { return_id: Uuid, order_id: Uuid },
    Decided { return_id: Uuid, order_id: Uuid, status: ReturnStatus },
}

impl DomainEvent {
    /// NATS subject suffix, e.g. `orders.placed`.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Order(OrderEvent::Placed { .. }) => "orders.placed",
            Self::Order(OrderEvent::Cancelled { .. }) => "orders.cancelled",
            Self::Order(OrderEvent::StatusChanged { .. }) => "orders.status_changed",
            Self::Coupon(CouponEvent::Redeemed { .. }) => "coupons.redeemed",
            Self::Return(ReturnEvent::Requested { .. }) => "returns.requested",
            Self::Return(ReturnEvent::Decided { .. }) => "returns.decided",
        }
    }
}
