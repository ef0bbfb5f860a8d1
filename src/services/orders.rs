//! Checkout, order lifecycle and returns.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::aggregates::{
    AppliedCoupon, CartError, CouponError, Order, OrderStatus, ReturnError, ReturnRequest, ReturnStatus,
    ShippingAddress, TransitionPolicy, User,
};
use crate::domain::events::{CouponEvent, DomainEvent};
use crate::domain::value_objects::CouponCode;
use crate::events::EventPublisher;
use crate::services::carts::CartService;
use crate::services::coupons::CouponService;
use crate::store::{CouponRedemption, Page, Store, StoreError};
use crate::{EcommerceError, Result};

/// Placements tried before an order-number clash is reported.
const PLACE_ATTEMPTS: u32 = 3;

#[derive(Clone, Debug)]
pub struct PlaceOrder {
    pub shipping_address: ShippingAddress,
    pub coupon_code: Option<String>,
}

/// A new return filed by the order's owner.
#[derive(Clone, Debug, Default)]
pub struct FileReturn {
    pub reason: String,
    pub photo_urls: Vec<String>,
    pub video_url: Option<String>,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    carts: CartService,
    coupons: CouponService,
    events: EventPublisher,
    return_window_days: i64,
    policy: TransitionPolicy,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn Store>,
        events: EventPublisher,
        return_window_days: i64,
        policy: TransitionPolicy,
    ) -> Self {
        Self {
            carts: CartService::new(store.clone()),
            coupons: CouponService::new(store.clone()),
            store,
            events,
            return_window_days,
            policy,
        }
    }

    /// Turns the user's cart into a pending order. Coupon redemption, stock
    /// decrement, order insert and cart clearing commit together.
    #[tracing::instrument(skip(self, user, request), fields(user_id = %user.id))]
    pub async fn place(&self, user: &User, request: PlaceOrder) -> Result<Order> {
        let cart = self.store.get_cart(user.id).await?;
        if cart.is_empty() {
            return Err(CartError::EmptyCart.into());
        }
        let priced = self.carts.price(&cart).await?;

        let code = request.coupon_code.as_deref().map(str::trim).filter(|c| !c.is_empty());
        let coupon = match code {
            Some(raw) => {
                let code = CouponCode::new(raw).map_err(|_| CouponError::InvalidCode)?;
                Some(self.coupons.evaluate(&code, user, priced.subtotal).await?)
            }
            None => None,
        };

        let applied = coupon.as_ref().map(|(c, discount)| AppliedCoupon { code: c.code.clone(), discount: *discount });
        let redemption = coupon.as_ref().map(|(c, _)| CouponRedemption::for_coupon(c, user.id));

        let mut attempt = 1;
        let mut order = loop {
            let address = request.shipping_address.clone();
            let order = Order::place(user.id, &priced, applied.clone(), address, Utc::now())?;
            match self.store.place_order(&order, &cart, redemption.as_ref()).await {
                Ok(()) => break order,
                Err(StoreError::Duplicate("order")) if attempt < PLACE_ATTEMPTS => {
                    tracing::warn!(order_number = %order.order_number, attempt, "order number taken, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };

        let mut events = order.take_events();
        if let Some((c, _)) = &coupon {
            tracing::info!(coupon_id = %c.id, code = %c.code, order_id = %order.id, "coupon redeemed");
            events.push(DomainEvent::Coupon(CouponEvent::Redeemed {
                coupon_id: c.id,
                code: c.code.clone(),
                user_id: user.id,
                order_id: order.id,
            }));
        }
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            "order placed"
        );
        self.events.publish_all(events).await;
        Ok(order)
    }

    /// Owner or admin.
    pub async fn get(&self, user: &User, order_id: Uuid) -> Result<Order> {
        let order = self.store.get_order(order_id).await?.ok_or(EcommerceError::NotFound("order"))?;
        if order.user_id != user.id && !user.is_admin() {
            return Err(EcommerceError::NotFound("order"));
        }
        Ok(order)
    }

    async fn owned(&self, user: &User, order_id: Uuid) -> Result<Order> {
        let order = self.store.get_order(order_id).await?.ok_or(EcommerceError::NotFound("order"))?;
        if order.user_id != user.id {
            return Err(EcommerceError::NotFound("order"));
        }
        Ok(order)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
        Ok(self.store.list_orders_for_user(user_id).await?)
    }

    pub async fn list_all(&self, status: Option<OrderStatus>, page: u32, per_page: u32) -> Result<Page<Order>> {
        let per_page = match per_page {
            0 => 20,
            n => n.min(100),
        };
        Ok(self.store.list_orders(status, page.max(1), per_page).await?)
    }

    #[tracing::instrument(skip(self, user, reason), fields(user_id = %user.id))]
    pub async fn cancel(&self, user: &User, order_id: Uuid, reason: &str) -> Result<Order> {
        let mut order = self.owned(user, order_id).await?;
        order.cancel(reason, Utc::now())?;
        self.store.update_order(&order).await?;
        tracing::info!(order_id = %order.id, "order cancelled by customer");
        self.events.publish_all(order.take_events()).await;
        Ok(order)
    }

    #[tracing::instrument(skip(self, reason))]
    pub async fn set_status(&self, order_id: Uuid, target: OrderStatus, reason: Option<&str>) -> Result<Order> {
        let mut order = self.store.get_order(order_id).await?.ok_or(EcommerceError::NotFound("order"))?;
        let from = order.status();
        order.set_status(target, reason, self.policy, Utc::now())?;
        self.store.update_order(&order).await?;
        tracing::info!(order_id = %order.id, %from, to = %target, "order status changed");
        self.events.publish_all(order.take_events()).await;
        Ok(order)
    }

    // -------------------------------------------------------------------------
    // Returns
    // -------------------------------------------------------------------------

    #[tracing::instrument(skip(self, user, request), fields(user_id = %user.id))]
    pub async fn request_return(&self, user: &User, order_id: Uuid, request: FileReturn) -> Result<ReturnRequest> {
        let order = self.owned(user, order_id).await?;
        if self.store.return_for_order(order.id).await?.is_some() {
            return Err(ReturnError::AlreadyRequested.into());
        }
        let mut ret = ReturnRequest::file(
            &order,
            &request.reason,
            request.photo_urls,
            request.video_url,
            self.return_window_days,
            Utc::now(),
        )?;
        // The store enforces one return per order even if two requests race past the check above.
        self.store.insert_return(&ret).await?;
        tracing::info!(return_id = %ret.id, order_id = %order.id, "return requested");
        self.events.publish_all(ret.take_events()).await;
        Ok(ret)
    }

    pub async fn return_for_order(&self, user: &User, order_id: Uuid) -> Result<ReturnRequest> {
        let order = self.get(user, order_id).await?;
        self.store.return_for_order(order.id).await?.ok_or(EcommerceError::NotFound("return request"))
    }

    pub async fn list_returns(&self, status: Option<ReturnStatus>) -> Result<Vec<ReturnRequest>> {
        Ok(self.store.list_returns(status).await?)
    }

    #[tracing::instrument(skip(self, notes))]
    pub async fn approve_return(&self, return_id: Uuid, notes: Option<String>) -> Result<ReturnRequest> {
        let mut ret = self.get_return(return_id).await?;
        ret.approve(notes, Utc::now())?;
        self.finish_decision(&mut ret).await?;
        Ok(ret)
    }

    #[tracing::instrument(skip(self, notes))]
    pub async fn reject_return(&self, return_id: Uuid, notes: &str) -> Result<ReturnRequest> {
        let mut ret = self.get_return(return_id).await?;
        ret.reject(notes, Utc::now())?;
        self.finish_decision(&mut ret).await?;
        Ok(ret)
    }

    async fn get_return(&self, id: Uuid) -> Result<ReturnRequest> {
        self.store.get_return(id).await?.ok_or(EcommerceError::NotFound("return request"))
    }

    async fn finish_decision(&self, ret: &mut ReturnRequest) -> Result<()> {
        self.store.update_return(ret).await?;
        tracing::info!(return_id = %ret.id, status = ret.status.as_str(), "return decided");
        self.events.publish_all(ret.take_events()).await;
        Ok(())
    }
}
