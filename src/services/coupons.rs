//! Coupon administration and checkout previews.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{Coupon, CouponDraft, CouponError, RedemptionContext, User};
use crate::domain::value_objects::{CouponCode, Money};
use crate::services::carts::CartService;
use crate::store::Store;
use crate::{EcommerceError, Result};

/// What a coupon would do to the caller's current cart.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponPreview {
    pub code: CouponCode,
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
}

#[derive(Clone)]
pub struct CouponService {
    store: Arc<dyn Store>,
    carts: CartService,
}

impl CouponService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let carts = CartService::new(store.clone());
        Self { store, carts }
    }

    pub async fn list(&self) -> Result<Vec<Coupon>> {
        Ok(self.store.list_coupons().await?)
    }

    #[tracing::instrument(skip(self, draft), fields(code = %draft.code))]
    pub async fn create(&self, draft: CouponDraft) -> Result<Coupon> {
        let coupon = Coupon::create(draft)?;
        self.store.insert_coupon(&coupon).await?;
        tracing::info!(coupon_id = %coupon.id, "coupon created");
        Ok(coupon)
    }

    #[tracing::instrument(skip(self, draft))]
    pub async fn update(&self, id: Uuid, draft: CouponDraft) -> Result<Coupon> {
        let mut coupon = self.store.get_coupon(id).await?.ok_or(EcommerceError::NotFound("coupon"))?;
        coupon.apply(draft)?;
        self.store.update_coupon(&coupon).await?;
        Ok(coupon)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_coupon(id).await? {
            return Err(EcommerceError::NotFound("coupon"));
        }
        Ok(())
    }

    /// Looks up `code` and checks it against `subtotal` for `user`.
    /// Returns the coupon together with the discount it grants.
    pub(crate) async fn evaluate(&self, code: &CouponCode, user: &User, subtotal: Money) -> Result<(Coupon, Money)> {
        let coupon = self.store.coupon_by_code(code).await?.ok_or(CouponError::InvalidCode)?;
        let ctx = RedemptionContext {
            user_usage: self.store.coupon_usage(coupon.id, user.id).await?,
            is_first_time: self.store.count_orders_for_user(user.id).await? == 0,
        };
        let discount = coupon.evaluate(subtotal, ctx, Utc::now())?;
        Ok((coupon, discount))
    }

    /// Applies `code` to the caller's cart without redeeming it.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn preview(&self, user: &User, code: &str) -> Result<CouponPreview> {
        let code = CouponCode::new(code).map_err(|_| CouponError::InvalidCode)?;
        let cart = self.carts.priced(user.id).await?;
        let (_, discount) = self.evaluate(&code, user, cart.subtotal).await?;
        Ok(CouponPreview {
            code,
            subtotal: cart.subtotal,
            discount,
            total: cart.subtotal.saturating_sub(discount),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{CartItem, DiscountType, Product, ProductDraft, Role};
    use crate::domain::value_objects::Quantity;
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;

    fn save20() -> CouponDraft {
        CouponDraft {
            code: CouponCode::new("save20").unwrap(),
            description: None,
            discount_type: DiscountType::Percentage,
            discount_value: Decimal::from(20),
            min_order_amount: Money::from_major(500),
            max_discount: Some(Money::from_major(150)),
            usage_limit: None,
            per_user_limit: 1,
            expiry_date: None,
            is_active: true,
            for_new_users: false,
            for_existing_users: false,
        }
    }

    async fn cart_worth(store: &MemoryStore, user: &User, price: i64) {
        let product = Product::create(ProductDraft {
            name: "Watch".into(),
            price: Money::from_major(price),
            stock: 3,
            ..Default::default()
        })
        .unwrap();
        store.upsert_product(&product).await.unwrap();
        let mut cart = store.get_cart(user.id).await.unwrap();
        cart.add_item(CartItem::for_product(&product, Quantity::new(1).unwrap(), None, None, None).unwrap());
        store.save_cart(&cart).await.unwrap();
    }

    #[tokio::test]
    async fn test_preview_caps_discount() {
        let store = Arc::new(MemoryStore::new());
        let coupons = CouponService::new(store.clone());
        let user = User::new("c@shop.test", None, Role::Customer);
        coupons.create(save20()).await.unwrap();
        cart_worth(&store, &user, 900).await;

        let preview = coupons.preview(&user, " Save20 ").await.unwrap();
        assert_eq!(preview.discount, Money::from_major(150));
        assert_eq!(preview.total, Money::from_major(750));
    }

    #[tokio::test]
    async fn test_preview_min_order_and_unknown_code() {
        let store = Arc::new(MemoryStore::new());
        let coupons = CouponService::new(store.clone());
        let user = User::new("d@shop.test", None, Role::Customer);
        coupons.create(save20()).await.unwrap();
        cart_worth(&store, &user, 300).await;

        assert!(matches!(
            coupons.preview(&user, "SAVE20").await,
            Err(EcommerceError::Coupon(CouponError::MinOrderNotMet { .. }))
        ));
        assert!(matches!(
            coupons.preview(&user, "NOPE").await,
            Err(EcommerceError::Coupon(CouponError::InvalidCode))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_code_conflicts() {
        let coupons = CouponService::new(Arc::new(MemoryStore::new()));
        coupons.create(save20()).await.unwrap();
        assert!(matches!(coupons.create(save20()).await, Err(EcommerceError::Conflict("coupon"))));
    }
}
