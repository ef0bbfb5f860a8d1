//! Persistence boundary.
//!
//! Services talk to a [`Store`]; `PgStore` backs production and
//! `MemoryStore` backs tests and database-less runs. Two operations carry
//! atomicity requirements every implementation must honour:
//!
//! - [`Store::place_order`] redeems the coupon (re-checking both the global
//!   and per-user limits), decrements stock, inserts the order and clears
//!   the cart as one unit. If any step fails nothing is written. The cart
//!   is only cleared when it still holds exactly the items the order was
//!   priced from; otherwise placement fails with [`StoreError::CartChanged`].
//!   Order numbers are unique, a clash fails with `Duplicate("order")`.
//! - [`Store::insert_return`] fails with [`StoreError::ReturnExists`] when
//!   the order already has a return request, even under concurrent calls.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{
    Cart, Category, Coupon, Order, OrderStatus, Product, Reel, ReturnRequest, ReturnStatus, Review, User, Wishlist,
};
use crate::domain::value_objects::CouponCode;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    Duplicate(&'static str),

    #[error("coupon usage limit reached")]
    CouponExhausted,

    #[error("insufficient stock for product {0}")]
    InsufficientStock(Uuid),

    #[error("return already requested")]
    ReturnExists,

    #[error("cart changed during checkout")]
    CartChanged,

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone, Debug, Default)]
pub struct ProductQuery {
    pub page: u32,
    pub per_page: u32,
    pub category_id: Option<Uuid>,
    pub search: Option<String>,
}

impl ProductQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.per_page)
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
}

/// Limits to re-check when redeeming a coupon inside `place_order`.
#[derive(Clone, Debug)]
pub struct CouponRedemption {
    pub coupon_id: Uuid,
    pub user_id: Uuid,
    pub usage_limit: Option<u32>,
    pub per_user_limit: u32,
}

impl CouponRedemption {
    pub fn for_coupon(coupon: &Coupon, user_id: Uuid) -> Self {
        Self {
            coupon_id: coupon.id,
            user_id,
            usage_limit: coupon.usage_limit,
            per_user_limit: coupon.per_user_limit,
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // Users
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    async fn user_by_token(&self, token: &str) -> Result<Option<User>, StoreError>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    /// Rewrites name, role and token of an existing user.
    async fn update_user(&self, user: &User) -> Result<(), StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn count_orders_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;

    // Categories
    async fn list_categories(&self) -> Result<Vec<Category>, StoreError>;
    async fn get_category(&self, id: Uuid) -> Result<Option<Category>, StoreError>;
    async fn insert_category(&self, category: &Category) -> Result<(), StoreError>;
    async fn delete_category(&self, id: Uuid) -> Result<bool, StoreError>;

    // Products
    async fn list_products(&self, query: &ProductQuery) -> Result<Page<Product>, StoreError>;
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError>;
    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>, StoreError>;
    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError>;
    async fn delete_product(&self, id: Uuid) -> Result<bool, StoreError>;

    // Reviews: one per (user, product); a resubmission replaces the old one.
    async fn upsert_review(&self, review: &Review) -> Result<(), StoreError>;
    async fn list_reviews(&self, product_id: Uuid) -> Result<Vec<Review>, StoreError>;

    // Reels
    async fn list_reels(&self, active_only: bool) -> Result<Vec<Reel>, StoreError>;
    async fn insert_reel(&self, reel: &Reel) -> Result<(), StoreError>;
    async fn delete_reel(&self, id: Uuid) -> Result<bool, StoreError>;

    // Carts. A user without a stored cart has an empty one.
    async fn get_cart(&self, user_id: Uuid) -> Result<Cart, StoreError>;
    async fn save_cart(&self, cart: &Cart) -> Result<(), StoreError>;

    // Coupons
    async fn list_coupons(&self) -> Result<Vec<Coupon>, StoreError>;
    async fn get_coupon(&self, id: Uuid) -> Result<Option<Coupon>, StoreError>;
    async fn coupon_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, StoreError>;
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<(), StoreError>;
    async fn update_coupon(&self, coupon: &Coupon) -> Result<(), StoreError>;
    async fn delete_coupon(&self, id: Uuid) -> Result<bool, StoreError>;
    async fn coupon_usage(&self, coupon_id: Uuid, user_id: Uuid) -> Result<u32, StoreError>;

    // Orders
    /// `cart` is the snapshot `order` was priced from.
    async fn place_order(
        &self,
        order: &Order,
        cart: &Cart,
        redemption: Option<&CouponRedemption>,
    ) -> Result<(), StoreError>;
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;
    async fn list_orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, StoreError>;
    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Order>, StoreError>;
    /// Persists the mutable lifecycle fields: status, cancellation reason,
    /// delivered date and update time.
    async fn update_order(&self, order: &Order) -> Result<(), StoreError>;

    // Returns
    async fn insert_return(&self, request: &ReturnRequest) -> Result<(), StoreError>;
    async fn get_return(&self, id: Uuid) -> Result<Option<ReturnRequest>, StoreError>;
    async fn return_for_order(&self, order_id: Uuid) -> Result<Option<ReturnRequest>, StoreError>;
    async fn list_returns(&self, status: Option<ReturnStatus>) -> Result<Vec<ReturnRequest>, StoreError>;
    async fn update_return(&self, request: &ReturnRequest) -> Result<(), StoreError>;

    // Wishlists. Add and remove report whether membership changed.
    async fn wishlist(&self, user_id: Uuid) -> Result<Wishlist, StoreError>;
    async fn wishlist_add(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, StoreError>;
    async fn wishlist_remove(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, StoreError>;
}
