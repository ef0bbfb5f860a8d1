//! Application services.
//!
//! Each service owns a handle to the [`Store`] and turns one storefront use
//! case into domain calls plus persistence. Handlers in `api` stay thin.

use std::sync::Arc;

use crate::config::Config;
use crate::events::EventPublisher;
use crate::store::Store;

pub mod carts;
pub mod catalog;
pub mod coupons;
pub mod orders;
pub mod users;
pub mod wishlist;

pub use carts::{AddToCart, CartService};
pub use catalog::{CatalogService, ReviewSummary};
pub use coupons::{CouponPreview, CouponService};
pub use orders::{FileReturn, OrderService, PlaceOrder};
pub use users::{IssuedUser, Profile, UserService};
pub use wishlist::WishlistService;

#[derive(Clone)]
pub struct Services {
    pub catalog: CatalogService,
    pub carts: CartService,
    pub coupons: CouponService,
    pub orders: OrderService,
    pub users: UserService,
    pub wishlist: WishlistService,
}

impl Services {
    pub fn new(store: Arc<dyn Store>, events: EventPublisher, config: &Config) -> Self {
        Self {
            catalog: CatalogService::new(store.clone(), config.reels_cache_ttl),
            carts: CartService::new(store.clone()),
            coupons: CouponService::new(store.clone()),
            orders: OrderService::new(store.clone(), events, config.return_window_days, config.transition_policy),
            users: UserService::new(store.clone()),
            wishlist: WishlistService::new(store),
        }
    }
}
