//! Aggregates module
pub mod cart;
pub mod catalog;
pub mod coupon;
pub mod order;
pub mod product;
pub mod return_request;
pub mod review;
pub mod user;
pub mod wishlist;

pub use cart::{Cart, CartError, CartItem, PricedCart, PricedLine};
pub use catalog::{Category, Reel};
pub use coupon::{Coupon, CouponDraft, CouponError, DiscountType, RedemptionContext};
pub use order::{AppliedCoupon, Order, OrderError, OrderItem, OrderStatus, ShippingAddress, TransitionPolicy};
pub use product::{BoxOption, Product, ProductDraft, ProductError};
pub use return_request::{ReturnError, ReturnRequest, ReturnStatus};
pub use review::{Review, ReviewError};
pub use user::{Role, User};
pub use wishlist::Wishlist;
