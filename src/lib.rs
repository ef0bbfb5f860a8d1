//! Storefront Commerce Service
//!
//! Backend for a storefront: catalog, carts, coupons, checkout, order
//! lifecycle, returns and wishlists.
//!
//! ## Features
//! - Product catalog with categories, reviews and promotional reels
//! - Shopping cart with size/colour/box selections
//! - Coupon validation and atomic redemption at checkout
//! - Order cancellation, admin status changes and return requests
//! - Wishlists, plus an optimistic client-side wishlist container

use thiserror::Error;
use uuid::Uuid;

pub mod api;
pub mod client;
pub mod config;
pub mod domain;
pub mod events;
pub mod services;
pub mod store;

use domain::aggregates::{
    CartError, CouponError, OrderError, ProductError, ReturnError, ReviewError,
};
use domain::value_objects::{CouponCodeError, QuantityError};
use store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Return(#[from] ReturnError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Product(#[from] ProductError),

    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error(transparent)]
    CouponCode(#[from] CouponCodeError),

    #[error(transparent)]
    Quantity(#[from] QuantityError),

    #[error("invalid request: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("insufficient stock for product {0}")]
    InsufficientStock(Uuid),

    #[error("authentication required")]
    Unauthorized,

    #[error("admin access required")]
    Forbidden,

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl From<StoreError> for EcommerceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Duplicate(what) => Self::Conflict(what),
            StoreError::CouponExhausted => Self::Coupon(CouponError::UsageExceeded),
            StoreError::InsufficientStock(id) => Self::InsufficientStock(id),
            StoreError::ReturnExists => Self::Return(ReturnError::AlreadyRequested),
            StoreError::CartChanged => Self::Cart(CartError::Changed),
            other => Self::StorageError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;
