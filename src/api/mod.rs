//! HTTP surface.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::events::EventPublisher;
use crate::services::Services;
use crate::store::Store;

pub mod cart;
pub mod catalog;
pub mod coupons;
pub mod error;
pub mod extract;
pub mod orders;
pub mod users;
pub mod wishlist;

/// Shared handler state; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    services: Services,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn Store>, events: EventPublisher) -> Self {
        let services = Services::new(store, events, &config);
        Self { inner: Arc::new(AppStateInner { config, services }) }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn services(&self) -> &Services {
        &self.inner.services
    }
}

async fn health(State(s): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "storefront-commerce",
        "currency": s.config().currency,
    }))
}

pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/products", post(catalog::create_product))
        .route("/products/:id", put(catalog::update_product).delete(catalog::delete_product))
        .route("/categories", post(catalog::create_category))
        .route("/categories/:id", delete(catalog::delete_category))
        .route("/reels", get(catalog::list_all_reels).post(catalog::create_reel))
        .route("/reels/:id", delete(catalog::delete_reel))
        .route("/coupons", get(coupons::list_coupons).post(coupons::create_coupon))
        .route("/coupons/:id", put(coupons::update_coupon).delete(coupons::delete_coupon))
        .route("/orders", get(orders::admin_list_orders))
        .route("/orders/:id/status", put(orders::admin_set_status))
        .route("/returns", get(orders::admin_list_returns))
        .route("/returns/:id/approve", post(orders::admin_approve_return))
        .route("/returns/:id/reject", post(orders::admin_reject_return))
        .route("/users", get(users::list_users).post(users::create_user));

    let api = Router::new()
        .route("/products", get(catalog::list_products))
        .route("/products/:id", get(catalog::get_product))
        .route("/products/:id/reviews", get(catalog::list_reviews).post(catalog::submit_review))
        .route("/categories", get(catalog::list_categories))
        .route("/categories/:id", get(catalog::get_category))
        .route("/reels", get(catalog::list_reels))
        .route("/search", get(catalog::search))
        .route("/profile", get(users::profile))
        .route("/cart", get(cart::get_cart).delete(cart::clear_cart))
        .route("/cart/items", post(cart::add_item))
        .route("/cart/items/:index", put(cart::update_item).delete(cart::remove_item))
        .route("/coupons/apply", post(coupons::apply_coupon))
        .route("/orders", get(orders::list_orders).post(orders::place_order))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/cancel", post(orders::cancel_order))
        .route("/orders/:id/return", get(orders::get_return).post(orders::request_return))
        .route("/wishlist", get(wishlist::get_wishlist))
        .route("/wishlist/:product_id", post(wishlist::add).delete(wishlist::remove))
        .nest("/admin", admin);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
