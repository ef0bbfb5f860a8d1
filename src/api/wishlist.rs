//! Wishlist endpoints. Adding and removing are idempotent.

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::api::extract::CurrentUser;
use crate::api::AppState;
use crate::domain::aggregates::Wishlist;
use crate::Result;

pub async fn get_wishlist(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Json<Wishlist>> {
    Ok(Json(s.services().wishlist.get(user.id).await?))
}

pub async fn add(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Wishlist>> {
    Ok(Json(s.services().wishlist.add(user.id, product_id).await?))
}

pub async fn remove(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Wishlist>> {
    Ok(Json(s.services().wishlist.remove(user.id, product_id).await?))
}
