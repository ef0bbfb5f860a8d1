//! Cart endpoints. Lines are addressed by their position in the cart.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::extract::{CurrentUser, ValidatedJson};
use crate::api::AppState;
use crate::domain::aggregates::PricedCart;
use crate::services::AddToCart;
use crate::Result;

pub async fn get_cart(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Json<PricedCart>> {
    Ok(Json(s.services().carts.priced(user.id).await?))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 99))]
    pub quantity: u32,
    pub selected_size: Option<String>,
    pub selected_color: Option<String>,
    pub selected_box_type: Option<String>,
}

pub async fn add_item(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(r): ValidatedJson<AddItemRequest>,
) -> Result<(StatusCode, Json<PricedCart>)> {
    let line = AddToCart {
        product_id: r.product_id,
        quantity: r.quantity,
        size: r.selected_size,
        color: r.selected_color,
        box_type: r.selected_box_type,
    };
    Ok((StatusCode::CREATED, Json(s.services().carts.add_item(user.id, line).await?)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[validate(range(max = 99))]
    pub quantity: u32,
}

pub async fn update_item(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(index): Path<usize>,
    ValidatedJson(r): ValidatedJson<UpdateItemRequest>,
) -> Result<Json<PricedCart>> {
    Ok(Json(s.services().carts.update_quantity(user.id, index, r.quantity).await?))
}

pub async fn remove_item(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(index): Path<usize>,
) -> Result<Json<PricedCart>> {
    Ok(Json(s.services().carts.remove_item(user.id, index).await?))
}

pub async fn clear_cart(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> Result<StatusCode> {
    s.services().carts.clear(user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
