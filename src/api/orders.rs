//! Order, cancellation and return endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::extract::{AdminUser, CurrentUser, ValidatedJson};
use crate::api::AppState;
use crate::domain::aggregates::{Order, OrderStatus, ReturnRequest, ReturnStatus, ShippingAddress};
use crate::services::{FileReturn, PlaceOrder};
use crate::store::Page;
use crate::Result;

fn default_country() -> String {
    "India".to_string()
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddressRequest {
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    #[validate(length(min = 7, max = 20))]
    pub phone: String,
    #[validate(length(min = 1, max = 200))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 3, max = 12))]
    pub postal_code: String,
    #[serde(default = "default_country")]
    #[validate(length(min = 1, max = 60))]
    pub country: String,
}

impl From<ShippingAddressRequest> for ShippingAddress {
    fn from(r: ShippingAddressRequest) -> Self {
        ShippingAddress {
            full_name: r.full_name.trim().to_string(),
            phone: r.phone.trim().to_string(),
            line1: r.line1.trim().to_string(),
            line2: r.line2.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
            city: r.city.trim().to_string(),
            state: r.state.trim().to_string(),
            postal_code: r.postal_code.trim().to_string(),
            country: r.country.trim().to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    #[validate]
    pub shipping_address: ShippingAddressRequest,
    pub coupon_code: Option<String>,
}

pub async fn place_order(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(r): ValidatedJson<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<Order>)> {
    let request = PlaceOrder { shipping_address: r.shipping_address.into(), coupon_code: r.coupon_code };
    let order = s.services().orders.place(&user, request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_orders(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.services().orders.list_for_user(user.id).await?))
}

pub async fn get_order(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>> {
    Ok(Json(s.services().orders.get(&user, id).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelRequest {
    #[validate(length(max = 500))]
    pub reason: String,
}

pub async fn cancel_order(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    ValidatedJson(r): ValidatedJson<CancelRequest>,
) -> Result<Json<Order>> {
    Ok(Json(s.services().orders.cancel(&user, id, &r.reason).await?))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRequestBody {
    #[validate(length(max = 1000))]
    pub reason: String,
    #[serde(default)]
    #[validate(length(max = 10))]
    pub photo_urls: Vec<String>,
    #[validate(url)]
    pub video_url: Option<String>,
}

pub async fn request_return(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    ValidatedJson(r): ValidatedJson<ReturnRequestBody>,
) -> Result<(StatusCode, Json<ReturnRequest>)> {
    let request = FileReturn { reason: r.reason, photo_urls: r.photo_urls, video_url: r.video_url };
    let ret = s.services().orders.request_return(&user, id, request).await?;
    Ok((StatusCode::CREATED, Json(ret)))
}

pub async fn get_return(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ReturnRequest>> {
    Ok(Json(s.services().orders.return_for_order(&user, id).await?))
}

// Admin

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOrderParams {
    pub status: Option<OrderStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn admin_list_orders(
    State(s): State<AppState>,
    _admin: AdminUser,
    Query(p): Query<AdminOrderParams>,
) -> Result<Json<Page<Order>>> {
    let page = s.services().orders.list_all(p.status, p.page.unwrap_or(1), p.per_page.unwrap_or(0)).await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetStatusRequest {
    pub status: OrderStatus,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

pub async fn admin_set_status(
    State(s): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    ValidatedJson(r): ValidatedJson<SetStatusRequest>,
) -> Result<Json<Order>> {
    Ok(Json(s.services().orders.set_status(id, r.status, r.reason.as_deref()).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReturnFilter {
    pub status: Option<ReturnStatus>,
}

pub async fn admin_list_returns(
    State(s): State<AppState>,
    _admin: AdminUser,
    Query(f): Query<ReturnFilter>,
) -> Result<Json<Vec<ReturnRequest>>> {
    Ok(Json(s.services().orders.list_returns(f.status).await?))
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    #[validate(length(max = 1000))]
    pub admin_notes: Option<String>,
}

pub async fn admin_approve_return(
    State(s): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    ValidatedJson(r): ValidatedJson<DecisionRequest>,
) -> Result<Json<ReturnRequest>> {
    Ok(Json(s.services().orders.approve_return(id, r.admin_notes).await?))
}

pub async fn admin_reject_return(
    State(s): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    ValidatedJson(r): ValidatedJson<DecisionRequest>,
) -> Result<Json<ReturnRequest>> {
    let notes = r.admin_notes.unwrap_or_default();
    Ok(Json(s.services().orders.reject_return(id, &notes).await?))
}
