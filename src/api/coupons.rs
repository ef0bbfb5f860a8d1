//! Coupon endpoints: checkout preview and admin management.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::extract::{AdminUser, CurrentUser, ValidatedJson};
use crate::api::AppState;
use crate::domain::aggregates::{Coupon, CouponDraft, DiscountType};
use crate::domain::value_objects::{CouponCode, Money};
use crate::services::CouponPreview;
use crate::Result;

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyCouponRequest {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
}

pub async fn apply_coupon(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(r): ValidatedJson<ApplyCouponRequest>,
) -> Result<Json<CouponPreview>> {
    Ok(Json(s.services().coupons.preview(&user, &r.code).await?))
}

fn default_true() -> bool {
    true
}

fn default_per_user_limit() -> u32 {
    1
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CouponRequest {
    pub code: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[serde(default)]
    pub min_order_amount: Decimal,
    pub max_discount: Option<Decimal>,
    #[validate(range(min = 1))]
    pub usage_limit: Option<u32>,
    #[serde(default = "default_per_user_limit")]
    #[validate(range(min = 1))]
    pub per_user_limit: u32,
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub for_new_users: bool,
    #[serde(default)]
    pub for_existing_users: bool,
}

impl CouponRequest {
    fn into_draft(self) -> Result<CouponDraft> {
        Ok(CouponDraft {
            code: CouponCode::new(self.code)?,
            description: self.description,
            discount_type: self.discount_type,
            discount_value: self.discount_value,
            min_order_amount: Money::new(self.min_order_amount),
            max_discount: self.max_discount.map(Money::new),
            usage_limit: self.usage_limit,
            per_user_limit: self.per_user_limit,
            expiry_date: self.expiry_date,
            is_active: self.is_active,
            for_new_users: self.for_new_users,
            for_existing_users: self.for_existing_users,
        })
    }
}

pub async fn list_coupons(State(s): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<Coupon>>> {
    Ok(Json(s.services().coupons.list().await?))
}

pub async fn create_coupon(
    State(s): State<AppState>,
    _admin: AdminUser,
    ValidatedJson(r): ValidatedJson<CouponRequest>,
) -> Result<(StatusCode, Json<Coupon>)> {
    let coupon = s.services().coupons.create(r.into_draft()?).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

pub async fn update_coupon(
    State(s): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    ValidatedJson(r): ValidatedJson<CouponRequest>,
) -> Result<Json<Coupon>> {
    Ok(Json(s.services().coupons.update(id, r.into_draft()?).await?))
}

pub async fn delete_coupon(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.services().coupons.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::TestApp;
    use axum::http::{Method, StatusCode};
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;

    fn save20() -> serde_json::Value {
        json!({
            "code": "save20",
            "discountType": "percentage",
            "discountValue": 20,
            "minOrderAmount": 500,
            "maxDiscount": 150
        })
    }

    #[tokio::test]
    async fn test_admin_crud_and_conflict() {
        let app = TestApp::new().await;
        let (status, coupon) = app.call(Method::POST, "/api/v1/admin/coupons", app.admin_token(), Some(save20())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(coupon["code"], "SAVE20");
        assert_eq!(coupon["perUserLimit"], 1);

        let (status, body) = app.call(Method::POST, "/api/v1/admin/coupons", app.admin_token(), Some(save20())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "conflict");

        let both = json!({
            "code": "BOTH",
            "discountType": "fixed",
            "discountValue": 50,
            "forNewUsers": true,
            "forExistingUsers": true
        });
        let (status, body) = app.call(Method::POST, "/api/v1/admin/coupons", app.admin_token(), Some(both)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_coupon");

        let id = coupon["id"].as_str().unwrap();
        let uri = format!("/api/v1/admin/coupons/{id}");
        let (status, _) = app.call(Method::DELETE, &uri, app.admin_token(), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_apply_preview() {
        let app = TestApp::new().await;
        app.call(Method::POST, "/api/v1/admin/coupons", app.admin_token(), Some(save20())).await;
        let (_, product) = app
            .call(
                Method::POST,
                "/api/v1/admin/products",
                app.admin_token(),
                Some(json!({"name": "Pilot", "price": 900, "stock": 2})),
            )
            .await;
        app.call(
            Method::POST,
            "/api/v1/cart/items",
            app.customer_token(),
            Some(json!({"productId": product["id"], "quantity": 1})),
        )
        .await;

        let (status, preview) =
            app.call(Method::POST, "/api/v1/coupons/apply", app.customer_token(), Some(json!({"code": "SAVE20"})))
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(Decimal::from_str(preview["discount"].as_str().unwrap()).unwrap(), Decimal::from(150));
        assert_eq!(Decimal::from_str(preview["total"].as_str().unwrap()).unwrap(), Decimal::from(750));

        let (status, body) =
            app.call(Method::POST, "/api/v1/coupons/apply", app.customer_token(), Some(json!({"code": "NOPE"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_code");
    }
}
