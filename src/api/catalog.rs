//! Catalog endpoints: products, categories, reviews, reels and search.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::api::extract::{AdminUser, CurrentUser, ValidatedJson};
use crate::api::AppState;
use crate::domain::aggregates::{BoxOption, Category, Product, ProductDraft, Reel, Review};
use crate::domain::value_objects::Money;
use crate::services::ReviewSummary;
use crate::store::{Page, ProductQuery};
use crate::Result;

/// Product as served to clients, with the derived discount.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub discount_percent: u32,
    pub in_stock: bool,
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        Self { discount_percent: product.discount_percent(), in_stock: product.is_in_stock(), product }
    }
}

fn page_view(page: Page<Product>) -> Page<ProductView> {
    Page { data: page.data.into_iter().map(ProductView::from).collect(), total: page.total, page: page.page }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub category: Option<Uuid>,
    pub search: Option<String>,
}

pub async fn list_products(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<Page<ProductView>>> {
    let query = ProductQuery {
        page: p.page.unwrap_or(1),
        per_page: p.per_page.unwrap_or(0),
        category_id: p.category,
        search: p.search,
    };
    Ok(Json(page_view(s.services().catalog.list_products(query).await?)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub q: String,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn search(State(s): State<AppState>, Query(p): Query<SearchParams>) -> Result<Json<Page<ProductView>>> {
    let query = ProductQuery {
        page: p.page.unwrap_or(1),
        per_page: p.per_page.unwrap_or(0),
        category_id: None,
        search: Some(p.q),
    };
    Ok(Json(page_view(s.services().catalog.list_products(query).await?)))
}

pub async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ProductView>> {
    Ok(Json(s.services().catalog.get_product(id).await?.into()))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequest {
    pub category_id: Option<Uuid>,
    #[validate(length(max = 120))]
    pub sub_category: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub color_options: Vec<String>,
    #[serde(default)]
    pub box_options: Vec<BoxOption>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl From<ProductRequest> for ProductDraft {
    fn from(r: ProductRequest) -> Self {
        ProductDraft {
            category_id: r.category_id,
            sub_category: r.sub_category,
            name: r.name,
            description: r.description,
            price: Money::new(r.price),
            original_price: r.original_price.map(Money::new),
            stock: r.stock,
            images: r.images,
            color_options: r.color_options,
            box_options: r.box_options,
            sizes: r.sizes,
            attributes: r.attributes,
        }
    }
}

pub async fn create_product(
    State(s): State<AppState>,
    _admin: AdminUser,
    ValidatedJson(r): ValidatedJson<ProductRequest>,
) -> Result<(StatusCode, Json<ProductView>)> {
    let product = s.services().catalog.create_product(r.into()).await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

pub async fn update_product(
    State(s): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    ValidatedJson(r): ValidatedJson<ProductRequest>,
) -> Result<Json<ProductView>> {
    Ok(Json(s.services().catalog.update_product(id, r.into()).await?.into()))
}

pub async fn delete_product(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.services().catalog.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Categories

pub async fn list_categories(State(s): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(s.services().catalog.list_categories().await?))
}

pub async fn get_category(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Category>> {
    Ok(Json(s.services().catalog.get_category(id).await?))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    #[validate(url)]
    pub image_url: Option<String>,
}

pub async fn create_category(
    State(s): State<AppState>,
    _admin: AdminUser,
    ValidatedJson(r): ValidatedJson<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>)> {
    let category = s.services().catalog.create_category(&r.name, r.description, r.parent_id, r.image_url).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn delete_category(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.services().catalog.delete_category(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Reviews

pub async fn list_reviews(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ReviewSummary>> {
    Ok(Json(s.services().catalog.reviews(id).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: u8,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

pub async fn submit_review(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    ValidatedJson(r): ValidatedJson<ReviewRequest>,
) -> Result<(StatusCode, Json<Review>)> {
    let review = s.services().catalog.submit_review(&user, id, r.rating, r.comment).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

// Reels

pub async fn list_reels(State(s): State<AppState>) -> Result<Json<Vec<Reel>>> {
    let reels = s.services().catalog.active_reels().await?;
    Ok(Json(reels.as_ref().clone()))
}

pub async fn list_all_reels(State(s): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<Reel>>> {
    Ok(Json(s.services().catalog.all_reels().await?))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateReelRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(url)]
    pub video_url: String,
    #[validate(url)]
    pub thumbnail_url: Option<String>,
    pub product_id: Option<Uuid>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

pub async fn create_reel(
    State(s): State<AppState>,
    _admin: AdminUser,
    ValidatedJson(r): ValidatedJson<CreateReelRequest>,
) -> Result<(StatusCode, Json<Reel>)> {
    let reel = s
        .services()
        .catalog
        .create_reel(&r.title, &r.video_url, r.thumbnail_url, r.product_id, r.is_active)
        .await?;
    Ok((StatusCode::CREATED, Json(reel)))
}

pub async fn delete_reel(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.services().catalog.delete_reel(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_product_crud_and_search() {
        let app = TestApp::new().await;
        let body = json!({
            "name": "Heritage Chronograph",
            "subCategory": "Tissot",
            "price": 800,
            "originalPrice": 1000,
            "stock": 4,
            "boxOptions": [{"name": "Gift Box", "price": "49.50"}],
            "attributes": {"dialColor": "blue"}
        });
        let (status, created) =
            app.call(Method::POST, "/api/v1/admin/products", app.admin_token(), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["discountPercent"], 20);
        assert_eq!(created["inStock"], true);
        let id = created["id"].as_str().unwrap().to_string();

        let (status, page) = app.call(Method::GET, "/api/v1/search?q=tissot", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], 1);
        assert_eq!(page["data"][0]["id"], id.as_str());

        let uri = format!("/api/v1/admin/products/{id}");
        let (status, _) = app.call(Method::DELETE, &uri, app.admin_token(), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = app.call(Method::GET, &format!("/api/v1/products/{id}"), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_invalid_pricing_rejected() {
        let app = TestApp::new().await;
        let body = json!({"name": "Overpriced", "price": 1200, "originalPrice": 1000});
        let (status, body) = app.call(Method::POST, "/api/v1/admin/products", app.admin_token(), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_pricing");

        let (status, body) = app
            .call(Method::POST, "/api/v1/admin/products", app.admin_token(), Some(json!({"name": "", "price": 10})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_failed");
    }

    #[tokio::test]
    async fn test_reviews_and_reels() {
        let app = TestApp::new().await;
        let (_, product) = app
            .call(
                Method::POST,
                "/api/v1/admin/products",
                app.admin_token(),
                Some(json!({"name": "Diver", "price": 300})),
            )
            .await;
        let id = product["id"].as_str().unwrap().to_string();

        let uri = format!("/api/v1/products/{id}/reviews");
        let (status, _) = app.call(Method::POST, &uri, app.customer_token(), Some(json!({"rating": 6}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app.call(Method::POST, &uri, app.customer_token(), Some(json!({"rating": 4}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, summary) = app.call(Method::GET, &uri, None, None).await;
        assert_eq!(summary["count"], 1);

        let reel = json!({"title": "Wrist shot", "videoUrl": "https://cdn.example.com/r.mp4", "productId": id});
        let (status, _) = app.call(Method::POST, "/api/v1/admin/reels", app.admin_token(), Some(reel)).await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, reels) = app.call(Method::GET, "/api/v1/reels", None, None).await;
        assert_eq!(reels.as_array().unwrap().len(), 1);
    }
}
