//! PostgreSQL store.
//!
//! Rows are read through `sqlx::FromRow` structs and converted into
//! aggregates; anything the domain would reject on the way in is reported
//! as [`StoreError::Corrupt`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use uuid::Uuid;

use super::{CouponRedemption, Page, ProductQuery, Store, StoreError};
use crate::domain::aggregates::{
    AppliedCoupon, BoxOption, Cart, CartItem, Category, Coupon, Order, OrderItem, OrderStatus, Product, Reel,
    ReturnRequest, ReturnStatus, Review, Role, ShippingAddress, User, Wishlist,
};
use crate::domain::value_objects::{CouponCode, Money};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn duplicate_or(err: sqlx::Error, what: &'static str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::Duplicate(what);
        }
    }
    StoreError::Database(err)
}

fn to_i32(value: u32, field: &str) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field} out of range: {value}")))
}

fn to_u32(value: i32, field: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {field}: {value}")))
}

fn parse<T: std::str::FromStr<Err = String>>(value: &str) -> Result<T, StoreError> {
    value.parse().map_err(StoreError::Corrupt)
}

fn like_pattern(search: &str) -> String {
    let escaped = search.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

// =============================================================================
// Rows
// =============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: Option<String>,
    role: String,
    api_token: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;
    fn try_from(r: UserRow) -> Result<Self, StoreError> {
        Ok(User {
            id: r.id,
            email: r.email,
            name: r.name,
            role: parse::<Role>(&r.role)?,
            api_token: r.api_token,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    parent_id: Option<Uuid>,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(r: CategoryRow) -> Self {
        Category {
            id: r.id,
            name: r.name,
            slug: r.slug,
            description: r.description,
            parent_id: r.parent_id,
            image_url: r.image_url,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    category_id: Option<Uuid>,
    sub_category: Option<String>,
    name: String,
    description: Option<String>,
    price: Decimal,
    original_price: Option<Decimal>,
    stock: i32,
    images: Vec<String>,
    color_options: Vec<String>,
    box_options: Json<Vec<BoxOption>>,
    sizes: Vec<String>,
    attributes: Json<HashMap<String, Value>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;
    fn try_from(r: ProductRow) -> Result<Self, StoreError> {
        Ok(Product {
            id: r.id,
            category_id: r.category_id,
            sub_category: r.sub_category,
            name: r.name,
            description: r.description,
            price: Money::new(r.price),
            original_price: r.original_price.map(Money::new),
            stock: to_u32(r.stock, "stock")?,
            images: r.images,
            color_options: r.color_options,
            box_options: r.box_options.0,
            sizes: r.sizes,
            attributes: r.attributes.0,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: Uuid,
    product_id: Uuid,
    user_id: Uuid,
    author_name: Option<String>,
    rating: i16,
    comment: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = StoreError;
    fn try_from(r: ReviewRow) -> Result<Self, StoreError> {
        Ok(Review {
            id: r.id,
            product_id: r.product_id,
            user_id: r.user_id,
            author_name: r.author_name,
            rating: u8::try_from(r.rating).map_err(|_| StoreError::Corrupt(format!("rating {}", r.rating)))?,
            comment: r.comment,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReelRow {
    id: Uuid,
    title: String,
    video_url: String,
    thumbnail_url: Option<String>,
    product_id: Option<Uuid>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<ReelRow> for Reel {
    fn from(r: ReelRow) -> Self {
        Reel {
            id: r.id,
            title: r.title,
            video_url: r.video_url,
            thumbnail_url: r.thumbnail_url,
            product_id: r.product_id,
            is_active: r.is_active,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    description: Option<String>,
    discount_type: String,
    discount_value: Decimal,
    min_order_amount: Decimal,
    max_discount: Option<Decimal>,
    usage_limit: Option<i32>,
    per_user_limit: i32,
    expiry_date: Option<DateTime<Utc>>,
    is_active: bool,
    for_new_users: bool,
    for_existing_users: bool,
    used_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = StoreError;
    fn try_from(r: CouponRow) -> Result<Self, StoreError> {
        Ok(Coupon {
            id: r.id,
            code: CouponCode::new(r.code).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            description: r.description,
            discount_type: parse(&r.discount_type)?,
            discount_value: r.discount_value,
            min_order_amount: Money::new(r.min_order_amount),
            max_discount: r.max_discount.map(Money::new),
            usage_limit: r.usage_limit.map(|l| to_u32(l, "usage_limit")).transpose()?,
            per_user_limit: to_u32(r.per_user_limit, "per_user_limit")?,
            expiry_date: r.expiry_date,
            is_active: r.is_active,
            for_new_users: r.for_new_users,
            for_existing_users: r.for_existing_users,
            used_count: to_u32(r.used_count, "used_count")?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: Uuid,
    items: Json<Vec<OrderItem>>,
    applied_coupon: Option<Json<AppliedCoupon>>,
    shipping_address: Json<ShippingAddress>,
    status: String,
    cancellation_reason: Option<String>,
    order_date: DateTime<Utc>,
    delivered_date: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> Result<Self, StoreError> {
        Ok(Order::restore(
            r.id,
            r.order_number,
            r.user_id,
            r.items.0,
            r.applied_coupon.map(|c| c.0),
            r.shipping_address.0,
            parse::<OrderStatus>(&r.status)?,
            r.cancellation_reason,
            r.order_date,
            r.delivered_date,
            r.updated_at,
        ))
    }
}

#[derive(sqlx::FromRow)]
struct ReturnRow {
    id: Uuid,
    order_id: Uuid,
    user_id: Uuid,
    reason: String,
    photo_urls: Vec<String>,
    video_url: Option<String>,
    status: String,
    admin_notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReturnRow> for ReturnRequest {
    type Error = StoreError;
    fn try_from(r: ReturnRow) -> Result<Self, StoreError> {
        Ok(ReturnRequest::restore(
            r.id,
            r.order_id,
            r.user_id,
            r.reason,
            r.photo_urls,
            r.video_url,
            parse::<ReturnStatus>(&r.status)?,
            r.admin_notes,
            r.created_at,
            r.updated_at,
        ))
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

const ORDER_COLUMNS: &str = "id, order_number, user_id, items, applied_coupon, shipping_address, status, \
     cancellation_reason, order_date, delivered_date, updated_at";

// =============================================================================
// Store
// =============================================================================

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO users (id, email, name, role, api_token, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.name)
            .bind(user.role.as_str())
            .bind(&user.api_token)
            .bind(user.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| duplicate_or(e, "user"))?;
        Ok(())
    }

    async fn user_by_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE api_token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE users SET name = $2, role = $3, api_token = $4 WHERE id = $1")
            .bind(user.id)
            .bind(&user.name)
            .bind(user.role.as_str())
            .bind(&user.api_token)
            .execute(&self.pool)
            .await
            .map_err(|e| duplicate_or(e, "user"))?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("user"));
        }
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn count_orders_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let rows = sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn get_category(&self, id: Uuid) -> Result<Option<Category>, StoreError> {
        Ok(sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Category::from))
    }

    async fn insert_category(&self, c: &Category) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO categories (id, name, slug, description, parent_id, image_url, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(c.id)
        .bind(&c.name)
        .bind(&c.slug)
        .bind(&c.description)
        .bind(c.parent_id)
        .bind(&c.image_url)
        .bind(c.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_or(e, "category"))?;
        Ok(())
    }

    async fn delete_category(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM categories WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_products(&self, q: &ProductQuery) -> Result<Page<Product>, StoreError> {
        let search = q.search.as_deref().map(like_pattern);
        let filter = "WHERE ($1::uuid IS NULL OR category_id = $1) \
                      AND ($2::text IS NULL OR name ILIKE $2 OR sub_category ILIKE $2)";
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT * FROM products {filter} ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        ))
        .bind(q.category_id)
        .bind(&search)
        .bind(i64::from(q.per_page))
        .bind(i64::try_from(q.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM products {filter}"))
            .bind(q.category_id)
            .bind(&search)
            .fetch_one(&self.pool)
            .await?;
        Ok(Page { data: convert_all(rows)?, total: u64::try_from(total).unwrap_or(0), page: q.page.max(1) })
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn upsert_product(&self, p: &Product) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO products (id, category_id, sub_category, name, description, price, original_price, stock, \
             images, color_options, box_options, sizes, attributes, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             ON CONFLICT (id) DO UPDATE SET category_id = EXCLUDED.category_id, sub_category = EXCLUDED.sub_category, \
             name = EXCLUDED.name, description = EXCLUDED.description, price = EXCLUDED.price, \
             original_price = EXCLUDED.original_price, stock = EXCLUDED.stock, images = EXCLUDED.images, \
             color_options = EXCLUDED.color_options, box_options = EXCLUDED.box_options, sizes = EXCLUDED.sizes, \
             attributes = EXCLUDED.attributes, updated_at = EXCLUDED.updated_at",
        )
        .bind(p.id)
        .bind(p.category_id)
        .bind(&p.sub_category)
        .bind(&p.name)
        .bind(&p.description)
        .bind(p.price.amount())
        .bind(p.original_price.map(|m| m.amount()))
        .bind(to_i32(p.stock, "stock")?)
        .bind(&p.images)
        .bind(&p.color_options)
        .bind(Json(&p.box_options))
        .bind(&p.sizes)
        .bind(Json(&p.attributes))
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }

    async fn upsert_review(&self, r: &Review) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO reviews (id, product_id, user_id, author_name, rating, comment, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (product_id, user_id) DO UPDATE SET author_name = EXCLUDED.author_name, \
             rating = EXCLUDED.rating, comment = EXCLUDED.comment, created_at = EXCLUDED.created_at",
        )
        .bind(r.id)
        .bind(r.product_id)
        .bind(r.user_id)
        .bind(&r.author_name)
        .bind(i16::from(r.rating))
        .bind(&r.comment)
        .bind(r.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_reviews(&self, product_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            "SELECT * FROM reviews WHERE product_id = $1 ORDER BY created_at DESC",
        )
        .bind(product_id)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn list_reels(&self, active_only: bool) -> Result<Vec<Reel>, StoreError> {
        let rows = sqlx::query_as::<_, ReelRow>(
            "SELECT * FROM reels WHERE (NOT $1 OR is_active) ORDER BY created_at DESC",
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Reel::from).collect())
    }

    async fn insert_reel(&self, r: &Reel) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO reels (id, title, video_url, thumbnail_url, product_id, is_active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(r.id)
        .bind(&r.title)
        .bind(&r.video_url)
        .bind(&r.thumbnail_url)
        .bind(r.product_id)
        .bind(r.is_active)
        .bind(r.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_reel(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM reels WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }

    async fn get_cart(&self, user_id: Uuid) -> Result<Cart, StoreError> {
        let row: Option<(Json<Vec<CartItem>>, DateTime<Utc>)> =
            sqlx::query_as("SELECT items, updated_at FROM carts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(match row {
            Some((items, updated_at)) => Cart { user_id, items: items.0, updated_at },
            None => Cart::new(user_id),
        })
    }

    async fn save_cart(&self, cart: &Cart) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO carts (user_id, items, updated_at) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO UPDATE SET items = EXCLUDED.items, updated_at = EXCLUDED.updated_at",
        )
        .bind(cart.user_id)
        .bind(Json(&cart.items))
        .bind(cart.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>, StoreError> {
        let rows = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn get_coupon(&self, id: Uuid) -> Result<Option<Coupon>, StoreError> {
        sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Coupon::try_from)
            .transpose()
    }

    async fn coupon_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, StoreError> {
        sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE code = $1")
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Coupon::try_from)
            .transpose()
    }

    async fn insert_coupon(&self, c: &Coupon) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO coupons (id, code, description, discount_type, discount_value, min_order_amount, \
             max_discount, usage_limit, per_user_limit, expiry_date, is_active, for_new_users, for_existing_users, \
             used_count, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(c.id)
        .bind(c.code.as_str())
        .bind(&c.description)
        .bind(c.discount_type.as_str())
        .bind(c.discount_value)
        .bind(c.min_order_amount.amount())
        .bind(c.max_discount.map(|m| m.amount()))
        .bind(c.usage_limit.map(|l| to_i32(l, "usage_limit")).transpose()?)
        .bind(to_i32(c.per_user_limit, "per_user_limit")?)
        .bind(c.expiry_date)
        .bind(c.is_active)
        .bind(c.for_new_users)
        .bind(c.for_existing_users)
        .bind(to_i32(c.used_count, "used_count")?)
        .bind(c.created_at)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_or(e, "coupon"))?;
        Ok(())
    }

    async fn update_coupon(&self, c: &Coupon) -> Result<(), StoreError> {
        // used_count is only ever written by place_order.
        let res = sqlx::query(
            "UPDATE coupons SET code = $2, description = $3, discount_type = $4, discount_value = $5, \
             min_order_amount = $6, max_discount = $7, usage_limit = $8, per_user_limit = $9, expiry_date = $10, \
             is_active = $11, for_new_users = $12, for_existing_users = $13, updated_at = $14 WHERE id = $1",
        )
        .bind(c.id)
        .bind(c.code.as_str())
        .bind(&c.description)
        .bind(c.discount_type.as_str())
        .bind(c.discount_value)
        .bind(c.min_order_amount.amount())
        .bind(c.max_discount.map(|m| m.amount()))
        .bind(c.usage_limit.map(|l| to_i32(l, "usage_limit")).transpose()?)
        .bind(to_i32(c.per_user_limit, "per_user_limit")?)
        .bind(c.expiry_date)
        .bind(c.is_active)
        .bind(c.for_new_users)
        .bind(c.for_existing_users)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_or(e, "coupon"))?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("coupon"));
        }
        Ok(())
    }

    async fn delete_coupon(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM coupons WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }

    async fn coupon_usage(&self, coupon_id: Uuid, user_id: Uuid) -> Result<u32, StoreError> {
        let row: Option<(i32,)> =
            sqlx::query_as("SELECT count FROM coupon_redemptions WHERE coupon_id = $1 AND user_id = $2")
                .bind(coupon_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map_or(Ok(0), |(count,)| to_u32(count, "redemption count"))
    }

    async fn place_order(
        &self,
        order: &Order,
        cart: &Cart,
        redemption: Option<&CouponRedemption>,
    ) -> Result<(), StoreError> {
        // Dropping `tx` on any early return rolls everything back.
        let mut tx = self.pool.begin().await?;

        // Clearing first also holds the cart row lock until commit.
        let cleared = sqlx::query(
            "UPDATE carts SET items = '[]'::jsonb, updated_at = NOW() WHERE user_id = $1 AND items = $2",
        )
        .bind(order.user_id)
        .bind(Json(&cart.items))
        .execute(&mut *tx)
        .await?;
        if cleared.rows_affected() == 0 {
            return Err(StoreError::CartChanged);
        }

        if let Some(r) = redemption {
            let global = sqlx::query(
                "UPDATE coupons SET used_count = used_count + 1, updated_at = NOW() \
                 WHERE id = $1 AND (usage_limit IS NULL OR used_count < usage_limit)",
            )
            .bind(r.coupon_id)
            .execute(&mut *tx)
            .await?;
            if global.rows_affected() == 0 {
                return Err(StoreError::CouponExhausted);
            }
            let per_user = sqlx::query(
                "INSERT INTO coupon_redemptions (coupon_id, user_id, count) VALUES ($1, $2, 1) \
                 ON CONFLICT (coupon_id, user_id) DO UPDATE SET count = coupon_redemptions.count + 1 \
                 WHERE coupon_redemptions.count < $3",
            )
            .bind(r.coupon_id)
            .bind(r.user_id)
            .bind(to_i32(r.per_user_limit, "per_user_limit")?)
            .execute(&mut *tx)
            .await?;
            if per_user.rows_affected() == 0 {
                return Err(StoreError::CouponExhausted);
            }
        }

        let mut wanted: HashMap<Uuid, u32> = HashMap::new();
        for item in &order.items {
            *wanted.entry(item.product_id).or_default() += item.quantity;
        }
        for (product_id, qty) in wanted {
            let res = sqlx::query("UPDATE products SET stock = stock - $2 WHERE id = $1 AND stock >= $2")
                .bind(product_id)
                .bind(to_i32(qty, "quantity")?)
                .execute(&mut *tx)
                .await?;
            if res.rows_affected() == 0 {
                return Err(StoreError::InsufficientStock(product_id));
            }
        }

        sqlx::query(
            "INSERT INTO orders (id, order_number, user_id, items, subtotal, discount, total_amount, applied_coupon, \
             shipping_address, status, cancellation_reason, order_date, delivered_date, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.user_id)
        .bind(Json(&order.items))
        .bind(order.subtotal.amount())
        .bind(order.discount.amount())
        .bind(order.total_amount.amount())
        .bind(order.applied_coupon.as_ref().map(Json))
        .bind(Json(&order.shipping_address))
        .bind(order.status.as_str())
        .bind(&order.cancellation_reason)
        .bind(order.order_date)
        .bind(order.delivered_date)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| duplicate_or(e, "order"))?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn list_orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY order_date DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Order>, StoreError> {
        let page = page.max(1);
        let status = status.map(|s| s.as_str());
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY order_date DESC LIMIT $2 OFFSET $3"
        ))
        .bind(status)
        .bind(i64::from(per_page))
        .bind(i64::from(page - 1) * i64::from(per_page))
        .fetch_all(&self.pool)
        .await?;
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE ($1::text IS NULL OR status = $1)")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(Page { data: convert_all(rows)?, total: u64::try_from(total).unwrap_or(0), page })
    }

    async fn update_order(&self, order: &Order) -> Result<(), StoreError> {
        let res = sqlx::query(
            "UPDATE orders SET status = $2, cancellation_reason = $3, delivered_date = $4, updated_at = $5 \
             WHERE id = $1",
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(&order.cancellation_reason)
        .bind(order.delivered_date)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("order"));
        }
        Ok(())
    }

    async fn insert_return(&self, r: &ReturnRequest) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO return_requests (id, order_id, user_id, reason, photo_urls, video_url, status, admin_notes, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(r.id)
        .bind(r.order_id)
        .bind(r.user_id)
        .bind(&r.reason)
        .bind(&r.photo_urls)
        .bind(&r.video_url)
        .bind(r.status.as_str())
        .bind(&r.admin_notes)
        .bind(r.created_at)
        .bind(r.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match duplicate_or(e, "return request") {
            StoreError::Duplicate(_) => StoreError::ReturnExists,
            other => other,
        })?;
        Ok(())
    }

    async fn get_return(&self, id: Uuid) -> Result<Option<ReturnRequest>, StoreError> {
        sqlx::query_as::<_, ReturnRow>("SELECT * FROM return_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(ReturnRequest::try_from)
            .transpose()
    }

    async fn return_for_order(&self, order_id: Uuid) -> Result<Option<ReturnRequest>, StoreError> {
        sqlx::query_as::<_, ReturnRow>("SELECT * FROM return_requests WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?
            .map(ReturnRequest::try_from)
            .transpose()
    }

    async fn list_returns(&self, status: Option<ReturnStatus>) -> Result<Vec<ReturnRequest>, StoreError> {
        let rows = sqlx::query_as::<_, ReturnRow>(
            "SELECT * FROM return_requests WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC",
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn update_return(&self, r: &ReturnRequest) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE return_requests SET status = $2, admin_notes = $3, updated_at = $4 WHERE id = $1")
            .bind(r.id)
            .bind(r.status.as_str())
            .bind(&r.admin_notes)
            .bind(r.updated_at)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("return request"));
        }
        Ok(())
    }

    async fn wishlist(&self, user_id: Uuid) -> Result<Wishlist, StoreError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT product_id FROM wishlist_items WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(Wishlist { user_id, product_ids: rows.into_iter().map(|(id,)| id).collect::<BTreeSet<_>>() })
    }

    async fn wishlist_add(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("INSERT INTO wishlist_items (user_id, product_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn wishlist_remove(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
