//! In-process store. Every operation runs under one lock, which is what
//! makes `place_order` and `insert_return` atomic here.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CouponRedemption, Page, ProductQuery, Store, StoreError};
use crate::domain::aggregates::{
    Cart, Category, Coupon, Order, OrderStatus, Product, Reel, ReturnRequest, ReturnStatus, Review, User, Wishlist,
};
use crate::domain::value_objects::CouponCode;

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    categories: HashMap<Uuid, Category>,
    products: HashMap<Uuid, Product>,
    reviews: Vec<Review>,
    reels: Vec<Reel>,
    carts: HashMap<Uuid, Cart>,
    coupons: HashMap<Uuid, Coupon>,
    coupon_usage: HashMap<(Uuid, Uuid), u32>,
    orders: HashMap<Uuid, Order>,
    returns: HashMap<Uuid, ReturnRequest>,
    wishlists: HashMap<Uuid, Wishlist>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T: Clone>(items: Vec<T>, page: u32, per_page: u32) -> Page<T> {
    let page = page.max(1);
    let total = items.len() as u64;
    let skip = (page as usize - 1) * per_page as usize;
    let data = items.into_iter().skip(skip).take(per_page as usize).collect();
    Page { data, total, page }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.users.values().any(|u| u.email == user.email || u.api_token == user.api_token) {
            return Err(StoreError::Duplicate("user"));
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn user_by_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.values().find(|u| u.api_token == token).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.users.values().any(|u| u.id != user.id && u.api_token == user.api_token) {
            return Err(StoreError::Duplicate("user"));
        }
        let stored = inner.users.get_mut(&user.id).ok_or(StoreError::NotFound("user"))?;
        stored.name = user.name.clone();
        stored.role = user.role;
        stored.api_token = user.api_token.clone();
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let inner = self.inner.lock().await;
        let mut users: Vec<User> = inner.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn count_orders_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.orders.values().filter(|o| o.user_id == user_id).count() as u64)
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let inner = self.inner.lock().await;
        let mut cats: Vec<Category> = inner.categories.values().cloned().collect();
        cats.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(cats)
    }

    async fn get_category(&self, id: Uuid) -> Result<Option<Category>, StoreError> {
        Ok(self.inner.lock().await.categories.get(&id).cloned())
    }

    async fn insert_category(&self, category: &Category) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.categories.values().any(|c| c.slug == category.slug) {
            return Err(StoreError::Duplicate("category"));
        }
        inner.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn delete_category(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.categories.remove(&id).is_some())
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<Page<Product>, StoreError> {
        let inner = self.inner.lock().await;
        let mut products: Vec<Product> = inner
            .products
            .values()
            .filter(|p| query.category_id.map_or(true, |c| p.category_id == Some(c)))
            .filter(|p| query.search.as_deref().map_or(true, |q| p.matches_search(q)))
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(products, query.page, query.per_page))
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.inner.lock().await.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(ids.iter().filter_map(|id| inner.products.get(id).cloned()).collect())
    }

    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError> {
        self.inner.lock().await.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let removed = inner.products.remove(&id).is_some();
        if removed {
            for w in inner.wishlists.values_mut() {
                w.remove(id);
            }
        }
        Ok(removed)
    }

    async fn upsert_review(&self, review: &Review) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .reviews
            .retain(|r| !(r.product_id == review.product_id && r.user_id == review.user_id));
        inner.reviews.push(review.clone());
        Ok(())
    }

    async fn list_reviews(&self, product_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let inner = self.inner.lock().await;
        let mut reviews: Vec<Review> = inner.reviews.iter().filter(|r| r.product_id == product_id).cloned().collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }

    async fn list_reels(&self, active_only: bool) -> Result<Vec<Reel>, StoreError> {
        let inner = self.inner.lock().await;
        let mut reels: Vec<Reel> = inner.reels.iter().filter(|r| !active_only || r.is_active).cloned().collect();
        reels.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reels)
    }

    async fn insert_reel(&self, reel: &Reel) -> Result<(), StoreError> {
        self.inner.lock().await.reels.push(reel.clone());
        Ok(())
    }

    async fn delete_reel(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let before = inner.reels.len();
        inner.reels.retain(|r| r.id != id);
        Ok(inner.reels.len() != before)
    }

    async fn get_cart(&self, user_id: Uuid) -> Result<Cart, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.carts.get(&user_id).cloned().unwrap_or_else(|| Cart::new(user_id)))
    }

    async fn save_cart(&self, cart: &Cart) -> Result<(), StoreError> {
        self.inner.lock().await.carts.insert(cart.user_id, cart.clone());
        Ok(())
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>, StoreError> {
        let inner = self.inner.lock().await;
        let mut coupons: Vec<Coupon> = inner.coupons.values().cloned().collect();
        coupons.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(coupons)
    }

    async fn get_coupon(&self, id: Uuid) -> Result<Option<Coupon>, StoreError> {
        Ok(self.inner.lock().await.coupons.get(&id).cloned())
    }

    async fn coupon_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.coupons.values().find(|c| &c.code == code).cloned())
    }

    async fn insert_coupon(&self, coupon: &Coupon) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.coupons.values().any(|c| c.code == coupon.code) {
            return Err(StoreError::Duplicate("coupon"));
        }
        inner.coupons.insert(coupon.id, coupon.clone());
        Ok(())
    }

    async fn update_coupon(&self, coupon: &Coupon) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.coupons.values().any(|c| c.code == coupon.code && c.id != coupon.id) {
            return Err(StoreError::Duplicate("coupon"));
        }
        let existing = inner.coupons.get_mut(&coupon.id).ok_or(StoreError::NotFound("coupon"))?;
        // The redemption counter is owned by place_order.
        let used_count = existing.used_count;
        *existing = coupon.clone();
        existing.used_count = used_count;
        Ok(())
    }

    async fn delete_coupon(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.coupons.remove(&id).is_some())
    }

    async fn coupon_usage(&self, coupon_id: Uuid, user_id: Uuid) -> Result<u32, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.coupon_usage.get(&(coupon_id, user_id)).copied().unwrap_or(0))
    }

    async fn place_order(
        &self,
        order: &Order,
        cart: &Cart,
        redemption: Option<&CouponRedemption>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;

        // Check everything first so a failure leaves no partial writes.
        let current = inner.carts.get(&order.user_id).map_or(&[][..], |c| c.items.as_slice());
        if current != cart.items.as_slice() {
            return Err(StoreError::CartChanged);
        }
        if inner.orders.values().any(|o| o.id == order.id || o.order_number == order.order_number) {
            return Err(StoreError::Duplicate("order"));
        }
        if let Some(r) = redemption {
            let coupon = inner.coupons.get(&r.coupon_id).ok_or(StoreError::NotFound("coupon"))?;
            if r.usage_limit.is_some_and(|limit| coupon.used_count >= limit) {
                return Err(StoreError::CouponExhausted);
            }
            let used_by_user = inner.coupon_usage.get(&(r.coupon_id, r.user_id)).copied().unwrap_or(0);
            if used_by_user >= r.per_user_limit {
                return Err(StoreError::CouponExhausted);
            }
        }
        let mut wanted: HashMap<Uuid, u32> = HashMap::new();
        for item in &order.items {
            *wanted.entry(item.product_id).or_default() += item.quantity;
        }
        for (product_id, qty) in &wanted {
            let product = inner.products.get(product_id).ok_or(StoreError::NotFound("product"))?;
            if product.stock < *qty {
                return Err(StoreError::InsufficientStock(*product_id));
            }
        }

        if let Some(r) = redemption {
            if let Some(coupon) = inner.coupons.get_mut(&r.coupon_id) {
                coupon.used_count += 1;
            }
            *inner.coupon_usage.entry((r.coupon_id, r.user_id)).or_default() += 1;
        }
        for (product_id, qty) in wanted {
            if let Some(product) = inner.products.get_mut(&product_id) {
                product.stock -= qty;
            }
        }
        inner.orders.insert(order.id, order.clone());
        if let Some(cart) = inner.carts.get_mut(&order.user_id) {
            cart.clear();
        }
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.inner.lock().await.orders.get(&id).cloned())
    }

    async fn list_orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<Order> = inner.orders.values().filter(|o| o.user_id == user_id).cloned().collect();
        orders.sort_by(|a, b| b.order_date.cmp(&a.order_date));
        Ok(orders)
    }

    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Order>, StoreError> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| status.map_or(true, |s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.order_date.cmp(&a.order_date));
        Ok(paginate(orders, page, per_page))
    }

    async fn update_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let stored = inner.orders.get_mut(&order.id).ok_or(StoreError::NotFound("order"))?;
        stored.status = order.status;
        stored.cancellation_reason = order.cancellation_reason.clone();
        stored.delivered_date = order.delivered_date;
        stored.updated_at = order.updated_at;
        Ok(())
    }

    async fn insert_return(&self, request: &ReturnRequest) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.returns.values().any(|r| r.order_id == request.order_id) {
            return Err(StoreError::ReturnExists);
        }
        inner.returns.insert(request.id, request.clone());
        Ok(())
    }

    async fn get_return(&self, id: Uuid) -> Result<Option<ReturnRequest>, StoreError> {
        Ok(self.inner.lock().await.returns.get(&id).cloned())
    }

    async fn return_for_order(&self, order_id: Uuid) -> Result<Option<ReturnRequest>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.returns.values().find(|r| r.order_id == order_id).cloned())
    }

    async fn list_returns(&self, status: Option<ReturnStatus>) -> Result<Vec<ReturnRequest>, StoreError> {
        let inner = self.inner.lock().await;
        let mut returns: Vec<ReturnRequest> = inner
            .returns
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        returns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(returns)
    }

    async fn update_return(&self, request: &ReturnRequest) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let stored = inner.returns.get_mut(&request.id).ok_or(StoreError::NotFound("return request"))?;
        stored.status = request.status;
        stored.admin_notes = request.admin_notes.clone();
        stored.updated_at = request.updated_at;
        Ok(())
    }

    async fn wishlist(&self, user_id: Uuid) -> Result<Wishlist, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.wishlists.get(&user_id).cloned().unwrap_or_else(|| Wishlist::new(user_id)))
    }

    async fn wishlist_add(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.wishlists.entry(user_id).or_insert_with(|| Wishlist::new(user_id)).add(product_id))
    }

    async fn wishlist_remove(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.wishlists.get_mut(&user_id).is_some_and(|w| w.remove(product_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{
        CartItem, CouponDraft, DiscountType, ProductDraft, ShippingAddress,
    };
    use crate::domain::value_objects::{Money, Quantity};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    async fn seed_product(store: &MemoryStore, stock: u32) -> Product {
        let p = Product::create(ProductDraft {
            name: "Diver".into(),
            price: Money::from_major(1000),
            stock,
            ..Default::default()
        })
        .unwrap();
        store.upsert_product(&p).await.unwrap();
        p
    }

    async fn seed_coupon(store: &MemoryStore, usage_limit: Option<u32>, per_user_limit: u32) -> Coupon {
        let c = Coupon::create(CouponDraft {
            code: CouponCode::new("ONCE").unwrap(),
            description: None,
            discount_type: DiscountType::Fixed,
            discount_value: Decimal::from(100),
            min_order_amount: Money::ZERO,
            max_discount: None,
            usage_limit,
            per_user_limit,
            expiry_date: None,
            is_active: true,
            for_new_users: false,
            for_existing_users: false,
        })
        .unwrap();
        store.insert_coupon(&c).await.unwrap();
        c
    }

    /// Stores a cart holding `qty` of `product` and prices an order from it.
    async fn checkout(store: &MemoryStore, user_id: Uuid, product: &Product, qty: u32) -> (Cart, Order) {
        let mut cart = Cart::new(user_id);
        cart.add_item(CartItem::for_product(product, Quantity::new(qty).unwrap(), None, None, None).unwrap());
        store.save_cart(&cart).await.unwrap();
        let products = HashMap::from([(product.id, product.clone())]);
        let priced = cart.price(&products).unwrap();
        let order = Order::place(user_id, &priced, None, ShippingAddress::default(), Utc::now()).unwrap();
        (cart, order)
    }

    #[tokio::test]
    async fn test_last_coupon_slot_goes_to_one_order() {
        let store = Arc::new(MemoryStore::new());
        let product = seed_product(&store, 10).await;
        let coupon = seed_coupon(&store, Some(1), 1).await;

        let mut handles = Vec::new();
        for _ in 0..2 {
            let store = Arc::clone(&store);
            let product = product.clone();
            let coupon = coupon.clone();
            handles.push(tokio::spawn(async move {
                let user = Uuid::new_v4();
                let (cart, order) = checkout(&store, user, &product, 1).await;
                let redemption = CouponRedemption::for_coupon(&coupon, user);
                store.place_order(&order, &cart, Some(&redemption)).await
            }));
        }
        let mut ok = 0;
        let mut exhausted = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(()) => ok += 1,
                Err(StoreError::CouponExhausted) => exhausted += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((ok, exhausted), (1, 1));
        assert_eq!(store.get_coupon(coupon.id).await.unwrap().unwrap().used_count, 1);
    }

    #[tokio::test]
    async fn test_per_user_limit_enforced_at_placement() {
        let store = MemoryStore::new();
        let product = seed_product(&store, 10).await;
        let coupon = seed_coupon(&store, None, 2).await;
        let user = Uuid::new_v4();
        let redemption = CouponRedemption::for_coupon(&coupon, user);
        for _ in 0..2 {
            let (cart, order) = checkout(&store, user, &product, 1).await;
            store.place_order(&order, &cart, Some(&redemption)).await.unwrap();
        }
        let (cart, order) = checkout(&store, user, &product, 1).await;
        let err = store.place_order(&order, &cart, Some(&redemption)).await.unwrap_err();
        assert!(matches!(err, StoreError::CouponExhausted));
        assert_eq!(store.coupon_usage(coupon.id, user).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_placement_writes_nothing() {
        let store = MemoryStore::new();
        let product = seed_product(&store, 1).await;
        let coupon = seed_coupon(&store, None, 1).await;
        let user = Uuid::new_v4();
        let (cart, order) = checkout(&store, user, &product, 2).await;
        let redemption = CouponRedemption::for_coupon(&coupon, user);
        let err = store.place_order(&order, &cart, Some(&redemption)).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientStock(id) if id == product.id));
        assert_eq!(store.get_coupon(coupon.id).await.unwrap().unwrap().used_count, 0);
        assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 1);
        assert!(store.get_order(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_placement_clears_cart_and_stock() {
        let store = MemoryStore::new();
        let product = seed_product(&store, 5).await;
        let user = Uuid::new_v4();
        let (cart, order) = checkout(&store, user, &product, 2).await;
        store.place_order(&order, &cart, None).await.unwrap();
        assert!(store.get_cart(user).await.unwrap().is_empty());
        assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 3);
        assert_eq!(store.count_orders_for_user(user).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_item_added_during_checkout_is_kept() {
        let store = MemoryStore::new();
        let watch = seed_product(&store, 5).await;
        let strap = seed_product(&store, 5).await;
        let user = Uuid::new_v4();
        let (snapshot, order) = checkout(&store, user, &watch, 1).await;

        let mut cart = store.get_cart(user).await.unwrap();
        cart.add_item(CartItem::for_product(&strap, Quantity::new(1).unwrap(), None, None, None).unwrap());
        store.save_cart(&cart).await.unwrap();

        let err = store.place_order(&order, &snapshot, None).await.unwrap_err();
        assert!(matches!(err, StoreError::CartChanged));
        assert_eq!(store.get_cart(user).await.unwrap().items.len(), 2);
        assert_eq!(store.get_product(watch.id).await.unwrap().unwrap().stock, 5);
        assert!(store.get_order(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_order_numbers_are_unique() {
        let store = MemoryStore::new();
        let product = seed_product(&store, 5).await;
        let user = Uuid::new_v4();
        let (cart, first) = checkout(&store, user, &product, 1).await;
        store.place_order(&first, &cart, None).await.unwrap();

        let (cart, mut second) = checkout(&store, user, &product, 1).await;
        second.order_number = first.order_number.clone();
        let err = store.place_order(&second, &cart, None).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("order")));
        assert_eq!(store.get_cart(user).await.unwrap().items.len(), 1);
        assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 4);
    }
}
