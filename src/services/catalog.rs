//! Catalog: products, categories, reviews and reels.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::review::average_rating;
use crate::domain::aggregates::{Category, Product, ProductDraft, Reel, Review, User};
use crate::store::{Page, ProductQuery, Store};
use crate::{EcommerceError, Result};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    pub average_rating: Option<Decimal>,
    pub count: usize,
    pub reviews: Vec<Review>,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
    // Single entry: the active reels list.
    reels: Cache<(), Arc<Vec<Reel>>>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, reels_ttl: Duration) -> Self {
        let reels = Cache::builder().max_capacity(1).time_to_live(reels_ttl).build();
        Self { store, reels }
    }

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    pub async fn list_products(&self, mut query: ProductQuery) -> Result<Page<Product>> {
        query.page = query.page.max(1);
        query.per_page = match query.per_page {
            0 => DEFAULT_PER_PAGE,
            n => n.min(MAX_PER_PAGE),
        };
        query.search = query.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Ok(self.store.list_products(&query).await?)
    }

    pub async fn get_product(&self, id: Uuid) -> Result<Product> {
        self.store.get_product(id).await?.ok_or(EcommerceError::NotFound("product"))
    }

    #[tracing::instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create_product(&self, draft: ProductDraft) -> Result<Product> {
        self.ensure_category(draft.category_id).await?;
        let product = Product::create(draft)?;
        self.store.upsert_product(&product).await?;
        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    #[tracing::instrument(skip(self, draft))]
    pub async fn update_product(&self, id: Uuid, draft: ProductDraft) -> Result<Product> {
        let mut product = self.get_product(id).await?;
        self.ensure_category(draft.category_id).await?;
        product.apply(draft)?;
        self.store.upsert_product(&product).await?;
        Ok(product)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_product(id).await? {
            return Err(EcommerceError::NotFound("product"));
        }
        tracing::info!(product_id = %id, "product deleted");
        Ok(())
    }

    async fn ensure_category(&self, category_id: Option<Uuid>) -> Result<()> {
        match category_id {
            Some(id) if self.store.get_category(id).await?.is_none() => Err(EcommerceError::NotFound("category")),
            _ => Ok(()),
        }
    }

    // -------------------------------------------------------------------------
    // Categories
    // -------------------------------------------------------------------------

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        Ok(self.store.list_categories().await?)
    }

    pub async fn get_category(&self, id: Uuid) -> Result<Category> {
        self.store.get_category(id).await?.ok_or(EcommerceError::NotFound("category"))
    }

    #[tracing::instrument(skip(self, description, image_url))]
    pub async fn create_category(
        &self,
        name: &str,
        description: Option<String>,
        parent_id: Option<Uuid>,
        image_url: Option<String>,
    ) -> Result<Category> {
        self.ensure_category(parent_id).await?;
        let category = Category::new(name, description, parent_id, image_url);
        self.store.insert_category(&category).await?;
        Ok(category)
    }

    pub async fn delete_category(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_category(id).await? {
            return Err(EcommerceError::NotFound("category"));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reviews
    // -------------------------------------------------------------------------

    pub async fn reviews(&self, product_id: Uuid) -> Result<ReviewSummary> {
        self.get_product(product_id).await?;
        let reviews = self.store.list_reviews(product_id).await?;
        Ok(ReviewSummary { average_rating: average_rating(&reviews), count: reviews.len(), reviews })
    }

    /// Adds or replaces `user`'s review of the product.
    #[tracing::instrument(skip(self, user, comment), fields(user_id = %user.id))]
    pub async fn submit_review(
        &self,
        user: &User,
        product_id: Uuid,
        rating: u8,
        comment: Option<String>,
    ) -> Result<Review> {
        self.get_product(product_id).await?;
        let author = user.name.clone().or_else(|| Some(user.email.clone()));
        let review = Review::new(product_id, user.id, author, rating, comment)?;
        self.store.upsert_review(&review).await?;
        Ok(review)
    }

    // -------------------------------------------------------------------------
    // Reels
    // -------------------------------------------------------------------------

    /// Active reels, served from cache within the freshness window.
    pub async fn active_reels(&self) -> Result<Arc<Vec<Reel>>> {
        if let Some(reels) = self.reels.get(&()).await {
            tracing::debug!("reels cache hit");
            return Ok(reels);
        }
        let reels = Arc::new(self.store.list_reels(true).await?);
        self.reels.insert((), reels.clone()).await;
        Ok(reels)
    }

    pub async fn all_reels(&self) -> Result<Vec<Reel>> {
        Ok(self.store.list_reels(false).await?)
    }

    pub async fn create_reel(
        &self,
        title: &str,
        video_url: &str,
        thumbnail_url: Option<String>,
        product_id: Option<Uuid>,
        is_active: bool,
    ) -> Result<Reel> {
        if let Some(id) = product_id {
            self.get_product(id).await?;
        }
        let reel = Reel {
            id: Uuid::now_v7(),
            title: title.trim().to_string(),
            video_url: video_url.trim().to_string(),
            thumbnail_url,
            product_id,
            is_active,
            created_at: chrono::Utc::now(),
        };
        self.store.insert_reel(&reel).await?;
        self.reels.invalidate(&()).await;
        Ok(reel)
    }

    pub async fn delete_reel(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_reel(id).await? {
            return Err(EcommerceError::NotFound("reel"));
        }
        self.reels.invalidate(&()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Role;
    use crate::domain::value_objects::Money;
    use crate::store::MemoryStore;

    fn service() -> CatalogService {
        CatalogService::new(Arc::new(MemoryStore::new()), Duration::from_secs(600))
    }

    fn draft(name: &str, price: i64) -> ProductDraft {
        ProductDraft { name: name.into(), price: Money::from_major(price), stock: 5, ..Default::default() }
    }

    #[tokio::test]
    async fn test_search_and_pagination() {
        let catalog = service();
        for i in 0..3 {
            catalog.create_product(draft(&format!("Chrono {i}"), 100)).await.unwrap();
        }
        catalog.create_product(draft("Leather Strap", 20)).await.unwrap();

        let page = catalog
            .list_products(ProductQuery { search: Some("chrono".into()), per_page: 2, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.page, 1);
    }

    #[tokio::test]
    async fn test_unknown_category_rejected() {
        let catalog = service();
        let mut d = draft("Diver", 300);
        d.category_id = Some(Uuid::new_v4());
        assert!(matches!(catalog.create_product(d).await, Err(EcommerceError::NotFound("category"))));
    }

    #[tokio::test]
    async fn test_review_replaces_previous() {
        let catalog = service();
        let product = catalog.create_product(draft("Pilot", 250)).await.unwrap();
        let user = User::new("a@shop.test", Some("Asha".into()), Role::Customer);

        catalog.submit_review(&user, product.id, 2, None).await.unwrap();
        catalog.submit_review(&user, product.id, 4, Some("grew on me".into())).await.unwrap();

        let summary = catalog.reviews(product.id).await.unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(summary.average_rating, Some(Decimal::from(4)));
    }

    #[tokio::test]
    async fn test_reel_cache_invalidated_on_write() {
        let catalog = service();
        assert!(catalog.active_reels().await.unwrap().is_empty());

        let reel = catalog.create_reel("Unboxing", "https://cdn/r1.mp4", None, None, true).await.unwrap();
        catalog.create_reel("Draft", "https://cdn/r2.mp4", None, None, false).await.unwrap();
        let reels = catalog.active_reels().await.unwrap();
        assert_eq!(reels.len(), 1);

        catalog.delete_reel(reel.id).await.unwrap();
        assert!(catalog.active_reels().await.unwrap().is_empty());
    }
}
