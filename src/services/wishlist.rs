//! Server-side wishlists.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::aggregates::Wishlist;
use crate::store::Store;
use crate::{EcommerceError, Result};

#[derive(Clone)]
pub struct WishlistService {
    store: Arc<dyn Store>,
}

impl WishlistService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get(&self, user_id: Uuid) -> Result<Wishlist> {
        Ok(self.store.wishlist(user_id).await?)
    }

    /// Adding a product that is already listed changes nothing.
    pub async fn add(&self, user_id: Uuid, product_id: Uuid) -> Result<Wishlist> {
        if self.store.get_product(product_id).await?.is_none() {
            return Err(EcommerceError::NotFound("product"));
        }
        if self.store.wishlist_add(user_id, product_id).await? {
            tracing::debug!(%user_id, %product_id, "wishlist add");
        }
        self.get(user_id).await
    }

    /// Removing an absent product changes nothing.
    pub async fn remove(&self, user_id: Uuid, product_id: Uuid) -> Result<Wishlist> {
        if self.store.wishlist_remove(user_id, product_id).await? {
            tracing::debug!(%user_id, %product_id, "wishlist remove");
        }
        self.get(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Product, ProductDraft};
    use crate::domain::value_objects::Money;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_add_remove_are_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let draft = ProductDraft { name: "Dress Watch".into(), price: Money::from_major(999), ..Default::default() };
        let product = Product::create(draft).unwrap();
        store.upsert_product(&product).await.unwrap();
        let wishlist = WishlistService::new(store);
        let user = Uuid::new_v4();

        wishlist.add(user, product.id).await.unwrap();
        let list = wishlist.add(user, product.id).await.unwrap();
        assert_eq!(list.product_ids.len(), 1);

        wishlist.remove(user, product.id).await.unwrap();
        let list = wishlist.remove(user, product.id).await.unwrap();
        assert!(list.product_ids.is_empty());

        assert!(matches!(wishlist.add(user, Uuid::new_v4()).await, Err(EcommerceError::NotFound("product"))));
    }
}
