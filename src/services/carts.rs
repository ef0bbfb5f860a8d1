//! Per-user carts.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartItem, PricedCart, Product};
use crate::domain::value_objects::Quantity;
use crate::store::Store;
use crate::{EcommerceError, Result};

/// A line the customer wants to add.
#[derive(Clone, Debug)]
pub struct AddToCart {
    pub product_id: Uuid,
    pub quantity: u32,
    pub size: Option<String>,
    pub color: Option<String>,
    pub box_type: Option<String>,
}

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
}

impl CartService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The user's cart priced at current catalog prices.
    pub async fn priced(&self, user_id: Uuid) -> Result<PricedCart> {
        let cart = self.store.get_cart(user_id).await?;
        self.price(&cart).await
    }

    pub(crate) async fn price(&self, cart: &Cart) -> Result<PricedCart> {
        let products: HashMap<Uuid, Product> = self
            .store
            .get_products(&cart.product_ids())
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        Ok(cart.price(&products)?)
    }

    #[tracing::instrument(skip(self, line), fields(product_id = %line.product_id))]
    pub async fn add_item(&self, user_id: Uuid, line: AddToCart) -> Result<PricedCart> {
        let product = self.store.get_product(line.product_id).await?.ok_or(EcommerceError::NotFound("product"))?;
        let quantity = Quantity::new(line.quantity)?;
        let item = CartItem::for_product(&product, quantity, line.size, line.color, line.box_type)?;

        let mut cart = self.store.get_cart(user_id).await?;
        cart.add_item(item);
        self.store.save_cart(&cart).await?;
        self.price(&cart).await
    }

    /// Sets the quantity of the line at `index`; zero removes it.
    pub async fn update_quantity(&self, user_id: Uuid, index: usize, quantity: u32) -> Result<PricedCart> {
        let mut cart = self.store.get_cart(user_id).await?;
        cart.update_quantity(index, quantity)?;
        self.store.save_cart(&cart).await?;
        self.price(&cart).await
    }

    pub async fn remove_item(&self, user_id: Uuid, index: usize) -> Result<PricedCart> {
        let mut cart = self.store.get_cart(user_id).await?;
        cart.remove_item(index)?;
        self.store.save_cart(&cart).await?;
        self.price(&cart).await
    }

    pub async fn clear(&self, user_id: Uuid) -> Result<()> {
        let mut cart = self.store.get_cart(user_id).await?;
        cart.clear();
        self.store.save_cart(&cart).await?;
        Ok(())
    }
}
