//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::product::{Product, ProductError};
use crate::domain::value_objects::{Money, Quantity};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub user_id: Uuid,
    pub items: Vec<CartItem>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: Uuid,
    pub quantity: Quantity,
    pub selected_size: Option<String>,
    pub selected_color: Option<String>,
    pub selected_box_type: Option<String>,
    pub box_price: Money,
}

impl CartItem {
    /// Builds a line for `product`, resolving the box price from the
    /// product's own box options.
    pub fn for_product(
        product: &Product,
        quantity: Quantity,
        size: Option<String>,
        color: Option<String>,
        box_type: Option<String>,
    ) -> Result<Self, CartError> {
        let box_price = product.box_price(box_type.as_deref())?;
        Ok(Self {
            product_id: product.id,
            quantity,
            selected_size: size,
            selected_color: color,
            selected_box_type: box_type,
            box_price,
        })
    }

    pub fn line_total(&self, unit_price: Money) -> Money {
        (unit_price + self.box_price) * self.quantity.value()
    }

    fn same_line(&self, other: &CartItem) -> bool {
        self.product_id == other.product_id
            && self.selected_size == other.selected_size
            && self.selected_color == other.selected_color
            && self.selected_box_type == other.selected_box_type
    }
}

/// A cart line priced against the current catalog.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedLine {
    #[serde(flatten)]
    pub item: CartItem,
    pub name: String,
    pub image: Option<String>,
    pub unit_price: Money,
    pub line_total: Money,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedCart {
    pub lines: Vec<PricedLine>,
    pub subtotal: Money,
}

impl Cart {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id, items: vec![], updated_at: Utc::now() }
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn add_item(&mut self, item: CartItem) {
        if let Some(existing) = self.items.iter_mut().find(|i| i.same_line(&item)) {
            existing.quantity = existing.quantity.add(item.quantity);
        } else {
            self.items.push(item);
        }
        self.touch();
    }

    /// Sets the quantity of the line at `index`; zero removes it.
    pub fn update_quantity(&mut self, index: usize, quantity: u32) -> Result<(), CartError> {
        if index >= self.items.len() {
            return Err(CartError::ItemNotFound);
        }
        match Quantity::new(quantity) {
            Ok(q) => self.items[index].quantity = q,
            Err(_) => {
                self.items.remove(index);
            }
        }
        self.touch();
        Ok(())
    }

    pub fn remove_item(&mut self, index: usize) -> Result<CartItem, CartError> {
        if index >= self.items.len() {
            return Err(CartError::ItemNotFound);
        }
        let removed = self.items.remove(index);
        self.touch();
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.touch();
    }

    pub fn product_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.items.iter().map(|i| i.product_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Prices every line at the product's current price. A line whose
    /// product has disappeared from the catalog fails the whole cart.
    pub fn price(&self, products: &HashMap<Uuid, Product>) -> Result<PricedCart, CartError> {
        let lines = self
            .items
            .iter()
            .map(|item| {
                let product = products
                    .get(&item.product_id)
                    .ok_or(CartError::ProductUnavailable(item.product_id))?;
                Ok(PricedLine {
                    item: item.clone(),
                    name: product.name.clone(),
                    image: product.images.first().cloned(),
                    unit_price: product.price,
                    line_total: item.line_total(product.price),
                })
            })
            .collect::<Result<Vec<_>, CartError>>()?;
        let subtotal = lines.iter().map(|l| l.line_total).sum();
        Ok(PricedCart { lines, subtotal })
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("cart item not found")]
    ItemNotFound,
    #[error("cart is empty")]
    EmptyCart,
    #[error("cart changed during checkout, review it and place the order again")]
    Changed,
    #[error("product {0} is no longer available")]
    ProductUnavailable(Uuid),
    #[error("{0}")]
    Product(#[from] ProductError),
}
