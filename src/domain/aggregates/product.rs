//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::Money;

/// Packaging upsell (e.g. a gift box) priced on top of the product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxOption {
    pub name: String,
    pub price: Money,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub category_id: Option<Uuid>,
    /// Brand or sub-category label.
    pub sub_category: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
    pub original_price: Option<Money>,
    pub stock: u32,
    pub images: Vec<String>,
    pub color_options: Vec<String>,
    pub box_options: Vec<BoxOption>,
    pub sizes: Vec<String>,
    /// Category-specific fields, e.g. `dialColor` or `strapMaterial` for watches.
    pub attributes: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable product fields, shared by create and update.
#[derive(Clone, Debug, Default)]
pub struct ProductDraft {
    pub category_id: Option<Uuid>,
    pub sub_category: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
    pub original_price: Option<Money>,
    pub stock: u32,
    pub images: Vec<String>,
    pub color_options: Vec<String>,
    pub box_options: Vec<BoxOption>,
    pub sizes: Vec<String>,
    pub attributes: HashMap<String, serde_json::Value>,
}

impl ProductDraft {
    fn validate(&self) -> Result<(), ProductError> {
        if self.name.trim().is_empty() {
            return Err(ProductError::MissingName);
        }
        if self.price.is_negative() || self.price.is_zero() {
            return Err(ProductError::InvalidPricing("price must be positive".into()));
        }
        if let Some(original) = self.original_price {
            if self.price > original {
                return Err(ProductError::InvalidPricing(
                    "price cannot exceed the original price".into(),
                ));
            }
        }
        if self.box_options.iter().any(|b| b.price.is_negative()) {
            return Err(ProductError::InvalidPricing("box price cannot be negative".into()));
        }
        Ok(())
    }
}

impl Product {
    pub fn create(draft: ProductDraft) -> Result<Self, ProductError> {
        draft.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(),
            category_id: draft.category_id,
            sub_category: draft.sub_category,
            name: draft.name.trim().to_string(),
            description: draft.description,
            price: draft.price,
            original_price: draft.original_price,
            stock: draft.stock,
            images: draft.images,
            color_options: draft.color_options,
            box_options: draft.box_options,
            sizes: draft.sizes,
            attributes: draft.attributes,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply(&mut self, draft: ProductDraft) -> Result<(), ProductError> {
        draft.validate()?;
        self.category_id = draft.category_id;
        self.sub_category = draft.sub_category;
        self.name = draft.name.trim().to_string();
        self.description = draft.description;
        self.price = draft.price;
        self.original_price = draft.original_price;
        self.stock = draft.stock;
        self.images = draft.images;
        self.color_options = draft.color_options;
        self.box_options = draft.box_options;
        self.sizes = draft.sizes;
        self.attributes = draft.attributes;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Percentage off the original price, derived from the two prices.
    pub fn discount_percent(&self) -> u32 {
        let Some(original) = self.original_price else { return 0 };
        if original.is_zero() || self.price >= original {
            return 0;
        }
        let pct = (original.amount() - self.price.amount()) / original.amount() * Decimal::ONE_HUNDRED;
        pct.round().to_u32().unwrap_or(0)
    }

    /// Price of the named box option. `None` means no box was chosen.
    pub fn box_price(&self, box_type: Option<&str>) -> Result<Money, ProductError> {
        match box_type {
            None => Ok(Money::ZERO),
            Some(name) => self
                .box_options
                .iter()
                .find(|b| b.name.eq_ignore_ascii_case(name))
                .map(|b| b.price)
                .ok_or_else(|| ProductError::UnknownBox(name.to_string())),
        }
    }

    pub fn is_in_stock(&self) -> bool {
        self.stock > 0
    }

    pub fn matches_search(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.name.to_lowercase().contains(&q)
            || self.sub_category.as_deref().is_some_and(|s| s.to_lowercase().contains(&q))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("product name is required")]
    MissingName,
    #[error("invalid pricing: {0}")]
    InvalidPricing(String),
    #[error("unknown box option '{0}'")]
    UnknownBox(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ProductDraft {
        ProductDraft {
            name: "Chrono Steel".into(),
            price: Money::from_major(750),
            original_price: Some(Money::from_major(1000)),
            stock: 4,
            box_options: vec![BoxOption { name: "Gift Box".into(), price: Money::from_major(99) }],
            ..Default::default()
        }
    }

    #[test]
    fn test_discount_percent_is_derived() {
        let p = Product::create(draft()).unwrap();
        assert_eq!(p.discount_percent(), 25);
    }

    #[test]
    fn test_price_above_original_rejected() {
        let mut d = draft();
        d.price = Money::from_major(1200);
        assert!(matches!(Product::create(d), Err(ProductError::InvalidPricing(_))));
    }

    #[test]
    fn test_box_price_lookup() {
        let p = Product::create(draft()).unwrap();
        assert_eq!(p.box_price(None).unwrap(), Money::ZERO);
        assert_eq!(p.box_price(Some("gift box")).unwrap(), Money::from_major(99));
        assert_eq!(p.box_price(Some("Crate")), Err(ProductError::UnknownBox("Crate".into())));
    }

    #[test]
    fn test_search_matches_brand() {
        let mut d = draft();
        d.sub_category = Some("Titan".into());
        let p = Product::create(d).unwrap();
        assert!(p.matches_search("titan"));
        assert!(p.matches_search("STEEL"));
        assert!(!p.matches_search("leather"));
    }
}
