//! Categories and promotional reels

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: &str, description: Option<String>, parent_id: Option<Uuid>, image_url: Option<String>) -> Self {
        let name = name.trim();
        Self {
            id: Uuid::now_v7(),
            name: name.to_string(),
            slug: slugify(name),
            description,
            parent_id,
            image_url,
            created_at: Utc::now(),
        }
    }
}

pub fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Short promotional video shown on the storefront.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reel {
    pub id: Uuid,
    pub title: String,
    pub video_url: String,
    pub thumbnail_url: Option<String>,
    pub product_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
