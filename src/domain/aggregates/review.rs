//! Product reviews

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub author_name: Option<String>,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn new(
        product_id: Uuid,
        user_id: Uuid,
        author_name: Option<String>,
        rating: u8,
        comment: Option<String>,
    ) -> Result<Self, ReviewError> {
        if !(1..=5).contains(&rating) {
            return Err(ReviewError::RatingOutOfRange(rating));
        }
        Ok(Self {
            id: Uuid::now_v7(),
            product_id,
            user_id,
            author_name,
            rating,
            comment: comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            created_at: Utc::now(),
        })
    }
}

/// Mean rating to one decimal place, `None` without reviews.
pub fn average_rating(reviews: &[Review]) -> Option<Decimal> {
    if reviews.is_empty() {
        return None;
    }
    let total: u32 = reviews.iter().map(|r| u32::from(r.rating)).sum();
    let count = u32::try_from(reviews.len()).unwrap_or(u32::MAX);
    Some((Decimal::from(total) / Decimal::from(count)).round_dp(1))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewError {
    #[error("rating must be between 1 and 5, got {0}")]
    RatingOutOfRange(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_bounds() {
        let p = Uuid::new_v4();
        assert!(Review::new(p, Uuid::new_v4(), None, 0, None).is_err());
        assert!(Review::new(p, Uuid::new_v4(), None, 6, None).is_err());
        assert!(Review::new(p, Uuid::new_v4(), None, 5, Some("  ".into())).unwrap().comment.is_none());
    }

    #[test]
    fn test_average() {
        let p = Uuid::new_v4();
        let reviews: Vec<Review> = [5u8, 4, 4]
            .iter()
            .map(|&r| Review::new(p, Uuid::new_v4(), None, r, None).unwrap())
            .collect();
        assert_eq!(average_rating(&reviews), Some(Decimal::new(43, 1)));
        assert_eq!(average_rating(&[]), None);
    }
}
