//! Wishlist Aggregate

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A user's saved products. Membership changes are idempotent: adding a
/// present product or removing an absent one changes nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wishlist {
    pub user_id: Uuid,
    pub product_ids: BTreeSet<Uuid>,
}

impl Wishlist {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id, product_ids: BTreeSet::new() }
    }

    /// Returns true if the product was newly added.
    pub fn add(&mut self, product_id: Uuid) -> bool {
        self.product_ids.insert(product_id)
    }

    /// Returns true if the product was present.
    pub fn remove(&mut self, product_id: Uuid) -> bool {
        self.product_ids.remove(&product_id)
    }

    pub fn contains(&self, product_id: Uuid) -> bool {
        self.product_ids.contains(&product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_is_idempotent() {
        let mut w = Wishlist::new(Uuid::new_v4());
        let p = Uuid::new_v4();
        assert!(w.add(p));
        assert!(!w.add(p));
        assert_eq!(w.product_ids.len(), 1);
        assert!(w.remove(p));
        assert!(!w.remove(p));
        assert!(!w.contains(p));
    }
}
