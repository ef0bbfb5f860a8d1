//! Coupon Aggregate
//!
//! Eligibility is checked in a fixed order so the same coupon and cart
//! always fail with the same reason: activity, expiry, usage limits,
//! minimum order, then audience targeting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::{CouponCode, Money};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::Fixed => "fixed",
        }
    }
}

impl std::str::FromStr for DiscountType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(Self::Percentage),
            "fixed" => Ok(Self::Fixed),
            other => Err(format!("unknown discount type '{other}'")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: Uuid,
    pub code: CouponCode,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_order_amount: Money,
    /// Cap on the computed discount; only meaningful for percentage coupons.
    pub max_discount: Option<Money>,
    /// `None` means unlimited.
    pub usage_limit: Option<u32>,
    pub per_user_limit: u32,
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub for_new_users: bool,
    pub for_existing_users: bool,
    pub used_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Admin-editable coupon fields.
#[derive(Clone, Debug)]
pub struct CouponDraft {
    pub code: CouponCode,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_order_amount: Money,
    pub max_discount: Option<Money>,
    pub usage_limit: Option<u32>,
    pub per_user_limit: u32,
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub for_new_users: bool,
    pub for_existing_users: bool,
}

impl CouponDraft {
    fn validate(&self) -> Result<(), CouponError> {
        let value = self.discount_value;
        match self.discount_type {
            DiscountType::Percentage if value <= Decimal::ZERO || value > Decimal::ONE_HUNDRED => {
                return Err(CouponError::InvalidDefinition(
                    "percentage must be greater than 0 and at most 100".into(),
                ));
            }
            DiscountType::Fixed if value <= Decimal::ZERO => {
                return Err(CouponError::InvalidDefinition("fixed discount must be positive".into()));
            }
            _ => {}
        }
        if self.min_order_amount.is_negative() {
            return Err(CouponError::InvalidDefinition("minimum order amount cannot be negative".into()));
        }
        if self.max_discount.is_some_and(|m| m.is_negative() || m.is_zero()) {
            return Err(CouponError::InvalidDefinition("max discount must be positive".into()));
        }
        if self.per_user_limit == 0 {
            return Err(CouponError::InvalidDefinition("per-user limit must be at least 1".into()));
        }
        if self.for_new_users && self.for_existing_users {
            return Err(CouponError::InvalidDefinition(
                "a coupon cannot target both new and existing users".into(),
            ));
        }
        Ok(())
    }
}

/// What the coupon needs to know about the redeeming customer.
#[derive(Clone, Copy, Debug, Default)]
pub struct RedemptionContext {
    /// Times this user has already redeemed the coupon.
    pub user_usage: u32,
    /// True when the user has never placed an order.
    pub is_first_time: bool,
}

impl Coupon {
    pub fn create(draft: CouponDraft) -> Result<Self, CouponError> {
        draft.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(),
            code: draft.code,
            description: draft.description,
            discount_type: draft.discount_type,
            discount_value: draft.discount_value,
            min_order_amount: draft.min_order_amount,
            max_discount: draft.max_discount,
            usage_limit: draft.usage_limit,
            per_user_limit: draft.per_user_limit,
            expiry_date: draft.expiry_date,
            is_active: draft.is_active,
            for_new_users: draft.for_new_users,
            for_existing_users: draft.for_existing_users,
            used_count: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replaces the editable fields. `used_count` survives edits.
    pub fn apply(&mut self, draft: CouponDraft) -> Result<(), CouponError> {
        draft.validate()?;
        self.code = draft.code;
        self.description = draft.description;
        self.discount_type = draft.discount_type;
        self.discount_value = draft.discount_value;
        self.min_order_amount = draft.min_order_amount;
        self.max_discount = draft.max_discount;
        self.usage_limit = draft.usage_limit;
        self.per_user_limit = draft.per_user_limit;
        self.expiry_date = draft.expiry_date;
        self.is_active = draft.is_active;
        self.for_new_users = draft.for_new_users;
        self.for_existing_users = draft.for_existing_users;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Checks eligibility and returns the discount for `subtotal`.
    pub fn evaluate(
        &self,
        subtotal: Money,
        ctx: RedemptionContext,
        now: DateTime<Utc>,
    ) -> Result<Money, CouponError> {
        if !self.is_active {
            return Err(CouponError::InvalidCode);
        }
        if self.expiry_date.is_some_and(|expiry| expiry < now) {
            return Err(CouponError::Expired);
        }
        if self.usage_limit.is_some_and(|limit| self.used_count >= limit) {
            return Err(CouponError::UsageExceeded);
        }
        if ctx.user_usage >= self.per_user_limit {
            return Err(CouponError::UsageExceeded);
        }
        if subtotal < self.min_order_amount {
            return Err(CouponError::MinOrderNotMet { min_order_amount: self.min_order_amount });
        }
        if self.for_new_users && !ctx.is_first_time {
            return Err(CouponError::AudienceMismatch("this coupon is for new customers only"));
        }
        if self.for_existing_users && ctx.is_first_time {
            return Err(CouponError::AudienceMismatch("this coupon is for returning customers only"));
        }
        Ok(self.discount_for(subtotal))
    }

    /// Discount amount for `subtotal`, ignoring eligibility.
    pub fn discount_for(&self, subtotal: Money) -> Money {
        let raw = match self.discount_type {
            DiscountType::Percentage => {
                let pct = subtotal.percent(self.discount_value);
                match self.max_discount {
                    Some(cap) => pct.min(cap),
                    None => pct,
                }
            }
            DiscountType::Fixed => Money::new(self.discount_value),
        };
        raw.min(subtotal).max(Money::ZERO)
    }

    pub fn has_capacity(&self) -> bool {
        self.usage_limit.map_or(true, |limit| self.used_count < limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("invalid coupon code")]
    InvalidCode,
    #[error("coupon has expired")]
    Expired,
    #[error("coupon usage limit reached")]
    UsageExceeded,
    #[error("minimum order amount of {min_order_amount} not met")]
    MinOrderNotMet { min_order_amount: Money },
    #[error("{0}")]
    AudienceMismatch(&'static str),
    #[error("invalid coupon: {0}")]
    InvalidDefinition(String),
}

impl CouponError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCode => "invalid_code",
            Self::Expired => "expired",
            Self::UsageExceeded => "usage_exceeded",
            Self::MinOrderNotMet { .. } => "min_order_not_met",
            Self::AudienceMismatch(_) => "audience_mismatch",
            Self::InvalidDefinition(_) => "invalid_coupon",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn save20() -> Coupon {
        Coupon::create(CouponDraft {
            code: CouponCode::new("SAVE20").unwrap(),
            description: None,
            discount_type: DiscountType::Percentage,
            discount_value: Decimal::from(20),
            min_order_amount: Money::from_major(500),
            max_discount: Some(Money::from_major(150)),
            usage_limit: None,
            per_user_limit: 1,
            expiry_date: None,
            is_active: true,
            for_new_users: false,
            for_existing_users: false,
        })
        .unwrap()
    }

    #[test]
    fn test_percentage_capped_by_max_discount() {
        let discount = save20().evaluate(Money::from_major(900), RedemptionContext::default(), Utc::now()).unwrap();
        assert_eq!(discount, Money::from_major(150));
        assert_eq!(Money::from_major(900) - discount, Money::from_major(750));
    }

    #[test]
    fn test_min_order_not_met() {
        let err = save20().evaluate(Money::from_major(300), RedemptionContext::default(), Utc::now()).unwrap_err();
        assert_eq!(err, CouponError::MinOrderNotMet { min_order_amount: Money::from_major(500) });
    }

    #[test]
    fn test_uncapped_percentage() {
        let mut c = save20();
        c.max_discount = None;
        assert_eq!(c.discount_for(Money::from_major(900)), Money::from_major(180));
    }

    #[test]
    fn test_fixed_never_exceeds_subtotal() {
        let mut c = save20();
        c.discount_type = DiscountType::Fixed;
        c.discount_value = Decimal::from(1000);
        c.min_order_amount = Money::ZERO;
        let discount = c.evaluate(Money::from_major(600), RedemptionContext::default(), Utc::now()).unwrap();
        assert_eq!(discount, Money::from_major(600));
    }

    #[test]
    fn test_inactive_and_expired() {
        let now = Utc::now();
        let mut c = save20();
        c.expiry_date = Some(now - Duration::days(1));
        assert_eq!(c.evaluate(Money::from_major(900), RedemptionContext::default(), now), Err(CouponError::Expired));
        c.is_active = false;
        assert_eq!(
            c.evaluate(Money::from_major(900), RedemptionContext::default(), now),
            Err(CouponError::InvalidCode)
        );
    }

    #[test]
    fn test_usage_limits() {
        let mut c = save20();
        c.usage_limit = Some(3);
        c.used_count = 3;
        assert_eq!(
            c.evaluate(Money::from_major(900), RedemptionContext::default(), Utc::now()),
            Err(CouponError::UsageExceeded)
        );

        c.used_count = 1;
        let ctx = RedemptionContext { user_usage: 1, is_first_time: false };
        assert_eq!(c.evaluate(Money::from_major(900), ctx, Utc::now()), Err(CouponError::UsageExceeded));
    }

    #[test]
    fn test_audience_targeting() {
        let mut c = save20();
        c.for_new_users = true;
        let returning = RedemptionContext { user_usage: 0, is_first_time: false };
        assert!(matches!(
            c.evaluate(Money::from_major(900), returning, Utc::now()),
            Err(CouponError::AudienceMismatch(_))
        ));
        let first = RedemptionContext { user_usage: 0, is_first_time: true };
        assert!(c.evaluate(Money::from_major(900), first, Utc::now()).is_ok());

        c.for_new_users = false;
        c.for_existing_users = true;
        assert!(matches!(c.evaluate(Money::from_major(900), first, Utc::now()), Err(CouponError::AudienceMismatch(_))));
    }

    #[test]
    fn test_definition_rules() {
        let mut draft = CouponDraft {
            code: CouponCode::new("BAD").unwrap(),
            description: None,
            discount_type: DiscountType::Percentage,
            discount_value: Decimal::from(120),
            min_order_amount: Money::ZERO,
            max_discount: None,
            usage_limit: None,
            per_user_limit: 1,
            expiry_date: None,
            is_active: true,
            for_new_users: false,
            for_existing_users: false,
        };
        assert!(matches!(Coupon::create(draft.clone()), Err(CouponError::InvalidDefinition(_))));
        draft.discount_value = Decimal::from(10);
        draft.for_new_users = true;
        draft.for_existing_users = true;
        assert!(matches!(Coupon::create(draft), Err(CouponError::InvalidDefinition(_))));
    }
}
