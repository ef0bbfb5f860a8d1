//! Return Request Aggregate
//!
//! A return is its own record pointing at an order; filing one never
//! changes the order's status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::order::{Order, OrderError};
use crate::domain::events::{DomainEvent, ReturnEvent};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    #[default]
    Requested,
    Approved,
    Rejected,
}

impl ReturnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ReturnStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(Self::Requested),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown return status '{other}'")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRequest {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub reason: String,
    pub photo_urls: Vec<String>,
    pub video_url: Option<String>,
    pub status: ReturnStatus,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl ReturnRequest {
    /// Files a return against `order` if it is still eligible at `now`.
    pub fn file(
        order: &Order,
        reason: &str,
        photo_urls: Vec<String>,
        video_url: Option<String>,
        window_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, ReturnError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ReturnError::Order(OrderError::ReasonRequired));
        }
        order.ensure_returnable(now, window_days)?;
        let id = Uuid::now_v7();
        Ok(Self {
            id,
            order_id: order.id,
            user_id: order.user_id,
            reason: reason.to_string(),
            photo_urls,
            video_url,
            status: ReturnStatus::Requested,
            admin_notes: None,
            created_at: now,
            updated_at: now,
            events: vec![DomainEvent::Return(ReturnEvent::Requested { return_id: id, order_id: order.id })],
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid,
        order_id: Uuid,
        user_id: Uuid,
        reason: String,
        photo_urls: Vec<String>,
        video_url: Option<String>,
        status: ReturnStatus,
        admin_notes: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_id,
            user_id,
            reason,
            photo_urls,
            video_url,
            status,
            admin_notes,
            created_at,
            updated_at,
            events: vec![],
        }
    }

    pub fn approve(&mut self, notes: Option<String>, now: DateTime<Utc>) -> Result<(), ReturnError> {
        self.decide(ReturnStatus::Approved, notes.filter(|n| !n.trim().is_empty()), now)
    }

    /// Rejection must say why.
    pub fn reject(&mut self, notes: &str, now: DateTime<Utc>) -> Result<(), ReturnError> {
        let notes = notes.trim();
        if notes.is_empty() {
            return Err(ReturnError::NotesRequired);
        }
        self.decide(ReturnStatus::Rejected, Some(notes.to_string()), now)
    }

    fn decide(&mut self, status: ReturnStatus, notes: Option<String>, now: DateTime<Utc>) -> Result<(), ReturnError> {
        if self.status != ReturnStatus::Requested {
            return Err(ReturnError::AlreadyDecided(self.status));
        }
        self.status = status;
        self.admin_notes = notes;
        self.updated_at = now;
        self.events.push(DomainEvent::Return(ReturnEvent::Decided {
            return_id: self.id,
            order_id: self.order_id,
            status,
        }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReturnError {
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error("a return has already been requested for this order")]
    AlreadyRequested,
    #[error("return request is already {}", .0.as_str())]
    AlreadyDecided(ReturnStatus),
    #[error("admin notes are required when rejecting a return")]
    NotesRequired,
}

impl ReturnError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Order(e) => e.code(),
            Self::AlreadyRequested => "return_already_requested",
            Self::AlreadyDecided(_) => "return_already_decided",
            Self::NotesRequired => "notes_required",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::{OrderStatus, ShippingAddress};
    use chrono::Duration;

    fn delivered_order(days_ago: i64) -> Order {
        let now = Utc::now();
        Order::restore(
            Uuid::new_v4(),
            "ORD-00000001".into(),
            Uuid::new_v4(),
            vec![],
            None,
            ShippingAddress::default(),
            OrderStatus::Delivered,
            None,
            now - Duration::days(days_ago + 3),
            Some(now - Duration::days(days_ago)),
            now,
        )
    }

    #[test]
    fn test_file_within_window() {
        let order = delivered_order(10);
        let photos = vec!["https://cdn/p1.jpg".into()];
        let mut r = ReturnRequest::file(&order, "strap broke", photos, None, 30, Utc::now()).unwrap();
        assert_eq!(r.status, ReturnStatus::Requested);
        assert_eq!(r.order_id, order.id);
        assert_eq!(r.take_events().len(), 1);
    }

    #[test]
    fn test_file_after_window() {
        let order = delivered_order(31);
        let err = ReturnRequest::file(&order, "late", vec![], None, 30, Utc::now()).unwrap_err();
        assert_eq!(err, ReturnError::Order(OrderError::ReturnWindowClosed { days: 30 }));
    }

    #[test]
    fn test_reason_required() {
        let order = delivered_order(1);
        assert_eq!(
            ReturnRequest::file(&order, " ", vec![], None, 30, Utc::now()).unwrap_err(),
            ReturnError::Order(OrderError::ReasonRequired)
        );
    }

    #[test]
    fn test_decisions_are_final() {
        let order = delivered_order(1);
        let mut r = ReturnRequest::file(&order, "wrong colour", vec![], None, 30, Utc::now()).unwrap();
        assert_eq!(r.reject("", Utc::now()), Err(ReturnError::NotesRequired));
        r.reject("item shows wear", Utc::now()).unwrap();
        assert_eq!(r.status, ReturnStatus::Rejected);
        assert_eq!(r.approve(None, Utc::now()), Err(ReturnError::AlreadyDecided(ReturnStatus::Rejected)));
    }
}
