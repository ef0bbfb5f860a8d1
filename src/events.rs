//! Domain event publishing over NATS.

use crate::domain::events::DomainEvent;

const SUBJECT_PREFIX: &str = "ecommerce";

/// Publishes domain events to NATS on `ecommerce.<subject>`. Without a
/// client, events are only logged.
#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self {
        Self { nats }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    /// Best effort: a failed publish is logged and never fails the caller,
    /// since the state change it describes has already been committed.
    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            self.publish(&event).await;
        }
    }

    pub async fn publish(&self, event: &DomainEvent) {
        let subject = format!("{SUBJECT_PREFIX}.{}", event.subject());
        let Some(client) = &self.nats else {
            tracing::debug!(%subject, ?event, "event (no bus configured)");
            return;
        };
        let payload = match serde_json::to_vec(event) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(%subject, error = %e, "failed to encode event");
                return;
            }
        };
        if let Err(e) = client.publish(subject.clone(), payload.into()).await {
            tracing::warn!(%subject, error = %e, "failed to publish event");
        }
    }
}
