use std::sync::Arc;

use uuid::Uuid;

use crate::dto::event_dto::EventPayload;
use crate::error::Result;
use crate::models::event::{EventEnvelope, EventType};
use crate::services::queue_service::EventQueue;

/// Entry point for business code that wants subscribers notified.
///
/// `publish` never fails from the caller's point of view: the business change
/// has already been committed, so queue errors are logged and dropped.
#[derive(Clone)]
pub struct EventPublisher {
    queue: Arc<dyn EventQueue>,
}

impl EventPublisher {
    pub fn new(queue: Arc<dyn EventQueue>) -> Self {
        Self { queue }
    }

    pub fn publish<P: EventPayload>(&self, organization_id: Uuid, user_id: Option<Uuid>, payload: &P) {
        self.publish_raw(P::EVENT_TYPE, organization_id, user_id, payload);
    }

    fn publish_raw<P: serde::Serialize + ?Sized>(
        &self,
        event_type: EventType,
        organization_id: Uuid,
        user_id: Option<Uuid>,
        payload: &P,
    ) {
        let payload = match serde_json::to_value(payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    event_type = %event_type,
                    organization_id = %organization_id,
                    error = %e,
                    "Failed to serialize event payload"
                );
                return;
            }
        };
        let envelope = EventEnvelope::new(event_type, organization_id, user_id, payload);

        let queue = self.queue.clone();
        tokio::spawn(async move {
            if let Err(e) = queue.publish(&envelope).await {
                tracing::error!(
                    target: "webhook_delivery",
                    event_id = %envelope.id,
                    event_type = %envelope.event_type,
                    organization_id = %envelope.organization_id,
                    error = %e,
                    "Failed to publish event"
                );
            } else {
                tracing::debug!(
                    target: "webhook_delivery",
                    event_id = %envelope.id,
                    event_type = %envelope.event_type,
                    "Event published"
                );
            }
        });
    }

    /// Awaited variant that surfaces queue errors.
    pub async fn publish_now<P: EventPayload>(
        &self,
        organization_id: Uuid,
        user_id: Option<Uuid>,
        payload: &P,
    ) -> Result<EventEnvelope> {
        let envelope = EventEnvelope::new(
            P::EVENT_TYPE,
            organization_id,
            user_id,
            serde_json::to_value(payload)?,
        );
        self.queue.publish(&envelope).await?;
        Ok(envelope)
    }
}
