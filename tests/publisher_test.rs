mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wiremock::matchers::{header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{webhook, Harness};
use consent_webhooks::{
    dto::event_dto::{ConsentChange, ConsentDisallowed, DataBreachDisclosed},
    error::{Error, Result},
    models::event::{EventEnvelope, EventType},
    services::{publisher_service::EventPublisher, queue_service::EventQueue},
};

struct BrokenQueue;

#[async_trait]
impl EventQueue for BrokenQueue {
    async fn publish(&self, _: &EventEnvelope) -> Result<()> {
        Err(Error::Internal("queue unavailable".into()))
    }
    async fn claim(&self, _: i64) -> Result<Vec<EventEnvelope>> {
        Ok(Vec::new())
    }
    async fn ack(&self, _: Uuid) -> Result<()> {
        Ok(())
    }
}

fn consent_change() -> ConsentChange {
    ConsentChange {
        data_agreement_id: "da-42".into(),
        purpose_id: "analytics".into(),
        attribute_ids: vec!["email".into(), "phone".into()],
        individual_id: Uuid::new_v4(),
        consented_at: Utc::now(),
    }
}

#[tokio::test]
async fn published_events_reach_subscribers_through_the_queue() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("X-Consent-Event", "consent.disallowed"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let h = Harness::new();
    let org = Uuid::new_v4();
    let user = Uuid::new_v4();
    let hook = webhook(org, &server.uri(), &[EventType::ConsentDisallowed], "");
    h.registry.insert(hook.clone());

    let publisher = EventPublisher::new(h.queue.clone());
    publisher.publish(org, Some(user), &ConsentDisallowed(consent_change()));
    h.queue.wait_for_pending(1).await;

    assert!(h
        .dispatcher()
        .run_once(&CancellationToken::new())
        .await
        .unwrap());

    let record = &h.ledger.for_webhook(hook.id)[0];
    assert_eq!(record.webhook_event_type, EventType::ConsentDisallowed);
    assert_eq!(record.user_id, Some(user));
    let sent: JsonValue = serde_json::from_str(&record.request_payload).unwrap();
    assert_eq!(sent["type"], "consent.disallowed");
    assert_eq!(sent["userId"], user.to_string());
    assert_eq!(sent["data"]["dataAgreementId"], "da-42");
    assert_eq!(sent["data"]["attributeIds"][1], "phone");
    assert_eq!(h.queue.acked().len(), 1);
}

#[tokio::test]
async fn publish_now_returns_the_queued_envelope() {
    let h = Harness::new();
    let publisher = EventPublisher::new(h.queue.clone());
    let org = Uuid::new_v4();

    let envelope = publisher
        .publish_now(
            org,
            None,
            &DataBreachDisclosed {
                headline: "Backup exposed".into(),
                description: "An unencrypted backup was reachable".into(),
                affected_users: Some(120),
                occurred_at: Utc::now(),
                dpo_contact: Some("dpo@example.org".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(envelope.event_type, EventType::DataBreachDisclosed);
    assert_eq!(envelope.organization_id, org);
    assert_eq!(envelope.payload["affectedUsers"], 120);
    assert_eq!(h.queue.pending_len(), 1);
}

#[tokio::test]
async fn queue_failures_never_reach_the_caller() {
    let publisher = EventPublisher::new(Arc::new(BrokenQueue));
    publisher.publish(Uuid::new_v4(), None, &ConsentDisallowed(consent_change()));
    tokio::task::yield_now().await;

    let result = publisher
        .publish_now(Uuid::new_v4(), None, &ConsentDisallowed(consent_change()))
        .await;
    assert!(matches!(result, Err(Error::Internal(_))));
}
