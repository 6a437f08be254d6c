#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use uuid::Uuid;

use consent_webhooks::{
    config::{DeliveryConfig, DispatcherConfig},
    dto::webhook_dto::UpsertWebhookPayload,
    error::{Error, Result},
    models::{
        delivery::{DeliveryRecord, DeliveryStatus},
        event::{EventEnvelope, EventType},
        webhook::{ContentType, Webhook},
    },
    services::{
        delivery_service::DeliveryService,
        dispatcher_service::Dispatcher,
        ledger_service::{decode_cursor, delivery_not_found, encode_cursor, DeliveryLedger, DeliveryPage},
        queue_service::EventQueue,
        registry_service::{webhook_not_found, WebhookRegistry},
    },
    AppState,
};

pub const JWT_SECRET: &str = "test_secret_key";

#[derive(Default)]
pub struct InMemoryRegistry {
    webhooks: Mutex<Vec<Webhook>>,
}

impl InMemoryRegistry {
    pub fn insert(&self, webhook: Webhook) {
        self.webhooks.lock().unwrap().push(webhook);
    }

    pub fn set_disabled(&self, webhook_id: Uuid, disabled: bool) {
        let mut webhooks = self.webhooks.lock().unwrap();
        if let Some(w) = webhooks.iter_mut().find(|w| w.id == webhook_id) {
            w.disabled = disabled;
        }
    }

    pub fn set_payload_url(&self, webhook_id: Uuid, payload_url: &str) {
        let mut webhooks = self.webhooks.lock().unwrap();
        if let Some(w) = webhooks.iter_mut().find(|w| w.id == webhook_id) {
            w.payload_url = payload_url.to_string();
        }
    }
}

#[async_trait]
impl WebhookRegistry for InMemoryRegistry {
    async fn active_subscribers_for(
        &self,
        organization_id: Uuid,
        event_type: EventType,
    ) -> Result<Vec<Webhook>> {
        Ok(self
            .webhooks
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.organization_id == organization_id && !w.disabled)
            .filter(|w| w.is_subscribed_to(event_type))
            .cloned()
            .collect())
    }

    async fn get(&self, organization_id: Uuid, webhook_id: Uuid) -> Result<Webhook> {
        self.webhooks
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.organization_id == organization_id && w.id == webhook_id)
            .cloned()
            .ok_or_else(|| webhook_not_found(webhook_id))
    }

    async fn get_by_payload_url(
        &self,
        organization_id: Uuid,
        payload_url: &str,
    ) -> Result<Option<Webhook>> {
        Ok(self
            .webhooks
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.organization_id == organization_id && w.payload_url == payload_url)
            .cloned())
    }

    async fn list(&self, organization_id: Uuid) -> Result<Vec<Webhook>> {
        Ok(self
            .webhooks
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|w| w.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        organization_id: Uuid,
        payload: UpsertWebhookPayload,
    ) -> Result<Webhook> {
        let now = Utc::now();
        let webhook = Webhook {
            id: Uuid::new_v4(),
            organization_id,
            payload_url: payload.payload_url,
            content_type: payload.content_type,
            subscribed_events: payload.subscribed_events,
            disabled: payload.disabled,
            secret_key: payload.secret_key,
            skip_ssl_verification: payload.skip_ssl_verification,
            created_at: now,
            updated_at: now,
        };
        self.insert(webhook.clone());
        Ok(webhook)
    }

    async fn update(
        &self,
        organization_id: Uuid,
        webhook_id: Uuid,
        payload: UpsertWebhookPayload,
    ) -> Result<Webhook> {
        let mut webhooks = self.webhooks.lock().unwrap();
        let webhook = webhooks
            .iter_mut()
            .find(|w| w.organization_id == organization_id && w.id == webhook_id)
            .ok_or_else(|| webhook_not_found(webhook_id))?;
        webhook.payload_url = payload.payload_url;
        webhook.content_type = payload.content_type;
        webhook.subscribed_events = payload.subscribed_events;
        webhook.disabled = payload.disabled;
        webhook.secret_key = payload.secret_key;
        webhook.skip_ssl_verification = payload.skip_ssl_verification;
        webhook.updated_at = Utc::now();
        Ok(webhook.clone())
    }

    async fn delete(&self, organization_id: Uuid, webhook_id: Uuid) -> Result<()> {
        let mut webhooks = self.webhooks.lock().unwrap();
        let before = webhooks.len();
        webhooks.retain(|w| !(w.organization_id == organization_id && w.id == webhook_id));
        if webhooks.len() == before {
            return Err(webhook_not_found(webhook_id));
        }
        Ok(())
    }
}

/// Records in insertion order; the index doubles as the cursor sequence.
#[derive(Default)]
pub struct InMemoryLedger {
    records: Mutex<Vec<DeliveryRecord>>,
}

impl InMemoryLedger {
    pub fn all(&self) -> Vec<DeliveryRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn for_webhook(&self, webhook_id: Uuid) -> Vec<DeliveryRecord> {
        self.all()
            .into_iter()
            .filter(|r| r.webhook_id == webhook_id)
            .collect()
    }
}

#[async_trait]
impl DeliveryLedger for InMemoryLedger {
    async fn append(&self, record: &DeliveryRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        if records.iter().any(|r| r.id == record.id) {
            return Err(Error::Conflict(format!("Delivery {} already recorded", record.id)));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn list(
        &self,
        webhook_id: Uuid,
        cursor: Option<String>,
        limit: i64,
    ) -> Result<DeliveryPage> {
        let before = cursor.as_deref().map(decode_cursor).transpose()?;
        let records = self.records.lock().unwrap();
        let mut matching: Vec<(i64, DeliveryRecord)> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (i as i64 + 1, r))
            .filter(|(seq, r)| r.webhook_id == webhook_id && before.map_or(true, |b| *seq < b))
            .map(|(seq, r)| (seq, r.clone()))
            .collect();
        matching.reverse();

        let has_more = matching.len() as i64 > limit;
        matching.truncate(limit as usize);
        let next_cursor = if has_more {
            matching.last().map(|(seq, _)| encode_cursor(*seq))
        } else {
            None
        };
        Ok(DeliveryPage {
            records: matching.into_iter().map(|(_, r)| r).collect(),
            next_cursor,
        })
    }

    async fn get(&self, webhook_id: Uuid, delivery_id: Uuid) -> Result<DeliveryRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.webhook_id == webhook_id && r.id == delivery_id)
            .cloned()
            .ok_or_else(|| delivery_not_found(delivery_id))
    }

    async fn latest_status(&self, webhook_id: Uuid) -> Result<Option<DeliveryStatus>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.webhook_id == webhook_id)
            .map(|r| r.status))
    }
}

#[derive(Default)]
pub struct InMemoryQueue {
    pending: Mutex<VecDeque<EventEnvelope>>,
    claimed: Mutex<Vec<EventEnvelope>>,
    acked: Mutex<Vec<Uuid>>,
}

impl InMemoryQueue {
    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Claimed but not yet acked.
    pub fn claimed_ids(&self) -> Vec<Uuid> {
        self.claimed.lock().unwrap().iter().map(|e| e.id).collect()
    }

    pub fn acked(&self) -> Vec<Uuid> {
        self.acked.lock().unwrap().clone()
    }

    /// Wait for spawned publishes to land.
    pub async fn wait_for_pending(&self, count: usize) {
        for _ in 0..200 {
            if self.pending_len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} pending events, found {}", count, self.pending_len());
    }
}

#[async_trait]
impl EventQueue for InMemoryQueue {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<()> {
        self.pending.lock().unwrap().push_back(envelope.clone());
        Ok(())
    }

    async fn claim(&self, max: i64) -> Result<Vec<EventEnvelope>> {
        let mut pending = self.pending.lock().unwrap();
        let take = (max.max(0) as usize).min(pending.len());
        let batch: Vec<EventEnvelope> = pending.drain(..take).collect();
        self.claimed.lock().unwrap().extend(batch.iter().cloned());
        Ok(batch)
    }

    async fn ack(&self, event_id: Uuid) -> Result<()> {
        self.claimed.lock().unwrap().retain(|e| e.id != event_id);
        self.acked.lock().unwrap().push(event_id);
        Ok(())
    }
}

pub struct Harness {
    pub registry: Arc<InMemoryRegistry>,
    pub ledger: Arc<InMemoryLedger>,
    pub queue: Arc<InMemoryQueue>,
    pub delivery: DeliveryConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(5))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            registry: Arc::new(InMemoryRegistry::default()),
            ledger: Arc::new(InMemoryLedger::default()),
            queue: Arc::new(InMemoryQueue::default()),
            delivery: DeliveryConfig {
                timeout,
                ..DeliveryConfig::default()
            },
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.queue.clone(),
            self.registry.clone(),
            self.ledger.clone(),
            DeliveryService::new(&self.delivery).expect("delivery service"),
            DispatcherConfig {
                workers: 4,
                batch_size: 10,
                poll_interval: Duration::from_millis(10),
            },
        )
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.registry.clone(),
            self.ledger.clone(),
            self.queue.clone(),
            &self.delivery,
        )
        .expect("app state")
    }

    pub fn app(&self) -> axum::Router {
        consent_webhooks::router(self.app_state(), JWT_SECRET, 1000)
    }
}

pub fn webhook(
    organization_id: Uuid,
    payload_url: &str,
    events: &[EventType],
    secret_key: &str,
) -> Webhook {
    let now = Utc::now();
    Webhook {
        id: Uuid::new_v4(),
        organization_id,
        payload_url: payload_url.to_string(),
        content_type: ContentType::Json,
        subscribed_events: events.to_vec(),
        disabled: false,
        secret_key: secret_key.to_string(),
        skip_ssl_verification: false,
        created_at: now,
        updated_at: now,
    }
}

pub fn token_for(organization_id: Uuid) -> String {
    let exp = (Utc::now() + chrono::Duration::hours(1)).timestamp() as usize;
    encode(
        &Header::default(),
        &json!({
            "sub": "operator@example.com",
            "exp": exp,
            "org": organization_id,
            "role": "admin",
        }),
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("token")
}
