use std::sync::Arc;

use uuid::Uuid;

use crate::dto::webhook_dto::UpsertWebhookPayload;
use crate::error::{Error, Result};
use crate::models::delivery::{DeliveryRecord, DeliveryStatus};
use crate::models::webhook::Webhook;
use crate::services::delivery_service::{DeliveryOutcome, DeliveryService, OutboundRequest};
use crate::services::ledger_service::{clamp_limit, DeliveryLedger, DeliveryPage};
use crate::services::registry_service::WebhookRegistry;
use crate::utils::encoding;
use crate::utils::validation::normalize_webhook;

/// Operator-facing webhook management: registration, history, redelivery and ping.
#[derive(Clone)]
pub struct WebhookService {
    registry: Arc<dyn WebhookRegistry>,
    ledger: Arc<dyn DeliveryLedger>,
    delivery: DeliveryService,
}

impl WebhookService {
    pub fn new(
        registry: Arc<dyn WebhookRegistry>,
        ledger: Arc<dyn DeliveryLedger>,
        delivery: DeliveryService,
    ) -> Self {
        Self {
            registry,
            ledger,
            delivery,
        }
    }

    pub async fn list_webhooks(&self, organization_id: Uuid) -> Result<Vec<Webhook>> {
        self.registry.list(organization_id).await
    }

    pub async fn get_webhook(&self, organization_id: Uuid, webhook_id: Uuid) -> Result<Webhook> {
        self.registry.get(organization_id, webhook_id).await
    }

    pub async fn create_webhook(
        &self,
        organization_id: Uuid,
        payload: UpsertWebhookPayload,
    ) -> Result<Webhook> {
        let payload = normalize_webhook(payload)?;
        self.ensure_url_available(organization_id, &payload.payload_url, None)
            .await?;

        let webhook = self.registry.create(organization_id, payload).await?;
        tracing::info!(
            webhook_id = %webhook.id,
            organization_id = %organization_id,
            "Webhook registered"
        );
        Ok(webhook)
    }

    /// Full replacement. Takes effect for the next dispatch and redelivery.
    pub async fn update_webhook(
        &self,
        organization_id: Uuid,
        webhook_id: Uuid,
        payload: UpsertWebhookPayload,
    ) -> Result<Webhook> {
        let payload = normalize_webhook(payload)?;
        self.registry.get(organization_id, webhook_id).await?;
        self.ensure_url_available(organization_id, &payload.payload_url, Some(webhook_id))
            .await?;

        let webhook = self
            .registry
            .update(organization_id, webhook_id, payload)
            .await?;
        tracing::info!(
            webhook_id = %webhook.id,
            organization_id = %organization_id,
            disabled = webhook.disabled,
            "Webhook updated"
        );
        Ok(webhook)
    }

    pub async fn delete_webhook(&self, organization_id: Uuid, webhook_id: Uuid) -> Result<()> {
        self.registry.delete(organization_id, webhook_id).await?;
        tracing::info!(
            webhook_id = %webhook_id,
            organization_id = %organization_id,
            "Webhook deleted"
        );
        Ok(())
    }

    /// Status of the most recent recorded delivery, if any.
    pub async fn last_delivery_status(&self, webhook_id: Uuid) -> Result<Option<DeliveryStatus>> {
        self.ledger.latest_status(webhook_id).await
    }

    async fn ensure_url_available(
        &self,
        organization_id: Uuid,
        payload_url: &str,
        except: Option<Uuid>,
    ) -> Result<()> {
        match self
            .registry
            .get_by_payload_url(organization_id, payload_url)
            .await?
        {
            Some(existing) if Some(existing.id) != except => Err(Error::Conflict(format!(
                "A webhook for {} already exists",
                payload_url
            ))),
            _ => Ok(()),
        }
    }

    pub async fn list_deliveries(
        &self,
        organization_id: Uuid,
        webhook_id: Uuid,
        cursor: Option<String>,
        limit: Option<i64>,
    ) -> Result<DeliveryPage> {
        self.registry.get(organization_id, webhook_id).await?;
        self.ledger
            .list(webhook_id, cursor.filter(|c| !c.is_empty()), clamp_limit(limit))
            .await
    }

    pub async fn get_delivery(
        &self,
        organization_id: Uuid,
        webhook_id: Uuid,
        delivery_id: Uuid,
    ) -> Result<DeliveryRecord> {
        self.registry.get(organization_id, webhook_id).await?;
        self.ledger.get(webhook_id, delivery_id).await
    }

    /// Replay a recorded payload against the webhook's current configuration.
    ///
    /// Disabled webhooks are still redelivered to. The original record is left
    /// untouched and a new one is appended.
    pub async fn redeliver(
        &self,
        organization_id: Uuid,
        webhook_id: Uuid,
        delivery_id: Uuid,
    ) -> Result<DeliveryRecord> {
        let webhook = self.registry.get(organization_id, webhook_id).await?;
        let original = self.ledger.get(webhook_id, delivery_id).await?;
        if !original.has_request() {
            return Err(Error::BadRequest(format!(
                "Delivery {} was never sent and cannot be redelivered",
                delivery_id
            )));
        }

        let content_type = original
            .request_headers
            .get("Content-Type")
            .cloned()
            .unwrap_or_else(|| webhook.content_type.as_str().to_string());
        let new_id = Uuid::new_v4();

        let outcome = self
            .delivery
            .deliver(OutboundRequest {
                webhook: &webhook,
                delivery_id: new_id,
                event_id: original.event_id,
                event_name: original.webhook_event_type.as_str().to_string(),
                content_type,
                body: original.request_payload.clone(),
            })
            .await;

        let record = outcome.into_record(
            new_id,
            &webhook,
            original.event_id,
            original.user_id,
            original.webhook_event_type,
            Some(original.id),
        );
        self.ledger.append(&record).await?;

        tracing::info!(
            target: "webhook_delivery",
            webhook_id = %webhook_id,
            original_delivery_id = %delivery_id,
            delivery_id = %new_id,
            status = record.status.as_str(),
            "Delivery replayed"
        );
        Ok(record)
    }

    /// Connectivity probe. Nothing is written to the ledger.
    pub async fn ping(&self, organization_id: Uuid, webhook_id: Uuid) -> Result<DeliveryOutcome> {
        let webhook = self.registry.get(organization_id, webhook_id).await?;
        let document = encoding::ping_document(webhook.id, webhook.organization_id);

        let body = match encoding::encode(webhook.content_type, &document) {
            Ok(body) => body,
            Err(e) => return Ok(DeliveryOutcome::not_sent(format!("Serialization failed: {}", e))),
        };

        let outcome = self
            .delivery
            .deliver(OutboundRequest {
                webhook: &webhook,
                delivery_id: Uuid::new_v4(),
                event_id: Uuid::new_v4(),
                event_name: encoding::PING_EVENT.to_string(),
                content_type: webhook.content_type.as_str().to_string(),
                body,
            })
            .await;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeliveryConfig;
    use crate::models::event::EventType;
    use crate::models::webhook::ContentType;
    use crate::services::ledger_service::MockDeliveryLedger;
    use crate::services::registry_service::{webhook_not_found, MockWebhookRegistry};

    fn webhook(organization_id: Uuid, id: Uuid, payload_url: &str) -> Webhook {
        Webhook {
            id,
            organization_id,
            payload_url: payload_url.into(),
            content_type: ContentType::Json,
            subscribed_events: vec![EventType::EulaUpdated],
            disabled: false,
            secret_key: String::new(),
            skip_ssl_verification: false,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn payload(payload_url: &str, events: Vec<EventType>) -> UpsertWebhookPayload {
        UpsertWebhookPayload {
            payload_url: payload_url.into(),
            content_type: ContentType::Json,
            subscribed_events: events,
            disabled: false,
            secret_key: String::new(),
            skip_ssl_verification: false,
        }
    }

    fn service(registry: MockWebhookRegistry, ledger: MockDeliveryLedger) -> WebhookService {
        WebhookService::new(
            Arc::new(registry),
            Arc::new(ledger),
            DeliveryService::new(&DeliveryConfig::default()).unwrap(),
        )
    }

    #[tokio::test]
    async fn unknown_webhook_is_not_found_everywhere() {
        let mut registry = MockWebhookRegistry::new();
        registry
            .expect_get()
            .returning(|_, id| Err(webhook_not_found(id)));
        let mut ledger = MockDeliveryLedger::new();
        ledger.expect_append().never();
        ledger.expect_list().never();
        let svc = service(registry, ledger);

        let org = Uuid::new_v4();
        let hook = Uuid::new_v4();
        assert!(matches!(
            svc.list_deliveries(org, hook, None, None).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            svc.redeliver(org, hook, Uuid::new_v4()).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(svc.ping(org, hook).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn records_that_were_never_sent_cannot_be_redelivered() {
        let org = Uuid::new_v4();
        let hook = Uuid::new_v4();
        let mut registry = MockWebhookRegistry::new();
        registry
            .expect_get()
            .returning(|org, id| Ok(webhook(org, id, "http://127.0.0.1:9/hook")));
        let mut ledger = MockDeliveryLedger::new();
        ledger.expect_get().returning(move |_, id| {
            let mut target = webhook(org, hook, "http://127.0.0.1:9/hook");
            target.content_type = ContentType::FormUrlEncoded;
            Ok(DeliveryOutcome::not_sent("Serialization failed: top-level value must be an object")
                .into_record(id, &target, Uuid::new_v4(), None, EventType::EulaUpdated, None))
        });
        ledger.expect_append().never();

        let result = service(registry, ledger)
            .redeliver(org, hook, Uuid::new_v4())
            .await;
        assert!(matches!(result, Err(Error::BadRequest(_))));
    }

    #[tokio::test]
    async fn list_clamps_limit_and_drops_empty_cursor() {
        let mut registry = MockWebhookRegistry::new();
        registry.expect_get().returning(|org, id| {
            Ok(webhook(org, id, "https://example.org/hook"))
        });
        let mut ledger = MockDeliveryLedger::new();
        ledger
            .expect_list()
            .withf(|_, cursor, limit| cursor.is_none() && *limit == 100)
            .times(1)
            .returning(|_, _, _| {
                Ok(DeliveryPage {
                    records: Vec::new(),
                    next_cursor: None,
                })
            });

        let page = service(registry, ledger)
            .list_deliveries(Uuid::new_v4(), Uuid::new_v4(), Some(String::new()), Some(1000))
            .await
            .unwrap();
        assert!(page.records.is_empty());
    }

    #[tokio::test]
    async fn create_rejects_a_duplicate_payload_url() {
        let mut registry = MockWebhookRegistry::new();
        registry
            .expect_get_by_payload_url()
            .returning(|org, url| Ok(Some(webhook(org, Uuid::new_v4(), url))));
        registry.expect_create().never();

        let result = service(registry, MockDeliveryLedger::new())
            .create_webhook(
                Uuid::new_v4(),
                payload("https://example.org/hook", vec![EventType::ConsentAllowed]),
            )
            .await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn update_may_keep_its_own_payload_url() {
        let hook = Uuid::new_v4();
        let mut registry = MockWebhookRegistry::new();
        registry
            .expect_get()
            .returning(|org, id| Ok(webhook(org, id, "https://example.org/hook")));
        registry
            .expect_get_by_payload_url()
            .returning(move |org, url| Ok(Some(webhook(org, hook, url))));
        registry
            .expect_update()
            .times(1)
            .withf(|_, _, p| p.subscribed_events == vec![EventType::ConsentAllowed])
            .returning(|org, id, p| Ok(webhook(org, id, &p.payload_url)));

        let updated = service(registry, MockDeliveryLedger::new())
            .update_webhook(
                Uuid::new_v4(),
                hook,
                payload(
                    "https://example.org/hook",
                    vec![EventType::ConsentAllowed, EventType::ConsentAllowed],
                ),
            )
            .await
            .unwrap();
        assert_eq!(updated.id, hook);
    }

    #[tokio::test]
    async fn create_rejects_non_http_urls_before_touching_storage() {
        let mut registry = MockWebhookRegistry::new();
        registry.expect_get_by_payload_url().never();
        registry.expect_create().never();

        let result = service(registry, MockDeliveryLedger::new())
            .create_webhook(
                Uuid::new_v4(),
                payload("ftp://example.org/hook", vec![EventType::ConsentAllowed]),
            )
            .await;
        assert!(matches!(result, Err(Error::BadRequest(_))));
    }
}
