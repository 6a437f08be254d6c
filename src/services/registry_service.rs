use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::dto::webhook_dto::UpsertWebhookPayload;
use crate::error::{Error, Result};
use crate::models::event::EventType;
use crate::models::webhook::{Webhook, WebhookRow};

/// Storage for webhook registrations, always scoped to one organization.
///
/// Implementations store what they are given; payload normalization and the
/// duplicate-URL check happen in `WebhookService` before these are called.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebhookRegistry: Send + Sync {
    /// Enabled webhooks of `organization_id` subscribed to `event_type`.
    async fn active_subscribers_for(
        &self,
        organization_id: Uuid,
        event_type: EventType,
    ) -> Result<Vec<Webhook>>;

    async fn get(&self, organization_id: Uuid, webhook_id: Uuid) -> Result<Webhook>;

    async fn get_by_payload_url(
        &self,
        organization_id: Uuid,
        payload_url: &str,
    ) -> Result<Option<Webhook>>;

    async fn list(&self, organization_id: Uuid) -> Result<Vec<Webhook>>;

    async fn create(
        &self,
        organization_id: Uuid,
        payload: UpsertWebhookPayload,
    ) -> Result<Webhook>;

    async fn update(
        &self,
        organization_id: Uuid,
        webhook_id: Uuid,
        payload: UpsertWebhookPayload,
    ) -> Result<Webhook>;

    async fn delete(&self, organization_id: Uuid, webhook_id: Uuid) -> Result<()>;
}

const WEBHOOK_COLUMNS: &str = r#"id, organization_id, payload_url, content_type, subscribed_events,
    disabled, secret_key, skip_ssl_verification, created_at, updated_at"#;

#[derive(Clone)]
pub struct PgWebhookRegistry {
    pool: PgPool,
}

impl PgWebhookRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookRegistry for PgWebhookRegistry {
    async fn active_subscribers_for(
        &self,
        organization_id: Uuid,
        event_type: EventType,
    ) -> Result<Vec<Webhook>> {
        let rows = sqlx::query_as::<_, WebhookRow>(&format!(
            r#"SELECT {} FROM webhooks
               WHERE organization_id = $1 AND disabled = FALSE AND $2 = ANY(subscribed_events)"#,
            WEBHOOK_COLUMNS
        ))
        .bind(organization_id)
        .bind(event_type.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Webhook::try_from).collect()
    }

    async fn get(&self, organization_id: Uuid, webhook_id: Uuid) -> Result<Webhook> {
        let row = sqlx::query_as::<_, WebhookRow>(&format!(
            "SELECT {} FROM webhooks WHERE organization_id = $1 AND id = $2",
            WEBHOOK_COLUMNS
        ))
        .bind(organization_id)
        .bind(webhook_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| webhook_not_found(webhook_id))?;
        Webhook::try_from(row)
    }

    async fn get_by_payload_url(
        &self,
        organization_id: Uuid,
        payload_url: &str,
    ) -> Result<Option<Webhook>> {
        let row = sqlx::query_as::<_, WebhookRow>(&format!(
            "SELECT {} FROM webhooks WHERE organization_id = $1 AND payload_url = $2",
            WEBHOOK_COLUMNS
        ))
        .bind(organization_id)
        .bind(payload_url)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Webhook::try_from).transpose()
    }

    async fn list(&self, organization_id: Uuid) -> Result<Vec<Webhook>> {
        let rows = sqlx::query_as::<_, WebhookRow>(&format!(
            "SELECT {} FROM webhooks WHERE organization_id = $1 ORDER BY created_at DESC",
            WEBHOOK_COLUMNS
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Webhook::try_from).collect()
    }

    async fn create(
        &self,
        organization_id: Uuid,
        payload: UpsertWebhookPayload,
    ) -> Result<Webhook> {
        let row = sqlx::query_as::<_, WebhookRow>(&format!(
            r#"INSERT INTO webhooks (id, organization_id, payload_url, content_type, subscribed_events,
                   disabled, secret_key, skip_ssl_verification)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING {}"#,
            WEBHOOK_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(organization_id)
        .bind(&payload.payload_url)
        .bind(payload.content_type.as_str())
        .bind(event_names(&payload.subscribed_events))
        .bind(payload.disabled)
        .bind(&payload.secret_key)
        .bind(payload.skip_ssl_verification)
        .fetch_one(&self.pool)
        .await?;
        Webhook::try_from(row)
    }

    async fn update(
        &self,
        organization_id: Uuid,
        webhook_id: Uuid,
        payload: UpsertWebhookPayload,
    ) -> Result<Webhook> {
        let row = sqlx::query_as::<_, WebhookRow>(&format!(
            r#"UPDATE webhooks
               SET payload_url = $3, content_type = $4, subscribed_events = $5, disabled = $6,
                   secret_key = $7, skip_ssl_verification = $8, updated_at = NOW()
               WHERE organization_id = $1 AND id = $2
               RETURNING {}"#,
            WEBHOOK_COLUMNS
        ))
        .bind(organization_id)
        .bind(webhook_id)
        .bind(&payload.payload_url)
        .bind(payload.content_type.as_str())
        .bind(event_names(&payload.subscribed_events))
        .bind(payload.disabled)
        .bind(&payload.secret_key)
        .bind(payload.skip_ssl_verification)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| webhook_not_found(webhook_id))?;
        Webhook::try_from(row)
    }

    async fn delete(&self, organization_id: Uuid, webhook_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM webhooks WHERE organization_id = $1 AND id = $2")
            .bind(organization_id)
            .bind(webhook_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(webhook_not_found(webhook_id));
        }
        Ok(())
    }
}

pub fn webhook_not_found(webhook_id: Uuid) -> Error {
    Error::NotFound(format!("Webhook {} not found", webhook_id))
}

fn event_names(events: &[EventType]) -> Vec<String> {
    events.iter().map(|e| e.as_str().to_string()).collect()
}
