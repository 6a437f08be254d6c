use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::models::delivery::{DeliveryRecord, DeliveryStatus};
use crate::models::event::EventType;
use crate::models::webhook::{ContentType, Webhook};
use crate::services::delivery_service::DeliveryOutcome;

/// Full replacement body for creating or updating a webhook.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpsertWebhookPayload {
    #[validate(url, length(max = 2048))]
    pub payload_url: String,
    pub content_type: ContentType,
    #[validate(length(min = 1))]
    pub subscribed_events: Vec<EventType>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    #[validate(length(max = 256))]
    pub secret_key: String,
    #[serde(default)]
    pub skip_ssl_verification: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub payload_url: String,
    pub content_type: ContentType,
    pub subscribed_events: Vec<EventType>,
    pub disabled: bool,
    pub has_secret_key: bool,
    pub skip_ssl_verification: bool,
    pub last_delivery_status: Option<DeliveryStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookResponse {
    pub fn with_last_delivery_status(mut self, status: Option<DeliveryStatus>) -> Self {
        self.last_delivery_status = status;
        self
    }
}

impl From<Webhook> for WebhookResponse {
    fn from(w: Webhook) -> Self {
        Self {
            has_secret_key: w.is_signed(),
            id: w.id,
            organization_id: w.organization_id,
            payload_url: w.payload_url,
            content_type: w.content_type,
            subscribed_events: w.subscribed_events,
            disabled: w.disabled,
            skip_ssl_verification: w.skip_ssl_verification,
            last_delivery_status: None,
            created_at: w.created_at,
            updated_at: w.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookListResponse {
    pub items: Vec<WebhookResponse>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeliveryListQuery {
    /// Opaque token from a previous page's `nextCursor`.
    pub cursor: Option<String>,
    /// Page size, clamped to 1..=100. Defaults to 20.
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySummary {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub webhook_event_type: EventType,
    pub status: DeliveryStatus,
    pub status_description: String,
    pub response_status_code: i32,
    pub execution_start_timestamp: DateTime<Utc>,
    pub execution_end_timestamp: DateTime<Utc>,
    pub redelivered_from: Option<Uuid>,
}

impl From<DeliveryRecord> for DeliverySummary {
    fn from(r: DeliveryRecord) -> Self {
        Self {
            id: r.id,
            webhook_id: r.webhook_id,
            webhook_event_type: r.webhook_event_type,
            status: r.status,
            status_description: r.status_description,
            response_status_code: r.response_status_code,
            execution_start_timestamp: r.execution_start_timestamp,
            execution_end_timestamp: r.execution_end_timestamp,
            redelivered_from: r.redelivered_from,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryListResponse {
    pub items: Vec<DeliverySummary>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub response_status_code: i32,
    pub response_status_string: String,
    pub execution_start_timestamp: DateTime<Utc>,
    pub execution_end_timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub status_description: String,
}

impl From<DeliveryOutcome> for PingResponse {
    fn from(o: DeliveryOutcome) -> Self {
        Self {
            response_status_code: o.response_status_code,
            response_status_string: o.response_status_string,
            execution_start_timestamp: o.started_at,
            execution_end_timestamp: o.finished_at,
            status: o.status,
            status_description: o.status_description,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventTypesResponse {
    pub event_types: Vec<EventType>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContentTypesResponse {
    pub content_types: Vec<ContentType>,
}
