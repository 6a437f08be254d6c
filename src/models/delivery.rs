use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::event::EventType;

pub type Headers = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Completed,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Completed => "completed",
            DeliveryStatus::Failed => "failed",
        }
    }
}

/// One attempt to deliver one event to one webhook. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub organization_id: Uuid,
    pub event_id: Uuid,
    pub user_id: Option<Uuid>,
    pub webhook_event_type: EventType,
    pub request_headers: Headers,
    pub request_payload: String,
    pub response_headers: Headers,
    pub response_body: String,
    pub response_status_code: i32,
    pub response_status_string: String,
    pub execution_start_timestamp: DateTime<Utc>,
    pub execution_end_timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub status_description: String,
    pub redelivered_from: Option<Uuid>,
}

impl DeliveryRecord {
    /// Whether a request body was produced for this attempt. Attempts that
    /// failed before encoding carry no headers and nothing to replay.
    pub fn has_request(&self) -> bool {
        !self.request_headers.is_empty()
    }
}

#[derive(Debug, FromRow)]
pub struct DeliveryRow {
    pub seq: i64,
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub organization_id: Uuid,
    pub event_id: Uuid,
    pub user_id: Option<Uuid>,
    pub webhook_event_type: String,
    pub request_headers: Json<Headers>,
    pub request_payload: String,
    pub response_headers: Json<Headers>,
    pub response_body: String,
    pub response_status_code: i32,
    pub response_status_string: String,
    pub execution_start_timestamp: DateTime<Utc>,
    pub execution_end_timestamp: DateTime<Utc>,
    pub status: String,
    pub status_description: String,
    pub redelivered_from: Option<Uuid>,
}

impl TryFrom<DeliveryRow> for DeliveryRecord {
    type Error = Error;

    fn try_from(row: DeliveryRow) -> Result<Self> {
        let status = match row.status.as_str() {
            "completed" => DeliveryStatus::Completed,
            "failed" => DeliveryStatus::Failed,
            other => {
                return Err(Error::Internal(format!(
                    "delivery {} has unknown status {}",
                    row.id, other
                )))
            }
        };

        Ok(Self {
            id: row.id,
            webhook_id: row.webhook_id,
            organization_id: row.organization_id,
            event_id: row.event_id,
            user_id: row.user_id,
            webhook_event_type: row
                .webhook_event_type
                .parse()
                .map_err(|e| Error::Internal(format!("delivery {}: {}", row.id, e)))?,
            request_headers: row.request_headers.0,
            request_payload: row.request_payload,
            response_headers: row.response_headers.0,
            response_body: row.response_body,
            response_status_code: row.response_status_code,
            response_status_string: row.response_status_string,
            execution_start_timestamp: row.execution_start_timestamp,
            execution_end_timestamp: row.execution_end_timestamp,
            status,
            status_description: row.status_description,
            redelivered_from: row.redelivered_from,
        })
    }
}
