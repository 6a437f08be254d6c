use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::event::EventType;

/// Payload formats a webhook endpoint can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ContentType {
    #[serde(rename = "application/json")]
    Json,
    #[serde(rename = "application/x-www-form-urlencoded")]
    FormUrlEncoded,
}

impl ContentType {
    pub const ALL: [ContentType; 2] = [ContentType::Json, ContentType::FormUrlEncoded];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::FormUrlEncoded => "application/x-www-form-urlencoded",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ContentType::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::BadRequest(format!("Unsupported content type: {}", s)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Webhook {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub payload_url: String,
    pub content_type: ContentType,
    pub subscribed_events: Vec<EventType>,
    pub disabled: bool,
    pub secret_key: String,
    pub skip_ssl_verification: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Webhook {
    pub fn is_subscribed_to(&self, event_type: EventType) -> bool {
        self.subscribed_events.contains(&event_type)
    }

    pub fn is_signed(&self) -> bool {
        !self.secret_key.is_empty()
    }
}

#[derive(Debug, FromRow)]
pub struct WebhookRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub payload_url: String,
    pub content_type: String,
    pub subscribed_events: Vec<String>,
    pub disabled: bool,
    pub secret_key: String,
    pub skip_ssl_verification: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<WebhookRow> for Webhook {
    type Error = Error;

    fn try_from(row: WebhookRow) -> Result<Self> {
        let subscribed_events = row
            .subscribed_events
            .iter()
            .map(|e| e.parse::<EventType>())
            .collect::<Result<Vec<_>>>()
            .map_err(|e| Error::Internal(format!("webhook {}: {}", row.id, e)))?;

        Ok(Self {
            id: row.id,
            organization_id: row.organization_id,
            payload_url: row.payload_url,
            content_type: row
                .content_type
                .parse()
                .map_err(|e| Error::Internal(format!("webhook {}: {}", row.id, e)))?,
            subscribed_events,
            disabled: row.disabled,
            secret_key: row.secret_key,
            skip_ssl_verification: row.skip_ssl_verification,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
