use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Business events a webhook can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum EventType {
    #[serde(rename = "consent.allowed")]
    ConsentAllowed,
    #[serde(rename = "consent.disallowed")]
    ConsentDisallowed,
    #[serde(rename = "org.subscribed")]
    OrgSubscribed,
    #[serde(rename = "org.unsubscribed")]
    OrgUnsubscribed,
    #[serde(rename = "eula.updated")]
    EulaUpdated,
    #[serde(rename = "data_breach.disclosed")]
    DataBreachDisclosed,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::ConsentAllowed,
        EventType::ConsentDisallowed,
        EventType::OrgSubscribed,
        EventType::OrgUnsubscribed,
        EventType::EulaUpdated,
        EventType::DataBreachDisclosed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ConsentAllowed => "consent.allowed",
            EventType::ConsentDisallowed => "consent.disallowed",
            EventType::OrgSubscribed => "org.subscribed",
            EventType::OrgUnsubscribed => "org.unsubscribed",
            EventType::EulaUpdated => "eula.updated",
            EventType::DataBreachDisclosed => "data_breach.disclosed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        EventType::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| Error::BadRequest(format!("Unknown event type: {}", s)))
    }
}

/// An immutable fact published once per business occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub event_type: EventType,
    pub organization_id: Uuid,
    pub user_id: Option<Uuid>,
    pub payload: JsonValue,
    pub occurred_at: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(
        event_type: EventType,
        organization_id: Uuid,
        user_id: Option<Uuid>,
        payload: JsonValue,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            organization_id,
            user_id,
            payload,
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct EventRow {
    pub id: Uuid,
    pub event_type: String,
    pub organization_id: Uuid,
    pub user_id: Option<Uuid>,
    pub payload: JsonValue,
    pub occurred_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for EventEnvelope {
    type Error = Error;

    fn try_from(row: EventRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            event_type: row
                .event_type
                .parse()
                .map_err(|_| Error::Internal(format!("stored event type {}", row.event_type)))?,
            organization_id: row.organization_id,
            user_id: row.user_id,
            payload: row.payload,
            occurred_at: row.occurred_at,
        })
    }
}
