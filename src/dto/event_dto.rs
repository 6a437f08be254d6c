use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::event::EventType;

/// Binds a payload struct to the single event type it may be published under.
pub trait EventPayload: Serialize {
    const EVENT_TYPE: EventType;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentChange {
    pub data_agreement_id: String,
    pub purpose_id: String,
    pub attribute_ids: Vec<String>,
    pub individual_id: Uuid,
    pub consented_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsentAllowed(pub ConsentChange);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsentDisallowed(pub ConsentChange);

impl EventPayload for ConsentAllowed {
    const EVENT_TYPE: EventType = EventType::ConsentAllowed;
}

impl EventPayload for ConsentDisallowed {
    const EVENT_TYPE: EventType = EventType::ConsentDisallowed;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgSubscription {
    pub individual_id: Uuid,
    pub subscription_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgSubscribed(pub OrgSubscription);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgUnsubscribed(pub OrgSubscription);

impl EventPayload for OrgSubscribed {
    const EVENT_TYPE: EventType = EventType::OrgSubscribed;
}

impl EventPayload for OrgUnsubscribed {
    const EVENT_TYPE: EventType = EventType::OrgUnsubscribed;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EulaUpdated {
    pub eula_url: String,
    pub version: String,
}

impl EventPayload for EulaUpdated {
    const EVENT_TYPE: EventType = EventType::EulaUpdated;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataBreachDisclosed {
    pub headline: String,
    pub description: String,
    pub affected_users: Option<u64>,
    pub occurred_at: DateTime<Utc>,
    pub dpo_contact: Option<String>,
}

impl EventPayload for DataBreachDisclosed {
    const EVENT_TYPE: EventType = EventType::DataBreachDisclosed;
}
