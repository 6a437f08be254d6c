use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::models::event::EventEnvelope;
use crate::models::webhook::ContentType;

pub const PING_EVENT: &str = "webhook.ping";

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("{content_type} requires a JSON object payload, got {found}")]
    NotAnObject {
        content_type: ContentType,
        found: &'static str,
    },

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Wire document for a business event. Depends only on the envelope, so the
/// same event always renders to the same bytes.
pub fn event_document(envelope: &EventEnvelope) -> JsonValue {
    json!({
        "type": envelope.event_type.as_str(),
        "organizationId": envelope.organization_id,
        "userId": envelope.user_id,
        "timestamp": envelope.occurred_at,
        "data": envelope.payload,
    })
}

pub fn ping_document(webhook_id: Uuid, organization_id: Uuid) -> JsonValue {
    json!({
        "type": PING_EVENT,
        "organizationId": organization_id,
        "webhookId": webhook_id,
        "timestamp": chrono::Utc::now(),
        "data": {},
    })
}

/// Serialize an event for the webhook's content type.
pub fn render_event(
    envelope: &EventEnvelope,
    content_type: ContentType,
) -> Result<String, EncodeError> {
    if content_type == ContentType::FormUrlEncoded && !envelope.payload.is_object() {
        return Err(EncodeError::NotAnObject {
            content_type,
            found: kind(&envelope.payload),
        });
    }
    encode(content_type, &event_document(envelope))
}

pub fn encode(content_type: ContentType, document: &JsonValue) -> Result<String, EncodeError> {
    match content_type {
        ContentType::Json => Ok(serde_json::to_string(document)?),
        ContentType::FormUrlEncoded => encode_form(document),
    }
}

// One level of nesting becomes `parent[key]`; anything deeper is sent as JSON text.
fn encode_form(document: &JsonValue) -> Result<String, EncodeError> {
    let JsonValue::Object(fields) = document else {
        return Err(EncodeError::NotAnObject {
            content_type: ContentType::FormUrlEncoded,
            found: kind(document),
        });
    };

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in fields {
        match value {
            JsonValue::Object(nested) => {
                for (nested_key, nested_value) in nested {
                    serializer.append_pair(
                        &format!("{}[{}]", key, nested_key),
                        &scalar_text(nested_value),
                    );
                }
            }
            other => {
                serializer.append_pair(key, &scalar_text(other));
            }
        }
    }
    Ok(serializer.finish())
}

fn scalar_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
