use validator::Validate;

use crate::dto::webhook_dto::UpsertWebhookPayload;
use crate::error::{Error, Result};

pub fn validate<T: Validate>(val: &T) -> std::result::Result<(), validator::ValidationErrors> {
    val.validate()
}

/// Check a webhook body and return it with duplicate events removed.
pub fn normalize_webhook(mut payload: UpsertWebhookPayload) -> Result<UpsertWebhookPayload> {
    validate(&payload)?;
    validate_payload_url(&payload.payload_url)?;

    let mut seen = Vec::with_capacity(payload.subscribed_events.len());
    for event in payload.subscribed_events.drain(..) {
        if !seen.contains(&event) {
            seen.push(event);
        }
    }
    payload.subscribed_events = seen;

    if payload.subscribed_events.is_empty() {
        return Err(Error::BadRequest(
            "subscribedEvents must not be empty".to_string(),
        ));
    }
    Ok(payload)
}

pub fn validate_payload_url(raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| Error::BadRequest(format!("Invalid payload URL: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(Error::BadRequest(format!(
                "Payload URL must use http or https, got {}",
                scheme
            )))
        }
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(Error::BadRequest("Payload URL must have a host".to_string()));
    }
    Ok(())
}
