//! The signed HTTP delivery step shared by dispatch, redelivery and ping.
//!
//! A delivery never returns an `Error`: every way an attempt can go wrong is
//! folded into a [`DeliveryOutcome`] with `status = failed` and a description
//! naming the stage that failed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect, Client};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::DeliveryConfig;
use crate::error::Result;
use crate::models::delivery::{DeliveryRecord, DeliveryStatus, Headers};
use crate::models::event::EventType;
use crate::models::webhook::Webhook;
use crate::utils::{crypto, tls};

pub const EVENT_HEADER: &str = "X-Consent-Event";
pub const EVENT_ID_HEADER: &str = "X-Consent-Event-Id";
pub const DELIVERY_HEADER: &str = "X-Consent-Delivery";
pub const SIGNATURE_HEADER: &str = "X-Consent-Signature";

const MAX_RESPONSE_BODY_CHARS: usize = 4096;
// Upper bound on bytes for MAX_RESPONSE_BODY_CHARS UTF-8 characters.
const MAX_RESPONSE_BODY_BYTES: usize = MAX_RESPONSE_BODY_CHARS * 4;

/// Everything needed to POST one body to one webhook.
#[derive(Debug, Clone)]
pub struct OutboundRequest<'a> {
    pub webhook: &'a Webhook,
    pub delivery_id: Uuid,
    pub event_id: Uuid,
    pub event_name: String,
    pub content_type: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub request_headers: Headers,
    pub request_payload: String,
    pub response_headers: Headers,
    pub response_body: String,
    pub response_status_code: i32,
    pub response_status_string: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub status_description: String,
}

impl DeliveryOutcome {
    /// Outcome for an attempt abandoned before any network call.
    pub fn not_sent(description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            request_headers: Headers::new(),
            request_payload: String::new(),
            response_headers: Headers::new(),
            response_body: String::new(),
            response_status_code: 0,
            response_status_string: String::new(),
            started_at: now,
            finished_at: now,
            status: DeliveryStatus::Failed,
            status_description: description.into(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == DeliveryStatus::Completed
    }

    pub fn into_record(
        self,
        delivery_id: Uuid,
        webhook: &Webhook,
        event_id: Uuid,
        user_id: Option<Uuid>,
        event_type: EventType,
        redelivered_from: Option<Uuid>,
    ) -> DeliveryRecord {
        DeliveryRecord {
            id: delivery_id,
            webhook_id: webhook.id,
            organization_id: webhook.organization_id,
            event_id,
            user_id,
            webhook_event_type: event_type,
            request_headers: self.request_headers,
            request_payload: self.request_payload,
            response_headers: self.response_headers,
            response_body: self.response_body,
            response_status_code: self.response_status_code,
            response_status_string: self.response_status_string,
            execution_start_timestamp: self.started_at,
            execution_end_timestamp: self.finished_at,
            status: self.status,
            status_description: self.status_description,
            redelivered_from,
        }
    }
}

enum Exchange {
    Responded {
        code: u16,
        status: String,
        headers: Headers,
        body: String,
    },
    Unreadable {
        code: u16,
        status: String,
        headers: Headers,
        reason: String,
    },
    Transport(String),
}

#[derive(Clone)]
pub struct DeliveryService {
    client: Client,
    skip_verification_client: Client,
    timeout: Duration,
    user_agent: String,
}

impl DeliveryService {
    pub fn new(config: &DeliveryConfig) -> Result<Self> {
        let client = Self::client_builder(config).build()?;
        let skip_verification_client = Self::client_builder(config)
            .use_preconfigured_tls(tls::skip_chain_verification_config())
            .build()?;

        Ok(Self {
            client,
            skip_verification_client,
            timeout: config.timeout,
            user_agent: config.user_agent.clone(),
        })
    }

    fn client_builder(config: &DeliveryConfig) -> reqwest::ClientBuilder {
        Client::builder()
            .timeout(config.timeout)
            .redirect(redirect::Policy::none())
    }

    /// Request headers for an attempt, including the signature when the webhook has a secret.
    pub fn request_headers(&self, request: &OutboundRequest<'_>) -> Headers {
        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), request.content_type.clone());
        headers.insert("User-Agent".to_string(), self.user_agent.clone());
        headers.insert(EVENT_HEADER.to_string(), request.event_name.clone());
        headers.insert(EVENT_ID_HEADER.to_string(), request.event_id.to_string());
        headers.insert(DELIVERY_HEADER.to_string(), request.delivery_id.to_string());
        if request.webhook.is_signed() {
            headers.insert(
                SIGNATURE_HEADER.to_string(),
                crypto::signature_header(&request.webhook.secret_key, request.body.as_bytes()),
            );
        }
        headers
    }

    pub async fn deliver(&self, request: OutboundRequest<'_>) -> DeliveryOutcome {
        self.deliver_until(request, &CancellationToken::new()).await
    }

    /// Like [`deliver`](Self::deliver) but gives up as soon as `cancel` fires.
    pub async fn deliver_until(
        &self,
        request: OutboundRequest<'_>,
        cancel: &CancellationToken,
    ) -> DeliveryOutcome {
        let request_headers = self.request_headers(&request);
        let header_map = match to_header_map(&request_headers) {
            Ok(map) => map,
            Err(reason) => {
                let mut outcome = DeliveryOutcome::not_sent(reason);
                outcome.request_headers = request_headers;
                outcome.request_payload = request.body;
                return outcome;
            }
        };

        let started_at = Utc::now();
        let exchange = tokio::select! {
            exchange = self.exchange(&request, header_map) => exchange,
            _ = cancel.cancelled() => {
                Exchange::Transport("Delivery cancelled: dispatcher shutting down".to_string())
            }
        };
        let finished_at = Utc::now();

        let mut outcome = DeliveryOutcome {
            request_headers,
            request_payload: request.body,
            response_headers: Headers::new(),
            response_body: String::new(),
            response_status_code: 0,
            response_status_string: String::new(),
            started_at,
            finished_at,
            status: DeliveryStatus::Failed,
            status_description: String::new(),
        };

        match exchange {
            Exchange::Responded {
                code,
                status,
                headers,
                body,
            } => {
                outcome.response_status_code = code as i32;
                outcome.response_status_string = status;
                outcome.response_headers = headers;
                outcome.response_body = body;
                if (200..300).contains(&code) {
                    outcome.status = DeliveryStatus::Completed;
                } else {
                    outcome.status_description =
                        format!("Endpoint responded with HTTP {}", code);
                }
            }
            Exchange::Unreadable {
                code,
                status,
                headers,
                reason,
            } => {
                outcome.response_status_code = code as i32;
                outcome.response_status_string = status;
                outcome.response_headers = headers;
                outcome.status_description = reason;
            }
            Exchange::Transport(reason) => {
                outcome.status_description = reason;
            }
        }

        tracing::info!(
            target: "webhook_delivery",
            webhook_id = %request.webhook.id,
            delivery_id = %request.delivery_id,
            event = %request.event_name,
            status = outcome.status.as_str(),
            response_code = outcome.response_status_code,
            latency_ms = (finished_at - started_at).num_milliseconds(),
            description = %outcome.status_description,
            "Webhook delivery attempt finished"
        );
        outcome
    }

    async fn exchange(&self, request: &OutboundRequest<'_>, headers: HeaderMap) -> Exchange {
        let client = if request.webhook.skip_ssl_verification {
            &self.skip_verification_client
        } else {
            &self.client
        };

        let response = match client
            .post(&request.webhook.payload_url)
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return Exchange::Transport(self.describe_transport_error(&e)),
        };

        let code = response.status().as_u16();
        let status = response.status().to_string();
        let headers = from_header_map(response.headers());

        match read_capped_body(response).await {
            Ok(bytes) => match decode_capped(&bytes) {
                Some(text) => Exchange::Responded {
                    code,
                    status,
                    headers,
                    body: text.chars().take(MAX_RESPONSE_BODY_CHARS).collect(),
                },
                None => Exchange::Unreadable {
                    code,
                    status,
                    headers,
                    reason: "Response body is not valid UTF-8".to_string(),
                },
            },
            Err(e) => Exchange::Unreadable {
                code,
                status,
                headers,
                reason: if e.is_timeout() {
                    format!(
                        "Timed out reading response body after {}ms",
                        self.timeout.as_millis()
                    )
                } else {
                    format!("Failed to read response body: {}", error_chain(&e))
                },
            },
        }
    }

    fn describe_transport_error(&self, e: &reqwest::Error) -> String {
        if e.is_timeout() {
            format!("Request timed out after {}ms", self.timeout.as_millis())
        } else if e.is_connect() {
            format!("Connection failed: {}", error_chain(e))
        } else if e.is_builder() {
            format!("Invalid request: {}", error_chain(e))
        } else {
            format!("Request failed: {}", error_chain(e))
        }
    }
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut text = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        let inner_text = inner.to_string();
        if !text.contains(&inner_text) {
            text.push_str(": ");
            text.push_str(&inner_text);
        }
        source = inner.source();
    }
    text
}

/// Read chunks until enough bytes for the stored prefix have arrived.
async fn read_capped_body(
    mut response: reqwest::Response,
) -> std::result::Result<Vec<u8>, reqwest::Error> {
    let mut body = Vec::new();
    while body.len() < MAX_RESPONSE_BODY_BYTES {
        match response.chunk().await? {
            Some(chunk) => body.extend_from_slice(&chunk),
            None => break,
        }
    }
    body.truncate(MAX_RESPONSE_BODY_BYTES);
    Ok(body)
}

/// UTF-8 decode, dropping a character split by the read cap.
fn decode_capped(bytes: &[u8]) -> Option<String> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Some(text.to_string()),
        Err(e) if e.error_len().is_none() && bytes.len() >= MAX_RESPONSE_BODY_BYTES => {
            Some(String::from_utf8_lossy(&bytes[..e.valid_up_to()]).into_owned())
        }
        Err(_) => None,
    }
}

fn to_header_map(headers: &Headers) -> std::result::Result<HeaderMap, String> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| format!("Invalid request header name: {}", name))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| format!("Invalid value for request header {}", name))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn from_header_map(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match headers.get_mut(name.as_str()) {
            Some(existing) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            None => {
                headers.insert(name.as_str().to_string(), value);
            }
        }
    }
    headers
}
