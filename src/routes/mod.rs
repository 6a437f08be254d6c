pub mod health;
pub mod webhook;

use axum::{response::IntoResponse, Json};
use utoipa::OpenApi;

use crate::dto::webhook_dto::{
    ContentTypesResponse, DeliveryListResponse, DeliverySummary, EventTypesResponse,
    PingResponse, UpsertWebhookPayload, WebhookListResponse, WebhookResponse,
};
use crate::models::{
    delivery::{DeliveryRecord, DeliveryStatus},
    event::EventType,
    webhook::ContentType,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        webhook::list_event_types,
        webhook::list_content_types,
        webhook::list_webhooks,
        webhook::create_webhook,
        webhook::get_webhook,
        webhook::update_webhook,
        webhook::delete_webhook,
        webhook::list_deliveries,
        webhook::get_delivery,
        webhook::redeliver,
        webhook::ping,
    ),
    components(schemas(
        EventType,
        ContentType,
        DeliveryStatus,
        DeliveryRecord,
        UpsertWebhookPayload,
        WebhookResponse,
        WebhookListResponse,
        DeliverySummary,
        DeliveryListResponse,
        PingResponse,
        EventTypesResponse,
        ContentTypesResponse,
    ))
)]
pub struct ApiDoc;

pub async fn openapi() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
