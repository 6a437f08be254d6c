use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use crate::{
    dto::webhook_dto::{
        ContentTypesResponse, DeliveryListQuery, DeliveryListResponse, DeliverySummary,
        EventTypesResponse, PingResponse, UpsertWebhookPayload, WebhookListResponse,
        WebhookResponse,
    },
    error::Result,
    middleware::auth::Claims,
    models::{delivery::DeliveryRecord, event::EventType, webhook::ContentType},
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/webhooks/event-types",
    responses(
        (status = 200, description = "Event types a webhook can subscribe to", body = EventTypesResponse)
    )
)]
#[axum::debug_handler]
pub async fn list_event_types() -> impl IntoResponse {
    Json(EventTypesResponse {
        event_types: EventType::ALL.to_vec(),
    })
}

#[utoipa::path(
    get,
    path = "/api/webhooks/content-types",
    responses(
        (status = 200, description = "Supported payload encodings", body = ContentTypesResponse)
    )
)]
#[axum::debug_handler]
pub async fn list_content_types() -> impl IntoResponse {
    Json(ContentTypesResponse {
        content_types: ContentType::ALL.to_vec(),
    })
}

#[utoipa::path(
    get,
    path = "/api/webhooks",
    responses(
        (status = 200, description = "Webhooks of the caller's organization", body = WebhookListResponse)
    )
)]
#[axum::debug_handler]
pub async fn list_webhooks(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let service = &state.webhook_service;
    let webhooks = service.list_webhooks(claims.org).await?;

    let mut items = Vec::with_capacity(webhooks.len());
    for webhook in webhooks {
        let status = service.last_delivery_status(webhook.id).await?;
        items.push(WebhookResponse::from(webhook).with_last_delivery_status(status));
    }
    Ok(Json(WebhookListResponse { items }))
}

#[utoipa::path(
    post,
    path = "/api/webhooks",
    request_body = UpsertWebhookPayload,
    responses(
        (status = 201, description = "Webhook registered", body = WebhookResponse),
        (status = 400, description = "Invalid payload"),
        (status = 409, description = "Payload URL already registered")
    )
)]
#[axum::debug_handler]
pub async fn create_webhook(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpsertWebhookPayload>,
) -> Result<impl IntoResponse> {
    let webhook = state
        .webhook_service
        .create_webhook(claims.org, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(WebhookResponse::from(webhook))))
}

#[utoipa::path(
    get,
    path = "/api/webhooks/{id}",
    params(
        ("id" = Uuid, Path, description = "Webhook ID")
    ),
    responses(
        (status = 200, description = "Webhook", body = WebhookResponse),
        (status = 404, description = "Webhook not found")
    )
)]
#[axum::debug_handler]
pub async fn get_webhook(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let webhook = state.webhook_service.get_webhook(claims.org, id).await?;
    let status = state.webhook_service.last_delivery_status(id).await?;
    Ok(Json(
        WebhookResponse::from(webhook).with_last_delivery_status(status),
    ))
}

#[utoipa::path(
    put,
    path = "/api/webhooks/{id}",
    params(
        ("id" = Uuid, Path, description = "Webhook ID")
    ),
    request_body = UpsertWebhookPayload,
    responses(
        (status = 200, description = "Webhook updated", body = WebhookResponse),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Webhook not found"),
        (status = 409, description = "Payload URL already registered")
    )
)]
#[axum::debug_handler]
pub async fn update_webhook(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpsertWebhookPayload>,
) -> Result<impl IntoResponse> {
    let webhook = state
        .webhook_service
        .update_webhook(claims.org, id, payload)
        .await?;
    Ok(Json(WebhookResponse::from(webhook)))
}

#[utoipa::path(
    delete,
    path = "/api/webhooks/{id}",
    params(
        ("id" = Uuid, Path, description = "Webhook ID")
    ),
    responses(
        (status = 204, description = "Webhook deleted"),
        (status = 404, description = "Webhook not found")
    )
)]
#[axum::debug_handler]
pub async fn delete_webhook(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.webhook_service.delete_webhook(claims.org, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/webhooks/{id}/deliveries",
    params(
        ("id" = Uuid, Path, description = "Webhook ID"),
        DeliveryListQuery
    ),
    responses(
        (status = 200, description = "Delivery history, newest first", body = DeliveryListResponse),
        (status = 400, description = "Malformed cursor"),
        (status = 404, description = "Webhook not found")
    )
)]
#[axum::debug_handler]
pub async fn list_deliveries(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Query(query): Query<DeliveryListQuery>,
) -> Result<impl IntoResponse> {
    let page = state
        .webhook_service
        .list_deliveries(claims.org, id, query.cursor, query.limit)
        .await?;
    Ok(Json(DeliveryListResponse {
        items: page.records.into_iter().map(DeliverySummary::from).collect(),
        next_cursor: page.next_cursor,
    }))
}

#[utoipa::path(
    get,
    path = "/api/webhooks/{id}/deliveries/{delivery_id}",
    params(
        ("id" = Uuid, Path, description = "Webhook ID"),
        ("delivery_id" = Uuid, Path, description = "Delivery ID")
    ),
    responses(
        (status = 200, description = "Full delivery record", body = DeliveryRecord),
        (status = 404, description = "Webhook or delivery not found")
    )
)]
#[axum::debug_handler]
pub async fn get_delivery(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, delivery_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    let record = state
        .webhook_service
        .get_delivery(claims.org, id, delivery_id)
        .await?;
    Ok(Json(record))
}

#[utoipa::path(
    post,
    path = "/api/webhooks/{id}/deliveries/{delivery_id}/redeliver",
    params(
        ("id" = Uuid, Path, description = "Webhook ID"),
        ("delivery_id" = Uuid, Path, description = "Delivery to replay")
    ),
    responses(
        (status = 201, description = "Replay attempted; the new record is returned", body = DeliveryRecord),
        (status = 400, description = "The delivery never produced a request to replay"),
        (status = 404, description = "Webhook or delivery not found")
    )
)]
#[axum::debug_handler]
pub async fn redeliver(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, delivery_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    let record = state
        .webhook_service
        .redeliver(claims.org, id, delivery_id)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[utoipa::path(
    post,
    path = "/api/webhooks/{id}/ping",
    params(
        ("id" = Uuid, Path, description = "Webhook ID")
    ),
    responses(
        (status = 200, description = "Probe result; nothing is recorded", body = PingResponse),
        (status = 404, description = "Webhook not found")
    )
)]
#[axum::debug_handler]
pub async fn ping(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let outcome = state.webhook_service.ping(claims.org, id).await?;
    Ok(Json(PingResponse::from(outcome)))
}
