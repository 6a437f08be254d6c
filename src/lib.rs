pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::{Config, DeliveryConfig};
use crate::error::Result;
use crate::middleware::{auth, rate_limit};
use crate::services::{
    delivery_service::DeliveryService,
    ledger_service::{DeliveryLedger, PgDeliveryLedger},
    publisher_service::EventPublisher,
    queue_service::{EventQueue, PgEventQueue},
    registry_service::{PgWebhookRegistry, WebhookRegistry},
    webhook_service::WebhookService,
};

#[derive(Clone)]
pub struct AppState {
    pub webhook_service: WebhookService,
    /// Handle for host code that emits consent events from its own handlers.
    pub publisher: EventPublisher,
}

impl AppState {
    pub fn new(
        registry: Arc<dyn WebhookRegistry>,
        ledger: Arc<dyn DeliveryLedger>,
        queue: Arc<dyn EventQueue>,
        delivery: &DeliveryConfig,
    ) -> Result<Self> {
        let delivery = DeliveryService::new(delivery)?;
        Ok(Self {
            webhook_service: WebhookService::new(registry, ledger, delivery),
            publisher: EventPublisher::new(queue),
        })
    }

    pub fn from_pool(pool: PgPool, config: &Config) -> Result<Self> {
        Self::new(
            Arc::new(PgWebhookRegistry::new(pool.clone())),
            Arc::new(PgDeliveryLedger::new(pool.clone())),
            Arc::new(PgEventQueue::new(pool, config.event_claim_timeout_secs)),
            &config.delivery(),
        )
    }
}

/// Management API plus `/health`. Everything under `/api` requires a bearer token.
pub fn router(state: AppState, jwt_secret: &str, management_rps: u32) -> Router {
    let management_api = Router::new()
        .route(
            "/api/webhooks/event-types",
            get(routes::webhook::list_event_types),
        )
        .route(
            "/api/webhooks/content-types",
            get(routes::webhook::list_content_types),
        )
        .route(
            "/api/webhooks",
            get(routes::webhook::list_webhooks).post(routes::webhook::create_webhook),
        )
        .route(
            "/api/webhooks/:id",
            get(routes::webhook::get_webhook)
                .put(routes::webhook::update_webhook)
                .delete(routes::webhook::delete_webhook),
        )
        .route(
            "/api/webhooks/:id/deliveries",
            get(routes::webhook::list_deliveries),
        )
        .route(
            "/api/webhooks/:id/deliveries/:delivery_id",
            get(routes::webhook::get_delivery),
        )
        .route(
            "/api/webhooks/:id/deliveries/:delivery_id/redeliver",
            post(routes::webhook::redeliver),
        )
        .route("/api/webhooks/:id/ping", post(routes::webhook::ping))
        .route("/api/openapi.json", get(routes::openapi))
        .layer(axum::middleware::from_fn_with_state(
            rate_limit::TenantRateLimiter::new(management_rps),
            rate_limit::tenant_rate_limit,
        ))
        .layer(axum::middleware::from_fn_with_state(
            auth::AuthState::new(jwt_secret),
            auth::require_bearer_auth,
        ));

    Router::new()
        .route("/health", get(routes::health::health))
        .merge(management_api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
