//! Consumes event envelopes and fans each one out to its subscribed webhooks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::DispatcherConfig;
use crate::error::{Error, Result};
use crate::models::delivery::DeliveryStatus;
use crate::models::event::EventEnvelope;
use crate::models::webhook::Webhook;
use crate::services::delivery_service::{DeliveryOutcome, DeliveryService, OutboundRequest};
use crate::services::ledger_service::DeliveryLedger;
use crate::services::queue_service::EventQueue;
use crate::services::registry_service::WebhookRegistry;
use crate::utils::encoding;

/// Per-envelope result. Returned rather than accumulated in shared counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub matched: usize,
    pub completed: usize,
    pub failed: usize,
    /// Attempts whose record could not be written to the ledger.
    pub unrecorded: usize,
}

pub struct Dispatcher {
    queue: Arc<dyn EventQueue>,
    registry: Arc<dyn WebhookRegistry>,
    ledger: Arc<dyn DeliveryLedger>,
    delivery: DeliveryService,
    workers: Arc<Semaphore>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn EventQueue>,
        registry: Arc<dyn WebhookRegistry>,
        ledger: Arc<dyn DeliveryLedger>,
        delivery: DeliveryService,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            queue,
            registry,
            ledger,
            delivery,
            workers: Arc::new(Semaphore::new(config.workers.max(1))),
            config,
        }
    }

    /// Poll the queue until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            target: "webhook_delivery",
            workers = self.config.workers,
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Starting webhook dispatcher"
        );

        while !shutdown.is_cancelled() {
            let idle = match self.run_once(&shutdown).await {
                Ok(true) => None,
                Ok(false) => Some(self.config.poll_interval),
                Err(e) => {
                    tracing::error!(target: "webhook_delivery", error = ?e, "Dispatcher poll error");
                    Some(Duration::from_secs(1))
                }
            };
            if let Some(wait) = idle {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = shutdown.cancelled() => {}
                }
            }
        }

        tracing::info!(target: "webhook_delivery", "Webhook dispatcher stopped");
    }

    /// Claim and dispatch one batch. Returns `false` when the queue was empty.
    pub async fn run_once(&self, shutdown: &CancellationToken) -> Result<bool> {
        let envelopes = self.queue.claim(self.config.batch_size).await?;
        if envelopes.is_empty() {
            return Ok(false);
        }

        let claimed = envelopes.len();
        for (position, envelope) in envelopes.into_iter().enumerate() {
            if shutdown.is_cancelled() {
                // Unstarted envelopes stay claimed and are released when the claim expires.
                tracing::info!(
                    target: "webhook_delivery",
                    released = claimed - position,
                    "Shutdown requested; leaving remaining events claimed"
                );
                break;
            }
            match self.dispatch(&envelope, shutdown).await {
                Ok(summary) => {
                    if summary.matched > 0 {
                        tracing::info!(
                            target: "webhook_delivery",
                            event_id = %envelope.id,
                            event_type = %envelope.event_type,
                            organization_id = %envelope.organization_id,
                            matched = summary.matched,
                            completed = summary.completed,
                            failed = summary.failed,
                            unrecorded = summary.unrecorded,
                            "Event dispatched"
                        );
                    }
                    self.queue.ack(envelope.id).await?;
                }
                Err(e) if shutdown.is_cancelled() => {
                    tracing::info!(
                        target: "webhook_delivery",
                        event_id = %envelope.id,
                        error = %e,
                        "Event left claimed during shutdown"
                    );
                }
                Err(e) => {
                    // Left claimed; it becomes visible again once the claim expires.
                    tracing::error!(
                        target: "webhook_delivery",
                        event_id = %envelope.id,
                        error = %e,
                        "Failed to dispatch event"
                    );
                }
            }
        }
        Ok(true)
    }

    /// Deliver one envelope to every enabled webhook subscribed to it.
    pub async fn dispatch(
        &self,
        envelope: &EventEnvelope,
        shutdown: &CancellationToken,
    ) -> Result<DispatchSummary> {
        let subscribers = self
            .registry
            .active_subscribers_for(envelope.organization_id, envelope.event_type)
            .await?;

        let mut summary = DispatchSummary {
            matched: subscribers.len(),
            ..DispatchSummary::default()
        };
        if subscribers.is_empty() {
            tracing::debug!(
                target: "webhook_delivery",
                event_id = %envelope.id,
                event_type = %envelope.event_type,
                organization_id = %envelope.organization_id,
                "No active subscriptions match event"
            );
            return Ok(summary);
        }

        let mut tasks = JoinSet::new();
        let mut interrupted = false;
        for webhook in subscribers {
            if shutdown.is_cancelled() {
                interrupted = true;
                break;
            }
            let permit = tokio::select! {
                permit = self.workers.clone().acquire_owned() => permit
                    .map_err(|e| Error::Internal(format!("worker pool closed: {}", e)))?,
                _ = shutdown.cancelled() => {
                    interrupted = true;
                    break;
                }
            };
            let delivery = self.delivery.clone();
            let ledger = self.ledger.clone();
            let envelope = envelope.clone();
            let shutdown = shutdown.clone();

            tasks.spawn(async move {
                let _permit = permit;
                deliver_to_webhook(&delivery, ledger.as_ref(), &envelope, &webhook, &shutdown)
                    .await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((status, recorded)) => {
                    match status {
                        DeliveryStatus::Completed => summary.completed += 1,
                        DeliveryStatus::Failed => summary.failed += 1,
                    }
                    if !recorded {
                        summary.unrecorded += 1;
                    }
                }
                Err(e) => {
                    tracing::error!(target: "webhook_delivery", error = %e, "Delivery task panicked");
                    summary.failed += 1;
                    summary.unrecorded += 1;
                }
            }
        }

        if interrupted {
            // Some subscribers were never attempted, so the event must not be acked.
            return Err(Error::Internal(format!(
                "dispatch interrupted by shutdown after {} of {} webhooks",
                summary.completed + summary.failed,
                summary.matched
            )));
        }
        Ok(summary)
    }
}

async fn deliver_to_webhook(
    delivery: &DeliveryService,
    ledger: &dyn DeliveryLedger,
    envelope: &EventEnvelope,
    webhook: &Webhook,
    shutdown: &CancellationToken,
) -> (DeliveryStatus, bool) {
    let delivery_id = Uuid::new_v4();

    let outcome = match encoding::render_event(envelope, webhook.content_type) {
        Ok(body) => {
            let request = OutboundRequest {
                webhook,
                delivery_id,
                event_id: envelope.id,
                event_name: envelope.event_type.as_str().to_string(),
                content_type: webhook.content_type.as_str().to_string(),
                body,
            };
            delivery.deliver_until(request, shutdown).await
        }
        Err(e) => {
            tracing::warn!(
                target: "webhook_delivery",
                webhook_id = %webhook.id,
                event_id = %envelope.id,
                error = %e,
                "Payload could not be encoded for webhook"
            );
            DeliveryOutcome::not_sent(format!("Serialization failed: {}", e))
        }
    };

    let record = outcome.into_record(
        delivery_id,
        webhook,
        envelope.id,
        envelope.user_id,
        envelope.event_type,
        None,
    );
    let status = record.status;
    let recorded = match ledger.append(&record).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(
                target: "webhook_delivery",
                webhook_id = %webhook.id,
                delivery_id = %delivery_id,
                error = %e,
                "Failed to record delivery"
            );
            false
        }
    };
    (status, recorded)
}
