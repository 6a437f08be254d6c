use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::event::{EventEnvelope, EventRow};

/// Durable topic between the publisher and the dispatcher.
#[async_trait]
pub trait EventQueue: Send + Sync {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<()>;

    /// Claim up to `max` envelopes for this consumer. Claimed envelopes are
    /// invisible to other consumers until acknowledged or the claim expires.
    async fn claim(&self, max: i64) -> Result<Vec<EventEnvelope>>;

    async fn ack(&self, event_id: Uuid) -> Result<()>;
}

#[derive(Clone)]
pub struct PgEventQueue {
    pool: PgPool,
    claim_timeout_secs: i64,
}

impl PgEventQueue {
    pub fn new(pool: PgPool, claim_timeout_secs: i64) -> Self {
        Self {
            pool,
            claim_timeout_secs,
        }
    }
}

#[async_trait]
impl EventQueue for PgEventQueue {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_events (id, event_type, organization_id, user_id, payload, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(envelope.id)
        .bind(envelope.event_type.as_str())
        .bind(envelope.organization_id)
        .bind(envelope.user_id)
        .bind(&envelope.payload)
        .bind(envelope.occurred_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim(&self, max: i64) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            UPDATE webhook_events SET status = 'claimed', claimed_at = NOW()
            WHERE id IN (
                SELECT id FROM webhook_events
                WHERE status = 'pending'
                   OR (status = 'claimed' AND claimed_at < NOW() - make_interval(secs => $2))
                ORDER BY occurred_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT $1
            )
            RETURNING id, event_type, organization_id, user_id, payload, occurred_at
            "#,
        )
        .bind(max)
        .bind(self.claim_timeout_secs as f64)
        .fetch_all(&self.pool)
        .await?;

        let mut envelopes = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            match EventEnvelope::try_from(row) {
                Ok(envelope) => envelopes.push(envelope),
                Err(e) => {
                    // Unreadable rows would otherwise be reclaimed forever.
                    tracing::error!(
                        target: "webhook_delivery",
                        event_id = %id,
                        error = %e,
                        "Discarding undecodable event"
                    );
                    self.ack(id).await?;
                }
            }
        }
        envelopes.sort_by_key(|e| e.occurred_at);
        Ok(envelopes)
    }

    async fn ack(&self, event_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_events SET status = 'dispatched', dispatched_at = NOW() WHERE id = $1",
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
