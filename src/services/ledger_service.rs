use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::delivery::{DeliveryRecord, DeliveryRow, DeliveryStatus};

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryPage {
    pub records: Vec<DeliveryRecord>,
    pub next_cursor: Option<String>,
}

/// Append-only store of delivery attempts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    async fn append(&self, record: &DeliveryRecord) -> Result<()>;

    /// Newest first. `cursor` is the opaque value returned by the previous page.
    async fn list(
        &self,
        webhook_id: Uuid,
        cursor: Option<String>,
        limit: i64,
    ) -> Result<DeliveryPage>;

    async fn get(&self, webhook_id: Uuid, delivery_id: Uuid) -> Result<DeliveryRecord>;

    async fn latest_status(&self, webhook_id: Uuid) -> Result<Option<DeliveryStatus>>;
}

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
}

/// Cursors wrap the insertion sequence of the last record on a page.
pub fn encode_cursor(seq: i64) -> String {
    URL_SAFE_NO_PAD.encode(format!("d:{}", seq))
}

pub fn decode_cursor(cursor: &str) -> Result<i64> {
    let invalid = || Error::BadRequest("Invalid pagination cursor".to_string());
    let raw = URL_SAFE_NO_PAD.decode(cursor).map_err(|_| invalid())?;
    let text = String::from_utf8(raw).map_err(|_| invalid())?;
    text.strip_prefix("d:")
        .and_then(|n| n.parse::<i64>().ok())
        .filter(|n| *n >= 0)
        .ok_or_else(invalid)
}

pub fn delivery_not_found(delivery_id: Uuid) -> Error {
    Error::NotFound(format!("Delivery {} not found", delivery_id))
}

const DELIVERY_COLUMNS: &str = r#"seq, id, webhook_id, organization_id, event_id, user_id, webhook_event_type,
    request_headers, request_payload, response_headers, response_body, response_status_code,
    response_status_string, execution_start_timestamp, execution_end_timestamp, status,
    status_description, redelivered_from"#;

#[derive(Clone)]
pub struct PgDeliveryLedger {
    pool: PgPool,
}

impl PgDeliveryLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryLedger for PgDeliveryLedger {
    async fn append(&self, record: &DeliveryRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_deliveries (
                id, webhook_id, organization_id, event_id, user_id, webhook_event_type,
                request_headers, request_payload, response_headers, response_body,
                response_status_code, response_status_string, execution_start_timestamp,
                execution_end_timestamp, status, status_description, redelivered_from
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(record.id)
        .bind(record.webhook_id)
        .bind(record.organization_id)
        .bind(record.event_id)
        .bind(record.user_id)
        .bind(record.webhook_event_type.as_str())
        .bind(Json(&record.request_headers))
        .bind(&record.request_payload)
        .bind(Json(&record.response_headers))
        .bind(&record.response_body)
        .bind(record.response_status_code)
        .bind(&record.response_status_string)
        .bind(record.execution_start_timestamp)
        .bind(record.execution_end_timestamp)
        .bind(record.status.as_str())
        .bind(&record.status_description)
        .bind(record.redelivered_from)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(
        &self,
        webhook_id: Uuid,
        cursor: Option<String>,
        limit: i64,
    ) -> Result<DeliveryPage> {
        let before = cursor.as_deref().map(decode_cursor).transpose()?;
        let rows = sqlx::query_as::<_, DeliveryRow>(&format!(
            r#"SELECT {} FROM webhook_deliveries
               WHERE webhook_id = $1 AND ($2::BIGINT IS NULL OR seq < $2)
               ORDER BY seq DESC
               LIMIT $3"#,
            DELIVERY_COLUMNS
        ))
        .bind(webhook_id)
        .bind(before)
        .bind(limit + 1)
        .fetch_all(&self.pool)
        .await?;

        let has_more = rows.len() as i64 > limit;
        let rows: Vec<DeliveryRow> = rows.into_iter().take(limit as usize).collect();
        let next_cursor = if has_more {
            rows.last().map(|r| encode_cursor(r.seq))
        } else {
            None
        };
        let records = rows
            .into_iter()
            .map(DeliveryRecord::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(DeliveryPage {
            records,
            next_cursor,
        })
    }

    async fn get(&self, webhook_id: Uuid, delivery_id: Uuid) -> Result<DeliveryRecord> {
        let row = sqlx::query_as::<_, DeliveryRow>(&format!(
            "SELECT {} FROM webhook_deliveries WHERE webhook_id = $1 AND id = $2",
            DELIVERY_COLUMNS
        ))
        .bind(webhook_id)
        .bind(delivery_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| delivery_not_found(delivery_id))?;
        DeliveryRecord::try_from(row)
    }

    async fn latest_status(&self, webhook_id: Uuid) -> Result<Option<DeliveryStatus>> {
        let status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM webhook_deliveries WHERE webhook_id = $1 ORDER BY seq DESC LIMIT 1",
        )
        .bind(webhook_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(status.map(|s| match s.as_str() {
            "completed" => DeliveryStatus::Completed,
            _ => DeliveryStatus::Failed,
        }))
    }
}
