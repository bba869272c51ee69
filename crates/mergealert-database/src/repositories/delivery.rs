//! Delivery quota repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use mergealert_core::error::{AppError, ErrorKind};
use mergealert_core::result::AppResult;
use mergealert_entity::delivery::DeliveryQuotaRecord;
use mergealert_entity::destination::Channel;

use crate::store::DeliveryQuotaStore;

/// Repository for `webhook_delivery_stats`.
#[derive(Debug, Clone)]
pub struct DeliveryQuotaRepository {
    pool: PgPool,
}

impl DeliveryQuotaRepository {
    /// Create a new delivery quota repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryQuotaStore for DeliveryQuotaRepository {
    async fn find_or_create(
        &self,
        webhook_id: i64,
        channel: Channel,
        period_start: DateTime<Utc>,
    ) -> AppResult<DeliveryQuotaRecord> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        sqlx::query_as::<_, DeliveryQuotaRecord>(
            "INSERT INTO webhook_delivery_stats (webhook_id, channel, period_start, count) \
             VALUES ($1, $2, $3, 0) \
             ON CONFLICT (webhook_id, period_start) \
             DO UPDATE SET channel = webhook_delivery_stats.channel \
             RETURNING id, webhook_id, channel, period_start, count",
        )
        .bind(webhook_id)
        .bind(channel.as_str())
        .bind(period_start)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to load delivery quota", e)
        })
    }

    async fn increment(
        &self,
        webhook_id: i64,
        channel: Channel,
        period_start: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO webhook_delivery_stats (webhook_id, channel, period_start, count) \
             VALUES ($1, $2, $3, 1) \
             ON CONFLICT (webhook_id, period_start) \
             DO UPDATE SET count = webhook_delivery_stats.count + 1, updated_at = NOW()",
        )
        .bind(webhook_id)
        .bind(channel.as_str())
        .bind(period_start)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to increment delivery quota", e)
        })?;
        Ok(())
    }
}
