//! Notification history repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use mergealert_core::error::{AppError, ErrorKind};
use mergealert_core::result::AppResult;
use mergealert_entity::notification::{
    NewNotification, NotificationRecord, NotificationStats, NotificationWithProject,
};

use crate::store::NotificationStore;

/// Repository for dispatch history.
#[derive(Debug, Clone)]
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    /// Create a new notification repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for NotificationRepository {
    async fn create(&self, notification: &NewNotification) -> AppResult<NotificationRecord> {
        sqlx::query_as::<_, NotificationRecord>(
            "INSERT INTO notifications (project_id, merge_request_id, title, source_branch, target_branch, \
             author_email, assignee_emails, status, notification_sent, error_message) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
        )
        .bind(notification.project_id)
        .bind(notification.merge_request_id)
        .bind(&notification.title)
        .bind(&notification.source_branch)
        .bind(&notification.target_branch)
        .bind(&notification.author_email)
        .bind(Json(&notification.assignee_emails))
        .bind(&notification.status)
        .bind(notification.notification_sent)
        .bind(&notification.error_message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to save notification", e))
    }

    async fn list_recent(&self, limit: i64) -> AppResult<Vec<NotificationWithProject>> {
        sqlx::query_as::<_, NotificationWithProject>(
            "SELECT n.*, p.name AS project_name FROM notifications n \
             LEFT JOIN projects p ON p.id = n.project_id \
             ORDER BY n.created_at DESC, n.id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list notifications", e))
    }

    async fn stats(&self, now: DateTime<Utc>) -> AppResult<NotificationStats> {
        let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();

        let (total, success, failure, today): (i64, i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), \
             COUNT(*) FILTER (WHERE notification_sent), \
             COUNT(*) FILTER (WHERE NOT notification_sent), \
             COUNT(*) FILTER (WHERE created_at >= $1) \
             FROM notifications",
        )
        .bind(midnight)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count notifications", e))?;

        Ok(NotificationStats {
            total,
            success,
            failure,
            today,
        })
    }
}
