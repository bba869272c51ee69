//! Store traits consumed by the dispatch engine, the quota tracker, and the
//! webhook reconciler.
//!
//! Each trait has a PostgreSQL implementation in [`crate::repositories`]
//! and an in-memory one in [`crate::memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mergealert_core::result::AppResult;
use mergealert_entity::delivery::DeliveryQuotaRecord;
use mergealert_entity::destination::{Channel, Destination};
use mergealert_entity::notification::{
    NewNotification, NotificationRecord, NotificationStats, NotificationWithProject,
};
use mergealert_entity::project::{Project, WebhookStateUpdate};
use mergealert_entity::user::User;

/// Project lookups and hook-state writes.
#[async_trait]
pub trait ProjectStore: Send + Sync + std::fmt::Debug + 'static {
    /// Find a project by local id. `NotFound` if absent.
    async fn find_by_id(&self, id: i64) -> AppResult<Project>;

    /// Find a project by its GitLab project id. `NotFound` if absent.
    async fn find_by_gitlab_id(&self, gitlab_project_id: i64) -> AppResult<Project>;

    /// All projects, ordered by id.
    async fn list(&self) -> AppResult<Vec<Project>>;

    /// Write one project's hook state.
    async fn update_webhook_state(&self, update: &WebhookStateUpdate) -> AppResult<()>;

    /// Write several hook states atomically.
    async fn update_webhook_states(&self, updates: &[WebhookStateUpdate]) -> AppResult<()>;
}

/// Destination lookups.
#[async_trait]
pub trait DestinationStore: Send + Sync + std::fmt::Debug + 'static {
    /// Find a destination (with settings) by id. `NotFound` if absent.
    async fn find_by_id(&self, id: i64) -> AppResult<Destination>;

    /// Destinations linked to a project, with settings, one entry per
    /// association row in link order. A destination linked twice appears
    /// twice; callers dedupe.
    async fn list_for_project(&self, project_id: i64) -> AppResult<Vec<Destination>>;
}

/// Directory of people who can be mentioned.
#[async_trait]
pub trait UserDirectory: Send + Sync + std::fmt::Debug + 'static {
    /// Users whose email is in `emails`, followed by users whose GitLab
    /// username is in `usernames`. A user matching both lists may appear
    /// twice.
    async fn find_by_emails_or_usernames(
        &self,
        emails: &[String],
        usernames: &[String],
    ) -> AppResult<Vec<User>>;
}

/// Append-only dispatch history.
#[async_trait]
pub trait NotificationStore: Send + Sync + std::fmt::Debug + 'static {
    /// Persist one record.
    async fn create(&self, notification: &NewNotification) -> AppResult<NotificationRecord>;

    /// Most recent records first.
    async fn list_recent(&self, limit: i64) -> AppResult<Vec<NotificationWithProject>>;

    /// Counters, with "today" measured from UTC midnight of `now`.
    async fn stats(&self, now: DateTime<Utc>) -> AppResult<NotificationStats>;
}

/// Monthly per-destination delivery counters.
#[async_trait]
pub trait DeliveryQuotaStore: Send + Sync + std::fmt::Debug + 'static {
    /// Return the counter for `(webhook_id, period_start)`, creating it at
    /// zero if missing. Idempotent under concurrent callers.
    async fn find_or_create(
        &self,
        webhook_id: i64,
        channel: Channel,
        period_start: DateTime<Utc>,
    ) -> AppResult<DeliveryQuotaRecord>;

    /// Atomically add one to the counter, creating it if missing.
    async fn increment(
        &self,
        webhook_id: i64,
        channel: Channel,
        period_start: DateTime<Utc>,
    ) -> AppResult<()>;
}
