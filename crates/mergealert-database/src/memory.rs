//! In-memory implementation of every store trait.
//!
//! Enabled by the `testing` feature. Semantics match the PostgreSQL
//! repositories: lazy zero-count quota rows, atomic increments, duplicate
//! project links preserved in link order, append-only history.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use dashmap::DashMap;

use mergealert_core::error::AppError;
use mergealert_core::result::AppResult;
use mergealert_entity::delivery::DeliveryQuotaRecord;
use mergealert_entity::destination::{Channel, Destination, DestinationSettings};
use mergealert_entity::notification::{
    NewNotification, NotificationRecord, NotificationStats, NotificationWithProject,
};
use mergealert_entity::project::{Project, WebhookState, WebhookStateUpdate};
use mergealert_entity::user::User;

use crate::store::{
    DeliveryQuotaStore, DestinationStore, NotificationStore, ProjectStore, UserDirectory,
};

#[derive(Debug, Default)]
struct Tables {
    projects: BTreeMap<i64, Project>,
    destinations: BTreeMap<i64, Destination>,
    links: Vec<(i64, i64)>,
    users: Vec<User>,
    notifications: Vec<NotificationRecord>,
}

#[derive(Debug)]
struct QuotaSlot {
    id: i64,
    channel: Channel,
    count: AtomicI64,
}

/// Shared in-memory store. Cloning yields a handle to the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    quotas: Arc<DashMap<(i64, DateTime<Utc>), QuotaSlot>>,
    next_id: Arc<AtomicI64>,
    state_writes: Arc<AtomicI64>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Register a project with no hook configured.
    pub fn add_project(&self, gitlab_project_id: i64, name: &str, url: &str) -> Project {
        let now = Utc::now();
        let project = Project {
            id: self.allocate_id(),
            gitlab_project_id,
            name: name.to_string(),
            url: url.to_string(),
            description: None,
            gitlab_webhook_id: None,
            webhook_synced: false,
            last_sync_at: None,
            created_at: now,
            updated_at: now,
        };
        self.lock().projects.insert(project.id, project.clone());
        project
    }

    /// Overwrite a project's cached hook state without counting it as a
    /// reconciliation write.
    pub fn set_webhook_state(&self, project_id: i64, state: WebhookState) {
        if let Some(project) = self.lock().projects.get_mut(&project_id) {
            project.gitlab_webhook_id = state.gitlab_webhook_id;
            project.webhook_synced = state.synced;
        }
    }

    /// Register an active destination.
    pub fn add_destination(
        &self,
        name: &str,
        url: &str,
        channel_type: &str,
        settings: Option<DestinationSettings>,
    ) -> Destination {
        let now = Utc::now();
        let destination = Destination {
            id: self.allocate_id(),
            name: name.to_string(),
            url: url.to_string(),
            description: None,
            channel_type: channel_type.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
            settings,
        };
        self.lock()
            .destinations
            .insert(destination.id, destination.clone());
        destination
    }

    /// Toggle a destination's active flag.
    pub fn set_destination_active(&self, destination_id: i64, active: bool) {
        if let Some(destination) = self.lock().destinations.get_mut(&destination_id) {
            destination.is_active = active;
        }
    }

    /// Add an association row. Calling twice creates a duplicate link.
    pub fn link(&self, project_id: i64, destination_id: i64) {
        self.lock().links.push((project_id, destination_id));
    }

    /// Register a directory user.
    pub fn add_user(&self, email: &str, gitlab_username: Option<&str>, phone: Option<&str>) -> User {
        let user = User {
            id: self.allocate_id(),
            name: None,
            email: email.to_string(),
            phone: phone.map(str::to_string),
            gitlab_username: gitlab_username.map(str::to_string),
            created_at: Utc::now(),
        };
        self.lock().users.push(user.clone());
        user
    }

    /// Snapshot of all stored notifications in insertion order.
    pub fn notifications(&self) -> Vec<NotificationRecord> {
        self.lock().notifications.clone()
    }

    /// Snapshot of one project.
    pub fn project(&self, id: i64) -> Option<Project> {
        self.lock().projects.get(&id).cloned()
    }

    /// Current quota count for a destination and period (0 if untouched).
    pub fn quota_count(&self, webhook_id: i64, period_start: DateTime<Utc>) -> i64 {
        self.quotas
            .get(&(webhook_id, period_start))
            .map(|slot| slot.count.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Number of hook-state rows written through [`ProjectStore`].
    pub fn webhook_state_writes(&self) -> i64 {
        self.state_writes.load(Ordering::SeqCst)
    }

    fn apply_state(tables: &mut Tables, update: &WebhookStateUpdate) {
        if let Some(project) = tables.projects.get_mut(&update.project_id) {
            project.apply_webhook_state(update.state, update.synced_at);
            project.updated_at = update.synced_at;
        }
    }

    fn quota_slot(
        &self,
        webhook_id: i64,
        channel: Channel,
        period_start: DateTime<Utc>,
    ) -> dashmap::mapref::one::RefMut<'_, (i64, DateTime<Utc>), QuotaSlot> {
        self.quotas
            .entry((webhook_id, period_start))
            .or_insert_with(|| QuotaSlot {
                id: self.allocate_id(),
                channel,
                count: AtomicI64::new(0),
            })
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn find_by_id(&self, id: i64) -> AppResult<Project> {
        self.project(id)
            .ok_or_else(|| AppError::not_found(format!("Project {id} not found")))
    }

    async fn find_by_gitlab_id(&self, gitlab_project_id: i64) -> AppResult<Project> {
        self.lock()
            .projects
            .values()
            .find(|p| p.gitlab_project_id == gitlab_project_id)
            .cloned()
            .ok_or_else(|| {
                AppError::not_found(format!("project not found: gitlab id {gitlab_project_id}"))
            })
    }

    async fn list(&self) -> AppResult<Vec<Project>> {
        Ok(self.lock().projects.values().cloned().collect())
    }

    async fn update_webhook_state(&self, update: &WebhookStateUpdate) -> AppResult<()> {
        Self::apply_state(&mut self.lock(), update);
        self.state_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_webhook_states(&self, updates: &[WebhookStateUpdate]) -> AppResult<()> {
        let mut tables = self.lock();
        for update in updates {
            Self::apply_state(&mut tables, update);
        }
        self.state_writes
            .fetch_add(updates.len() as i64, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl DestinationStore for MemoryStore {
    async fn find_by_id(&self, id: i64) -> AppResult<Destination> {
        self.lock()
            .destinations
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("Webhook {id} not found")))
    }

    async fn list_for_project(&self, project_id: i64) -> AppResult<Vec<Destination>> {
        let tables = self.lock();
        Ok(tables
            .links
            .iter()
            .filter(|(p, _)| *p == project_id)
            .filter_map(|(_, d)| tables.destinations.get(d).cloned())
            .collect())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_by_emails_or_usernames(
        &self,
        emails: &[String],
        usernames: &[String],
    ) -> AppResult<Vec<User>> {
        let tables = self.lock();
        let by_email = tables.users.iter().filter(|u| emails.contains(&u.email));
        let by_username = tables.users.iter().filter(|u| {
            u.gitlab_username
                .as_ref()
                .is_some_and(|name| usernames.contains(name))
        });
        Ok(by_email.chain(by_username).cloned().collect())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create(&self, notification: &NewNotification) -> AppResult<NotificationRecord> {
        let record = NotificationRecord {
            id: self.allocate_id(),
            project_id: notification.project_id,
            merge_request_id: notification.merge_request_id,
            title: notification.title.clone(),
            source_branch: notification.source_branch.clone(),
            target_branch: notification.target_branch.clone(),
            author_email: notification.author_email.clone(),
            assignee_emails: notification.assignee_emails.clone(),
            status: notification.status.clone(),
            notification_sent: notification.notification_sent,
            error_message: notification.error_message.clone(),
            created_at: Utc::now(),
        };
        self.lock().notifications.push(record.clone());
        Ok(record)
    }

    async fn list_recent(&self, limit: i64) -> AppResult<Vec<NotificationWithProject>> {
        let tables = self.lock();
        let names: HashMap<i64, &str> = tables
            .projects
            .values()
            .map(|p| (p.id, p.name.as_str()))
            .collect();

        Ok(tables
            .notifications
            .iter()
            .rev()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|record| NotificationWithProject {
                project_name: names.get(&record.project_id).map(|n| n.to_string()),
                record: record.clone(),
            })
            .collect())
    }

    async fn stats(&self, now: DateTime<Utc>) -> AppResult<NotificationStats> {
        let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let tables = self.lock();
        let mut stats = NotificationStats::default();
        for record in &tables.notifications {
            stats.total += 1;
            if record.notification_sent {
                stats.success += 1;
            } else {
                stats.failure += 1;
            }
            if record.created_at >= midnight {
                stats.today += 1;
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl DeliveryQuotaStore for MemoryStore {
    async fn find_or_create(
        &self,
        webhook_id: i64,
        channel: Channel,
        period_start: DateTime<Utc>,
    ) -> AppResult<DeliveryQuotaRecord> {
        let slot = self.quota_slot(webhook_id, channel, period_start);
        Ok(DeliveryQuotaRecord {
            id: slot.id,
            webhook_id,
            channel: slot.channel.as_str().to_string(),
            period_start,
            count: slot.count.load(Ordering::SeqCst),
        })
    }

    async fn increment(
        &self,
        webhook_id: i64,
        channel: Channel,
        period_start: DateTime<Utc>,
    ) -> AppResult<()> {
        self.quota_slot(webhook_id, channel, period_start)
            .count
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
