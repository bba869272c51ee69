//! Application state shared across all handlers and middleware.

use std::sync::Arc;
use std::time::Duration;

use mergealert_core::config::AppConfig;
use mergealert_core::error::AppError;
use mergealert_core::result::AppResult;
use mergealert_core::traits::TokenDecryptor;
use mergealert_database::connection::DatabasePool;
use mergealert_database::repositories::{
    DeliveryQuotaRepository, DestinationRepository, NotificationRepository, ProjectRepository,
    UserRepository,
};
use mergealert_database::store::{
    DeliveryQuotaStore, DestinationStore, NotificationStore, ProjectStore, UserDirectory,
};
use mergealert_gitlab::{GitLabApi, WebhookReconciler, webhook_callback_url};
use mergealert_notify::{DispatchEngine, SenderRouter};

/// The storage backends behind the API.
#[derive(Debug, Clone)]
pub struct Stores {
    /// Projects and their cached hook state.
    pub projects: Arc<dyn ProjectStore>,
    /// Chat destinations.
    pub destinations: Arc<dyn DestinationStore>,
    /// Mention directory.
    pub users: Arc<dyn UserDirectory>,
    /// Dispatch history.
    pub notifications: Arc<dyn NotificationStore>,
    /// Monthly delivery counters.
    pub quotas: Arc<dyn DeliveryQuotaStore>,
}

impl Stores {
    /// PostgreSQL repositories sharing one pool.
    pub fn postgres(pool: &DatabasePool) -> Self {
        let pg = pool.pool();
        Self {
            projects: Arc::new(ProjectRepository::new(pg.clone())),
            destinations: Arc::new(DestinationRepository::new(pg.clone())),
            users: Arc::new(UserRepository::new(pg.clone())),
            notifications: Arc::new(NotificationRepository::new(pg.clone())),
            quotas: Arc::new(DeliveryQuotaRepository::new(pg.clone())),
        }
    }
}

/// Application state passed to every Axum handler via `State<AppState>`.
///
/// All fields are `Arc`-wrapped or cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    // ── Configuration ────────────────────────────────────────
    /// Application configuration
    pub config: Arc<AppConfig>,

    // ── Infrastructure ───────────────────────────────────────
    /// PostgreSQL pool behind `stores`, if any; health reports on it
    pub db_pool: Option<DatabasePool>,
    /// Storage backends
    pub stores: Stores,

    // ── Engines ──────────────────────────────────────────────
    /// Merge-request dispatch
    pub dispatcher: Arc<DispatchEngine>,
    /// GitLab hook reconciliation
    pub reconciler: Arc<WebhookReconciler>,
    /// Turns the configured GitLab token into plaintext
    pub token_decryptor: Arc<dyn TokenDecryptor>,
}

impl AppState {
    /// Wire the dispatch engine and reconciler over `stores`.
    pub fn new(
        config: AppConfig,
        stores: Stores,
        gitlab: Arc<dyn GitLabApi>,
        token_decryptor: Arc<dyn TokenDecryptor>,
        db_pool: Option<DatabasePool>,
    ) -> Self {
        let router = SenderRouter::from_config(&config.notification, Arc::clone(&stores.quotas));
        let dispatcher = DispatchEngine::new(
            Arc::clone(&stores.projects),
            Arc::clone(&stores.destinations),
            Arc::clone(&stores.users),
            Arc::clone(&stores.notifications),
            router,
        );

        let callback_url = webhook_callback_url(&config.server.public_webhook_url);
        tracing::info!(callback_url = %callback_url, "GitLab hook callback URL");
        let reconciler = WebhookReconciler::new(
            gitlab,
            Arc::clone(&stores.projects),
            callback_url,
            Duration::from_secs(config.gitlab.request_timeout_seconds),
        );

        Self {
            config: Arc::new(config),
            db_pool,
            stores,
            dispatcher: Arc::new(dispatcher),
            reconciler: Arc::new(reconciler),
            token_decryptor,
        }
    }

    /// The plaintext GitLab token, or a validation error when none is
    /// configured.
    pub fn gitlab_token(&self) -> AppResult<String> {
        let stored = self
            .config
            .gitlab
            .access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::validation("GitLab access token is not configured"))?;

        self.token_decryptor.decrypt(stored)
    }
}
