//! Project repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use mergealert_core::error::{AppError, ErrorKind};
use mergealert_core::result::AppResult;
use mergealert_entity::project::{Project, WebhookStateUpdate};

use crate::store::ProjectStore;

const PROJECT_COLUMNS: &str = "id, gitlab_project_id, name, url, description, gitlab_webhook_id, \
     webhook_synced, last_sync_at, created_at, updated_at";

/// Repository for project rows.
#[derive(Debug, Clone)]
pub struct ProjectRepository {
    pool: PgPool,
}

impl ProjectRepository {
    /// Create a new project repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectStore for ProjectRepository {
    async fn find_by_id(&self, id: i64) -> AppResult<Project> {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find project", e))?
        .ok_or_else(|| AppError::not_found(format!("Project {id} not found")))
    }

    async fn find_by_gitlab_id(&self, gitlab_project_id: i64) -> AppResult<Project> {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE gitlab_project_id = $1"
        ))
        .bind(gitlab_project_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find project", e))?
        .ok_or_else(|| {
            AppError::not_found(format!("project not found: gitlab id {gitlab_project_id}"))
        })
    }

    async fn list(&self) -> AppResult<Vec<Project>> {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list projects", e))
    }

    async fn update_webhook_state(&self, update: &WebhookStateUpdate) -> AppResult<()> {
        sqlx::query(
            "UPDATE projects SET gitlab_webhook_id = $2, webhook_synced = $3, last_sync_at = $4, \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(update.project_id)
        .bind(update.state.gitlab_webhook_id)
        .bind(update.state.synced)
        .bind(update.synced_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to update webhook state", e)
        })?;
        Ok(())
    }

    async fn update_webhook_states(&self, updates: &[WebhookStateUpdate]) -> AppResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e))?;

        for update in updates {
            sqlx::query(
                "UPDATE projects SET gitlab_webhook_id = $2, webhook_synced = $3, last_sync_at = $4, \
                 updated_at = NOW() WHERE id = $1",
            )
            .bind(update.project_id)
            .bind(update.state.gitlab_webhook_id)
            .bind(update.state.synced)
            .bind(update.synced_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to update webhook state", e)
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to commit webhook states", e))
    }
}
