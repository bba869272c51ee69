//! Destination repository implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use mergealert_core::error::{AppError, ErrorKind};
use mergealert_core::result::AppResult;
use mergealert_entity::destination::{Destination, DestinationSettings};

use crate::store::DestinationStore;

/// Destination row joined with its optional settings row.
#[derive(Debug, FromRow)]
struct DestinationRow {
    #[sqlx(flatten)]
    destination: Destination,
    signature_method: Option<String>,
    secret: Option<String>,
    security_keywords: Option<Json<Vec<String>>>,
    custom_headers: Option<Json<BTreeMap<String, String>>>,
}

impl DestinationRow {
    fn into_destination(self) -> Destination {
        let mut destination = self.destination;
        destination.settings = self.signature_method.map(|signature_method| DestinationSettings {
            signature_method,
            secret: self.secret,
            security_keywords: self.security_keywords.map(|k| k.0).unwrap_or_default(),
            custom_headers: self.custom_headers.map(|h| h.0).unwrap_or_default(),
        });
        destination
    }
}

const SELECT_WITH_SETTINGS: &str = "SELECT w.id, w.name, w.url, w.description, w.type, w.is_active, \
     w.created_at, w.updated_at, s.signature_method, s.secret, s.security_keywords, s.custom_headers \
     FROM webhooks w LEFT JOIN webhook_settings s ON s.webhook_id = w.id";

/// Repository for chat destinations.
#[derive(Debug, Clone)]
pub struct DestinationRepository {
    pool: PgPool,
}

impl DestinationRepository {
    /// Create a new destination repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DestinationStore for DestinationRepository {
    async fn find_by_id(&self, id: i64) -> AppResult<Destination> {
        sqlx::query_as::<_, DestinationRow>(&format!("{SELECT_WITH_SETTINGS} WHERE w.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find webhook", e))?
            .map(DestinationRow::into_destination)
            .ok_or_else(|| AppError::not_found(format!("Webhook {id} not found")))
    }

    async fn list_for_project(&self, project_id: i64) -> AppResult<Vec<Destination>> {
        let rows = sqlx::query_as::<_, DestinationRow>(
            "SELECT w.id, w.name, w.url, w.description, w.type, w.is_active, \
             w.created_at, w.updated_at, s.signature_method, s.secret, s.security_keywords, s.custom_headers \
             FROM project_webhooks pw \
             JOIN webhooks w ON w.id = pw.webhook_id \
             LEFT JOIN webhook_settings s ON s.webhook_id = w.id \
             WHERE pw.project_id = $1 ORDER BY pw.id",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to load project webhooks", e)
        })?;

        Ok(rows.into_iter().map(DestinationRow::into_destination).collect())
    }
}
