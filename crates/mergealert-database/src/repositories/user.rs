//! User directory repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use mergealert_core::error::{AppError, ErrorKind};
use mergealert_core::result::AppResult;
use mergealert_entity::user::User;

use crate::store::UserDirectory;

/// Repository for directory users.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn find_by_emails_or_usernames(
        &self,
        emails: &[String],
        usernames: &[String],
    ) -> AppResult<Vec<User>> {
        let mut users = Vec::new();

        if !emails.is_empty() {
            let by_email = sqlx::query_as::<_, User>(
                "SELECT id, name, email, phone, gitlab_username, created_at \
                 FROM users WHERE email = ANY($1) ORDER BY id",
            )
            .bind(emails)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to query users by email", e))?;
            users.extend(by_email);
        }

        if !usernames.is_empty() {
            let by_username = sqlx::query_as::<_, User>(
                "SELECT id, name, email, phone, gitlab_username, created_at \
                 FROM users WHERE gitlab_username = ANY($1) ORDER BY id",
            )
            .bind(usernames)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to query users by username", e)
            })?;
            users.extend(by_username);
        }

        Ok(users)
    }
}
