//! Directory users used to resolve @-mention phone numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A person who can be mentioned in chat messages.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    /// Local identifier.
    pub id: i64,
    /// Display name.
    pub name: Option<String>,
    /// Email address, matched against GitLab assignee emails.
    pub email: String,
    /// Mobile number used for chat mentions.
    pub phone: Option<String>,
    /// GitLab username, matched when GitLab redacts emails.
    pub gitlab_username: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// The phone number if one is recorded.
    pub fn mention_phone(&self) -> Option<&str> {
        self.phone.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }
}
