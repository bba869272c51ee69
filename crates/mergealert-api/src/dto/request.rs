//! Request DTOs.

use serde::{Deserialize, Serialize};

/// Default page size for notification history.
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

/// Largest page size for notification history.
pub const MAX_HISTORY_LIMIT: i64 = 500;

/// Query parameters for `GET /notifications`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryParams {
    /// Number of records (default 50, max 500).
    pub limit: Option<i64>,
}

impl HistoryParams {
    /// The requested limit, defaulted and clamped.
    pub fn effective_limit(&self) -> i64 {
        match self.limit {
            Some(limit) if limit > 0 => limit.min(MAX_HISTORY_LIMIT),
            _ => DEFAULT_HISTORY_LIMIT,
        }
    }
}
