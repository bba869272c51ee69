//! Per-destination monthly delivery counters.

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Successful sends for one destination in one calendar month.
///
/// Created lazily at zero, only ever incremented.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeliveryQuotaRecord {
    /// Local identifier.
    pub id: i64,
    /// Destination id.
    pub webhook_id: i64,
    /// Channel name (`dingtalk`).
    pub channel: String,
    /// First instant of the month (UTC).
    pub period_start: DateTime<Utc>,
    /// Successful sends so far.
    pub count: i64,
}

/// First instant of the calendar month containing `now`, in UTC.
pub fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let date = now.date_naive();
    let first = date.with_day(1).unwrap_or(date);
    first.and_time(NaiveTime::MIN).and_utc()
}
