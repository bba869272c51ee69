//! Monthly per-destination delivery caps.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use mergealert_core::result::AppResult;
use mergealert_database::store::DeliveryQuotaStore;
use mergealert_entity::delivery::start_of_month;
use mergealert_entity::destination::{Channel, Destination};

/// Tracks successful sends per destination per calendar month.
///
/// A quota of `0` disables the cap; counts are still recorded so the
/// history is there if a cap is configured later.
#[derive(Debug, Clone)]
pub struct QuotaTracker {
    store: Arc<dyn DeliveryQuotaStore>,
    monthly_quota: i64,
    channel: Channel,
}

impl QuotaTracker {
    /// Create a tracker for `channel` destinations.
    pub fn new(store: Arc<dyn DeliveryQuotaStore>, monthly_quota: u32, channel: Channel) -> Self {
        Self {
            store,
            monthly_quota: i64::from(monthly_quota),
            channel,
        }
    }

    /// Whether a cap is configured.
    pub fn is_enabled(&self) -> bool {
        self.monthly_quota > 0
    }

    /// Configured monthly cap.
    pub fn monthly_quota(&self) -> i64 {
        self.monthly_quota
    }

    /// Whether the destination has used up this month's quota.
    ///
    /// Returns the flag together with the current count.
    pub async fn is_exceeded(&self, destination: &Destination) -> AppResult<(bool, i64)> {
        self.is_exceeded_at(destination, Utc::now()).await
    }

    /// [`Self::is_exceeded`] evaluated at `now`.
    pub async fn is_exceeded_at(
        &self,
        destination: &Destination,
        now: DateTime<Utc>,
    ) -> AppResult<(bool, i64)> {
        if !self.is_enabled() {
            return Ok((false, 0));
        }

        let record = self
            .store
            .find_or_create(destination.id, self.channel, start_of_month(now))
            .await?;
        Ok((record.count >= self.monthly_quota, record.count))
    }

    /// Record one successful send.
    pub async fn increment(&self, destination: &Destination) -> AppResult<()> {
        self.increment_at(destination, Utc::now()).await
    }

    /// [`Self::increment`] attributed to the month containing `now`.
    pub async fn increment_at(&self, destination: &Destination, now: DateTime<Utc>) -> AppResult<()> {
        self.store
            .increment(destination.id, self.channel, start_of_month(now))
            .await
    }
}
