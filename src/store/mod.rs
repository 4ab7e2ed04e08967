//! Counter persistence.
//!
//! All mutation of usage counters goes through [`UsageStore::increment_hourly`]
//! and [`UsageStore::increment_feature`]; no caller ever reads a counter and
//! writes it back. Both implementations make an increment an atomic
//! add-or-create, so concurrent increments on one key are all reflected and
//! the final count equals the sum of the admitted costs.

mod fallback;
mod memory;
mod postgres;

pub use fallback::FallbackUsageStore;
pub use memory::MemoryUsageStore;
pub use postgres::PostgresUsageStore;

use async_trait::async_trait;

use crate::error::StoreResult;

#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Requests counted against `subject` in the given hour bucket.
    async fn get_hourly_usage(&self, subject: &str, hour_key: &str) -> StoreResult<i64>;

    /// Requests counted against `subject` for one feature in the given day.
    async fn get_daily_feature_usage(
        &self,
        subject: &str,
        date_key: &str,
        feature: &str,
    ) -> StoreResult<i64>;

    /// Sum across all features for `subject` in the given day.
    async fn get_daily_total_usage(&self, subject: &str, date_key: &str) -> StoreResult<i64>;

    /// Atomically adds `cost`, creating the counter at `cost` when absent.
    /// Returns the new count.
    async fn increment_hourly(
        &self,
        subject: &str,
        hour_key: &str,
        cost: i64,
    ) -> StoreResult<i64>;

    /// Atomically adds `cost` to the feature's daily counter. Returns the
    /// new count.
    async fn increment_feature(
        &self,
        subject: &str,
        date_key: &str,
        feature: &str,
        cost: i64,
    ) -> StoreResult<i64>;
}
