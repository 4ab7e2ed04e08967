//! Point-in-time view of a subject's usage against its plan limits.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreResult;
use crate::policy::QuotaPolicy;
use crate::store::UsageStore;
use crate::window;

/// Built fresh for every admission check and never cached across calls:
/// both the plan and the wall clock may have changed since the last one.
/// Building a snapshot reads counters only; it never increments anything.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSnapshot {
    pub subject: String,
    pub plan: String,
    pub feature: String,
    pub hour_key: String,
    pub date_key: String,
    pub hourly_usage: i64,
    pub hourly_quota: i64,
    pub hourly_remaining: i64,
    pub daily_usage: i64,
    pub daily_cap: i64,
    pub daily_remaining: i64,
    pub feature_usage: i64,
    /// `None` when the feature has no daily limit of its own.
    pub feature_limit: Option<i64>,
    pub plan_rank: u8,
    /// Minimum rank the feature demands, when it is plan-gated.
    pub min_rank: Option<u8>,
}

impl UsageSnapshot {
    pub async fn build(
        store: &dyn UsageStore,
        policy: &QuotaPolicy,
        subject: &str,
        plan: &str,
        feature: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let hour_key = window::hour_key(now);
        let date_key = window::date_key(now);
        let entry = policy.resolve(plan, feature);

        let hourly_usage = read_or_zero(store.get_hourly_usage(subject, &hour_key).await, "hourly");
        let daily_usage = read_or_zero(
            store.get_daily_total_usage(subject, &date_key).await,
            "daily",
        );
        let feature_usage = read_or_zero(
            store
                .get_daily_feature_usage(subject, &date_key, feature)
                .await,
            "feature",
        );

        UsageSnapshot {
            subject: subject.to_string(),
            plan: plan.to_string(),
            feature: feature.to_string(),
            hour_key,
            date_key,
            hourly_usage,
            hourly_quota: entry.hourly_quota,
            hourly_remaining: (entry.hourly_quota - hourly_usage).max(0),
            daily_usage,
            daily_cap: entry.daily_cap,
            daily_remaining: (entry.daily_cap - daily_usage).max(0),
            feature_usage,
            feature_limit: entry.feature_daily_limit,
            plan_rank: policy.rank(plan),
            min_rank: entry.min_rank,
        }
    }
}

// A read that fails on a store without fallback degrades to zero usage: the
// check still runs, and the failure is visible in the log rather than in the
// caller's response.
fn read_or_zero(result: StoreResult<i64>, what: &str) -> i64 {
    match result {
        Ok(count) => count,
        Err(err) => {
            tracing::warn!("{} usage read failed, assuming zero: {}", what, err);
            0
        }
    }
}
