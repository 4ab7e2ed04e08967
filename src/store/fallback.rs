//! Durable store with automatic volatile fallback.
//!
//! Every primary error is caught here, at the store boundary, and the call is
//! served from the in-memory store instead. The wrapper itself never returns
//! an error, which is what lets the gate promise that store faults do not
//! reach its callers. Fail-open applies to the store's availability only:
//! quota checks still run against whatever counters are reachable.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::store::{MemoryUsageStore, UsageStore};

pub struct FallbackUsageStore {
    primary: Arc<dyn UsageStore>,
    fallback: MemoryUsageStore,
}

impl FallbackUsageStore {
    pub fn new(primary: Arc<dyn UsageStore>) -> Self {
        Self {
            primary,
            fallback: MemoryUsageStore::new(),
        }
    }
}

#[async_trait]
impl UsageStore for FallbackUsageStore {
    async fn get_hourly_usage(&self, subject: &str, hour_key: &str) -> StoreResult<i64> {
        match self.primary.get_hourly_usage(subject, hour_key).await {
            Ok(count) => Ok(count),
            Err(err) => {
                tracing::warn!("hourly usage read fell back to volatile store: {}", err);
                self.fallback.get_hourly_usage(subject, hour_key).await
            }
        }
    }

    async fn get_daily_feature_usage(
        &self,
        subject: &str,
        date_key: &str,
        feature: &str,
    ) -> StoreResult<i64> {
        match self
            .primary
            .get_daily_feature_usage(subject, date_key, feature)
            .await
        {
            Ok(count) => Ok(count),
            Err(err) => {
                tracing::warn!("feature usage read fell back to volatile store: {}", err);
                self.fallback
                    .get_daily_feature_usage(subject, date_key, feature)
                    .await
            }
        }
    }

    async fn get_daily_total_usage(&self, subject: &str, date_key: &str) -> StoreResult<i64> {
        match self.primary.get_daily_total_usage(subject, date_key).await {
            Ok(count) => Ok(count),
            Err(err) => {
                tracing::warn!("daily usage read fell back to volatile store: {}", err);
                self.fallback.get_daily_total_usage(subject, date_key).await
            }
        }
    }

    async fn increment_hourly(
        &self,
        subject: &str,
        hour_key: &str,
        cost: i64,
    ) -> StoreResult<i64> {
        match self.primary.increment_hourly(subject, hour_key, cost).await {
            Ok(count) => Ok(count),
            Err(err) => {
                tracing::warn!("hourly increment fell back to volatile store: {}", err);
                self.fallback.increment_hourly(subject, hour_key, cost).await
            }
        }
    }

    async fn increment_feature(
        &self,
        subject: &str,
        date_key: &str,
        feature: &str,
        cost: i64,
    ) -> StoreResult<i64> {
        match self
            .primary
            .increment_feature(subject, date_key, feature, cost)
            .await
        {
            Ok(count) => Ok(count),
            Err(err) => {
                tracing::warn!("feature increment fell back to volatile store: {}", err);
                self.fallback
                    .increment_feature(subject, date_key, feature, cost)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    /// Primary that fails every call, simulating a dead database.
    struct DeadStore;

    #[async_trait]
    impl UsageStore for DeadStore {
        async fn get_hourly_usage(&self, _: &str, _: &str) -> StoreResult<i64> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn get_daily_feature_usage(&self, _: &str, _: &str, _: &str) -> StoreResult<i64> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn get_daily_total_usage(&self, _: &str, _: &str) -> StoreResult<i64> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn increment_hourly(&self, _: &str, _: &str, _: i64) -> StoreResult<i64> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn increment_feature(&self, _: &str, _: &str, _: &str, _: i64) -> StoreResult<i64> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("quota_gate=debug")
            .try_init();
    }

    #[tokio::test]
    async fn dead_primary_never_surfaces_errors() {
        init_tracing();
        let store = FallbackUsageStore::new(Arc::new(DeadStore));

        assert_eq!(store.get_hourly_usage("alice", "2026080513").await.unwrap(), 0);
        assert_eq!(store.increment_hourly("alice", "2026080513", 1).await.unwrap(), 1);
        assert_eq!(
            store
                .increment_feature("alice", "20260805", "report_export", 1)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn volatile_counters_stay_consistent_during_outage() {
        init_tracing();
        let store = FallbackUsageStore::new(Arc::new(DeadStore));

        for _ in 0..5 {
            store.increment_hourly("alice", "2026080513", 1).await.unwrap();
            store
                .increment_feature("alice", "20260805", "report_export", 1)
                .await
                .unwrap();
        }

        assert_eq!(store.get_hourly_usage("alice", "2026080513").await.unwrap(), 5);
        assert_eq!(
            store
                .get_daily_feature_usage("alice", "20260805", "report_export")
                .await
                .unwrap(),
            5
        );
        assert_eq!(store.get_daily_total_usage("alice", "20260805").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn healthy_primary_is_preferred() {
        let primary = Arc::new(MemoryUsageStore::new());
        primary.increment_hourly("alice", "2026080513", 3).await.unwrap();

        let store = FallbackUsageStore::new(primary.clone());
        assert_eq!(store.get_hourly_usage("alice", "2026080513").await.unwrap(), 3);

        store.increment_hourly("alice", "2026080513", 1).await.unwrap();
        assert_eq!(primary.get_hourly_usage("alice", "2026080513").await.unwrap(), 4);
    }
}
