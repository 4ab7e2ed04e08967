//! Volatile in-memory counter store.
//!
//! Serves two roles: the storage backend for deployments without a database,
//! and the automatic fallback target when the durable store errors. Counters
//! do not survive a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StoreResult;
use crate::store::UsageStore;

#[derive(Default)]
struct Counters {
    hourly: HashMap<(String, String), i64>,
    feature: HashMap<(String, String, String), i64>,
}

/// One lock guards both maps; the write lock covers first-insert map growth
/// as well as the add itself, so a brand-new key cannot race with another
/// increment on the same key.
#[derive(Default)]
pub struct MemoryUsageStore {
    counters: RwLock<Counters>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn get_hourly_usage(&self, subject: &str, hour_key: &str) -> StoreResult<i64> {
        let counters = self.counters.read();
        Ok(counters
            .hourly
            .get(&(subject.to_string(), hour_key.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn get_daily_feature_usage(
        &self,
        subject: &str,
        date_key: &str,
        feature: &str,
    ) -> StoreResult<i64> {
        let counters = self.counters.read();
        Ok(counters
            .feature
            .get(&(
                subject.to_string(),
                date_key.to_string(),
                feature.to_string(),
            ))
            .copied()
            .unwrap_or(0))
    }

    async fn get_daily_total_usage(&self, subject: &str, date_key: &str) -> StoreResult<i64> {
        let counters = self.counters.read();
        Ok(counters
            .feature
            .iter()
            .filter(|((s, d, _), _)| s == subject && d == date_key)
            .map(|(_, count)| *count)
            .sum())
    }

    async fn increment_hourly(
        &self,
        subject: &str,
        hour_key: &str,
        cost: i64,
    ) -> StoreResult<i64> {
        let mut counters = self.counters.write();
        let count = counters
            .hourly
            .entry((subject.to_string(), hour_key.to_string()))
            .or_insert(0);
        *count += cost;
        Ok(*count)
    }

    async fn increment_feature(
        &self,
        subject: &str,
        date_key: &str,
        feature: &str,
        cost: i64,
    ) -> StoreResult<i64> {
        let mut counters = self.counters.write();
        let count = counters
            .feature
            .entry((
                subject.to_string(),
                date_key.to_string(),
                feature.to_string(),
            ))
            .or_insert(0);
        *count += cost;
        Ok(*count)
    }
}
