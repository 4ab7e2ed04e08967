//! The wrapping layer around protected operations.
//!
//! One invocation walks: resolve identity (the caller hands in a
//! subject/plan pair) → check admission → on denial, return the structured
//! denial with no side effects → otherwise run the operation exactly once,
//! record its cost, and attach usage telemetry to the result.

use std::future::Future;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::admission::{AdmissionController, Decision};
use crate::config::QuotaConfig;
use crate::error::Denial;
use crate::policy::QuotaPolicy;
use crate::snapshot::UsageSnapshot;
use crate::store::{FallbackUsageStore, MemoryUsageStore, PostgresUsageStore, UsageStore};

/// Input contract for one gated invocation.
#[derive(Debug, Clone)]
pub struct GateRequest {
    pub subject: String,
    pub plan: String,
    pub feature: String,
    /// Units the operation consumes; clamped to at least 1.
    pub cost: i64,
}

impl GateRequest {
    pub fn new(
        subject: impl Into<String>,
        plan: impl Into<String>,
        feature: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            plan: plan.into(),
            feature: feature.into(),
            cost: 1,
        }
    }

    pub fn with_cost(mut self, cost: i64) -> Self {
        self.cost = cost;
        self
    }
}

/// Usage counters attached to an admitted call, for observability by the
/// caller; metadata, not consumed data.
#[derive(Debug, Clone, Serialize)]
pub struct UsageTelemetry {
    pub feature_usage: i64,
    pub feature_limit: Option<i64>,
    pub hourly_usage: i64,
    pub hourly_quota: i64,
    pub daily_usage: i64,
    pub daily_cap: i64,
}

impl UsageTelemetry {
    /// Header form for callers embedding the gate in an HTTP layer.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        insert_count(&mut headers, "x-usage-hourly", self.hourly_usage);
        insert_count(&mut headers, "x-quota-hourly", self.hourly_quota);
        insert_count(&mut headers, "x-usage-daily", self.daily_usage);
        insert_count(&mut headers, "x-cap-daily", self.daily_cap);
        insert_count(&mut headers, "x-usage-feature", self.feature_usage);
        if let Some(limit) = self.feature_limit {
            insert_count(&mut headers, "x-limit-feature", limit);
        }
        headers
    }
}

fn insert_count(headers: &mut HeaderMap, name: &'static str, value: i64) {
    if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

/// An admitted call: the operation's own output plus usage telemetry.
#[derive(Debug)]
pub struct Admitted<T> {
    pub output: T,
    pub usage: UsageTelemetry,
}

/// Wraps protected operations with quota admission and usage recording.
///
/// Stateless per invocation; safe under concurrent calls for the same
/// subject because all counter mutation goes through the store's atomic
/// increments.
pub struct FeatureGate {
    policy: Arc<QuotaPolicy>,
    store: Arc<dyn UsageStore>,
}

impl FeatureGate {
    pub fn new(policy: Arc<QuotaPolicy>, store: Arc<dyn UsageStore>) -> Self {
        Self { policy, store }
    }

    /// Wires the gate from configuration: a durable Postgres store with
    /// volatile fallback when a database is configured, volatile only
    /// otherwise.
    pub async fn from_config(config: &QuotaConfig) -> anyhow::Result<Self> {
        let policy = Arc::new(config.policy()?);
        let store: Arc<dyn UsageStore> = match &config.database_url {
            Some(url) => {
                let durable =
                    PostgresUsageStore::connect(url, config.database_max_connections).await?;
                durable.run_migrations().await?;
                Arc::new(FallbackUsageStore::new(Arc::new(durable)))
            }
            None => {
                tracing::warn!("no database configured; usage counters are volatile");
                Arc::new(MemoryUsageStore::new())
            }
        };
        Ok(Self::new(policy, store))
    }

    /// Side-effect-free admission check. Checking twice without an
    /// intervening admitted call returns the same decision.
    pub async fn preview(&self, subject: &str, plan: &str, feature: &str) -> Decision {
        self.preview_at(subject, plan, feature, Utc::now()).await
    }

    async fn preview_at(
        &self,
        subject: &str,
        plan: &str,
        feature: &str,
        now: DateTime<Utc>,
    ) -> Decision {
        let snapshot = UsageSnapshot::build(
            self.store.as_ref(),
            &self.policy,
            subject,
            plan,
            feature,
            now,
        )
        .await;
        AdmissionController::check(&snapshot)
    }

    /// Current usage and limits for a subject, for status endpoints.
    /// No side effects.
    pub async fn usage_status(&self, subject: &str, plan: &str, feature: &str) -> UsageSnapshot {
        UsageSnapshot::build(
            self.store.as_ref(),
            &self.policy,
            subject,
            plan,
            feature,
            Utc::now(),
        )
        .await
    }

    /// Runs `operation` if the subject is admitted.
    ///
    /// On denial no counter is touched and the operation does not run. On
    /// admission the operation runs exactly once and its cost is recorded
    /// afterwards, whether or not the operation's own output is a success:
    /// an admitted-but-failed call still consumes quota, so retry storms are
    /// not free. A recording failure is logged and never fails the call.
    pub async fn invoke<F, Fut, T>(
        &self,
        request: GateRequest,
        operation: F,
    ) -> Result<Admitted<T>, Denial>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.invoke_at(request, Utc::now(), operation).await
    }

    async fn invoke_at<F, Fut, T>(
        &self,
        request: GateRequest,
        now: DateTime<Utc>,
        operation: F,
    ) -> Result<Admitted<T>, Denial>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let cost = request.cost.max(1);
        let snapshot = UsageSnapshot::build(
            self.store.as_ref(),
            &self.policy,
            &request.subject,
            &request.plan,
            &request.feature,
            now,
        )
        .await;

        if let Decision::Deny(denial) = AdmissionController::check(&snapshot) {
            return Err(denial);
        }

        let output = operation().await;

        let hourly_usage = match self
            .store
            .increment_hourly(&request.subject, &snapshot.hour_key, cost)
            .await
        {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(
                    "hourly usage recording failed for {}: {}",
                    request.subject,
                    err
                );
                snapshot.hourly_usage + cost
            }
        };

        let feature_usage = match self
            .store
            .increment_feature(&request.subject, &snapshot.date_key, &request.feature, cost)
            .await
        {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(
                    "feature usage recording failed for {}: {}",
                    request.subject,
                    err
                );
                snapshot.feature_usage + cost
            }
        };

        Ok(Admitted {
            output,
            usage: UsageTelemetry {
                feature_usage,
                feature_limit: snapshot.feature_limit,
                hourly_usage,
                hourly_quota: snapshot.hourly_quota,
                daily_usage: snapshot.daily_usage + cost,
                daily_cap: snapshot.daily_cap,
            },
        })
    }
}
