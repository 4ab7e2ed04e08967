//! Static plan/feature quota tables.
//!
//! Loaded once at process start and never mutated afterwards; changing the
//! tables requires a restart. Lookups are total: an unknown plan resolves to
//! the lowest tier's limits (unrecognized tiers get the most conservative
//! treatment, never the most permissive), and an unknown feature falls back
//! to the plan-level quota with no feature-specific limit.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Resolved limits for one (plan, feature) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyEntry {
    pub hourly_quota: i64,
    pub daily_cap: i64,
    /// `None` means the feature has no daily limit of its own.
    pub feature_daily_limit: Option<i64>,
    /// Minimum plan rank required to use the feature at all.
    pub min_rank: Option<u8>,
}

/// Base limits for one plan tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanLimits {
    /// Position in the tier ordering; only the rank matters for minimum-plan
    /// checks.
    pub rank: u8,
    pub hourly_quota: i64,
    pub daily_cap: i64,
    /// Daily limits for individual features on this plan. Features absent
    /// from the map have no feature-specific limit.
    #[serde(default)]
    pub feature_daily_limits: HashMap<String, i64>,
}

/// The full configuration surface: plan tiers plus the feature gating table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyTables {
    pub plans: HashMap<String, PlanLimits>,
    /// Features that are unavailable below a given plan rank.
    #[serde(default)]
    pub feature_min_ranks: HashMap<String, u8>,
}

/// Validated, immutable quota lookup.
#[derive(Debug, Clone)]
pub struct QuotaPolicy {
    tables: PolicyTables,
    /// Limits of the lowest-ranked plan, served for unknown plan names.
    floor: PlanLimits,
}

impl QuotaPolicy {
    /// Validates the tables and builds the lookup. Broken tables fail here,
    /// at configuration time, not at request time.
    pub fn new(tables: PolicyTables) -> anyhow::Result<Self> {
        let mut seen_ranks = HashSet::new();
        for (name, plan) in &tables.plans {
            if plan.hourly_quota < 0 || plan.daily_cap < 0 {
                anyhow::bail!("plan {} has a negative quota or cap", name);
            }
            for (feature, limit) in &plan.feature_daily_limits {
                if *limit < 0 {
                    anyhow::bail!("plan {} has a negative limit for {}", name, feature);
                }
            }
            if !seen_ranks.insert(plan.rank) {
                anyhow::bail!("plan rank {} is assigned to more than one plan", plan.rank);
            }
        }

        let floor = tables
            .plans
            .values()
            .min_by_key(|plan| plan.rank)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("quota policy defines no plans"))?;

        let top_rank = tables.plans.values().map(|p| p.rank).max().unwrap_or(0);
        for (feature, min_rank) in &tables.feature_min_ranks {
            if *min_rank > top_rank {
                tracing::warn!(
                    "feature {} requires rank {} but no plan reaches it",
                    feature,
                    min_rank
                );
            }
        }

        Ok(Self { tables, floor })
    }

    /// Rank of the given plan; unknown plans rank lowest.
    pub fn rank(&self, plan: &str) -> u8 {
        self.tables
            .plans
            .get(plan)
            .map(|limits| limits.rank)
            .unwrap_or(self.floor.rank)
    }

    /// Limits applying to `feature` under `plan`. Total over all inputs.
    pub fn resolve(&self, plan: &str, feature: &str) -> PolicyEntry {
        let limits = self.tables.plans.get(plan).unwrap_or(&self.floor);
        PolicyEntry {
            hourly_quota: limits.hourly_quota,
            daily_cap: limits.daily_cap,
            feature_daily_limit: limits.feature_daily_limits.get(feature).copied(),
            min_rank: self.tables.feature_min_ranks.get(feature).copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tables() -> PolicyTables {
        let mut plans = HashMap::new();
        plans.insert(
            "free".to_string(),
            PlanLimits {
                rank: 0,
                hourly_quota: 30,
                daily_cap: 100,
                feature_daily_limits: HashMap::from([("report_export".to_string(), 3)]),
            },
        );
        plans.insert(
            "retail".to_string(),
            PlanLimits {
                rank: 1,
                hourly_quota: 120,
                daily_cap: 300,
                feature_daily_limits: HashMap::from([
                    ("report_export".to_string(), 20),
                    ("ai_insights".to_string(), 25),
                ]),
            },
        );
        PolicyTables {
            plans,
            feature_min_ranks: HashMap::from([("ai_insights".to_string(), 1)]),
        }
    }

    #[test]
    fn resolve_returns_plan_and_feature_limits() {
        let policy = QuotaPolicy::new(sample_tables()).unwrap();
        let entry = policy.resolve("retail", "report_export");
        assert_eq!(entry.hourly_quota, 120);
        assert_eq!(entry.daily_cap, 300);
        assert_eq!(entry.feature_daily_limit, Some(20));
        assert_eq!(entry.min_rank, None);
    }

    #[test]
    fn unknown_feature_falls_back_to_plan_defaults() {
        let policy = QuotaPolicy::new(sample_tables()).unwrap();
        let entry = policy.resolve("retail", "portfolio_view");
        assert_eq!(entry.hourly_quota, 120);
        assert_eq!(entry.feature_daily_limit, None);
        assert_eq!(entry.min_rank, None);
    }

    #[test]
    fn unknown_plan_resolves_to_the_lowest_tier() {
        let policy = QuotaPolicy::new(sample_tables()).unwrap();
        let entry = policy.resolve("enterprise-trial", "report_export");
        assert_eq!(entry.hourly_quota, 30);
        assert_eq!(entry.daily_cap, 100);
        assert_eq!(entry.feature_daily_limit, Some(3));
        assert_eq!(policy.rank("enterprise-trial"), 0);
    }

    #[test]
    fn feature_min_rank_is_plan_independent() {
        let policy = QuotaPolicy::new(sample_tables()).unwrap();
        assert_eq!(policy.resolve("free", "ai_insights").min_rank, Some(1));
        assert_eq!(policy.resolve("retail", "ai_insights").min_rank, Some(1));
    }

    #[test]
    fn empty_tables_are_rejected() {
        let tables = PolicyTables {
            plans: HashMap::new(),
            feature_min_ranks: HashMap::new(),
        };
        assert!(QuotaPolicy::new(tables).is_err());
    }

    #[test]
    fn duplicate_ranks_are_rejected() {
        let mut tables = sample_tables();
        if let Some(plan) = tables.plans.get_mut("retail") {
            plan.rank = 0;
        }
        assert!(QuotaPolicy::new(tables).is_err());
    }

    #[test]
    fn negative_limits_are_rejected() {
        let mut tables = sample_tables();
        if let Some(plan) = tables.plans.get_mut("free") {
            plan.hourly_quota = -1;
        }
        assert!(QuotaPolicy::new(tables).is_err());
    }

    #[test]
    fn tables_round_trip_through_json() {
        let raw = r#"{
            "plans": {
                "free": {"rank": 0, "hourly_quota": 10, "daily_cap": 50},
                "pro": {
                    "rank": 1,
                    "hourly_quota": 100,
                    "daily_cap": 500,
                    "feature_daily_limits": {"report_export": 40}
                }
            },
            "feature_min_ranks": {"bulk_api": 1}
        }"#;
        let tables: PolicyTables = serde_json::from_str(raw).unwrap();
        let policy = QuotaPolicy::new(tables).unwrap();
        assert_eq!(policy.resolve("pro", "report_export").feature_daily_limit, Some(40));
        assert_eq!(policy.resolve("free", "bulk_api").min_rank, Some(1));
    }
}
