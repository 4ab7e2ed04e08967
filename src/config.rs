use std::collections::HashMap;
use std::env;

use crate::policy::{PlanLimits, PolicyTables, QuotaPolicy};

/// Runtime configuration for the quota subsystem.
///
/// The policy tables are static for the life of the process; changing them
/// requires a restart.
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// When unset, counters are volatile only.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub tables: PolicyTables,
}

impl QuotaConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let tables = match env::var("QUOTA_POLICY_JSON") {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("QUOTA_POLICY_JSON is not valid policy JSON: {}", e))?,
            Err(_) => default_tables(),
        };

        Ok(QuotaConfig {
            database_url: env::var("DATABASE_URL").ok(),
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,
            tables,
        })
    }

    /// Checks the invariants a broken deployment would otherwise hit at
    /// request time.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be > 0");
        }
        if self.database_url.is_none() {
            tracing::warn!("DATABASE_URL not set; usage counters will not survive a restart");
        }
        // Table validation lives in the policy constructor; run it here so a
        // bad table fails at startup.
        QuotaPolicy::new(self.tables.clone())?;
        Ok(())
    }

    pub fn policy(&self) -> anyhow::Result<QuotaPolicy> {
        QuotaPolicy::new(self.tables.clone())
    }
}

/// Built-in plan tiers, used when no policy override is supplied.
fn default_tables() -> PolicyTables {
    let mut plans = HashMap::new();
    plans.insert(
        "free".to_string(),
        PlanLimits {
            rank: 0,
            hourly_quota: 30,
            daily_cap: 100,
            feature_daily_limits: HashMap::from([
                ("report_export".to_string(), 3),
                ("screener_scan".to_string(), 20),
            ]),
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
                ("screener_scan".to_string(), 100),
                ("ai_insights".to_string(), 25),
            ]),
        },
    );
    plans.insert(
        "pro".to_string(),
        PlanLimits {
            rank: 2,
            hourly_quota: 600,
            daily_cap: 2_000,
            feature_daily_limits: HashMap::from([
                ("report_export".to_string(), 200),
                ("ai_insights".to_string(), 150),
            ]),
        },
    );
    plans.insert(
        "institutional".to_string(),
        PlanLimits {
            rank: 3,
            hourly_quota: 3_000,
            daily_cap: 12_000,
            feature_daily_limits: HashMap::new(),
        },
    );

    PolicyTables {
        plans,
        feature_min_ranks: HashMap::from([
            ("ai_insights".to_string(), 1),
            ("bulk_api".to_string(), 2),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tables_pass_policy_validation() {
        let policy = QuotaPolicy::new(default_tables()).unwrap();
        assert_eq!(policy.rank("institutional"), 3);
        assert_eq!(policy.resolve("retail", "report_export").feature_daily_limit, Some(20));
        assert_eq!(policy.resolve("free", "ai_insights").min_rank, Some(1));
    }

    #[test]
    fn validate_rejects_zero_connections() {
        let config = QuotaConfig {
            database_url: Some("postgres://localhost/usage".to_string()),
            database_max_connections: 0,
            tables: default_tables(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_volatile_only_deployments() {
        let config = QuotaConfig {
            database_url: None,
            database_max_connections: 20,
            tables: default_tables(),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn policy_override_json_parses_into_tables() {
        let raw = r#"{
            "plans": {
                "starter": {"rank": 0, "hourly_quota": 5, "daily_cap": 10}
            }
        }"#;
        let tables: PolicyTables = serde_json::from_str(raw).unwrap();
        let config = QuotaConfig {
            database_url: None,
            database_max_connections: 20,
            tables,
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.policy().unwrap().resolve("starter", "anything").hourly_quota, 5);
    }
}
