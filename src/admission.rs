//! The admit/deny decision.

use crate::error::{Denial, DenyReason};
use crate::snapshot::UsageSnapshot;

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(Denial),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Evaluates the four gates against a snapshot.
///
/// Pure over its input: checking the same snapshot twice yields the same
/// decision, and checking never increments anything. The first failing gate
/// wins so the caller gets one specific, actionable reason.
pub struct AdmissionController;

impl AdmissionController {
    pub fn check(snapshot: &UsageSnapshot) -> Decision {
        // Plan gate first: it is categorical, so quota state must not mask it.
        if let Some(min_rank) = snapshot.min_rank {
            if snapshot.plan_rank < min_rank {
                return Self::deny(
                    snapshot,
                    DenyReason::PlanUpgradeRequired,
                    Some(min_rank as i64),
                    snapshot.plan_rank as i64,
                );
            }
        }

        if snapshot.hourly_remaining <= 0 {
            return Self::deny(
                snapshot,
                DenyReason::HourlyQuotaExceeded,
                Some(snapshot.hourly_quota),
                snapshot.hourly_usage,
            );
        }

        if snapshot.daily_remaining <= 0 {
            return Self::deny(
                snapshot,
                DenyReason::DailyCapExceeded,
                Some(snapshot.daily_cap),
                snapshot.daily_usage,
            );
        }

        if let Some(limit) = snapshot.feature_limit {
            if snapshot.feature_usage >= limit {
                return Self::deny(
                    snapshot,
                    DenyReason::FeatureDailyLimitExceeded,
                    Some(limit),
                    snapshot.feature_usage,
                );
            }
        }

        Decision::Allow
    }

    fn deny(
        snapshot: &UsageSnapshot,
        reason: DenyReason,
        limit: Option<i64>,
        used: i64,
    ) -> Decision {
        Decision::Deny(Denial {
            reason,
            feature: snapshot.feature.clone(),
            plan: snapshot.plan.clone(),
            limit,
            used,
        })
    }
}
