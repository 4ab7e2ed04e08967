use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Why an admission check refused the call.
///
/// The plan gate is categorical: it never clears by waiting. The three rate
/// reasons clear at the next hour or day rollover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    PlanUpgradeRequired,
    HourlyQuotaExceeded,
    DailyCapExceeded,
    FeatureDailyLimitExceeded,
}

impl DenyReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::PlanUpgradeRequired => "PLAN_UPGRADE_REQUIRED",
            DenyReason::HourlyQuotaExceeded => "HOURLY_QUOTA_EXCEEDED",
            DenyReason::DailyCapExceeded => "DAILY_CAP_EXCEEDED",
            DenyReason::FeatureDailyLimitExceeded => "FEATURE_DAILY_LIMIT_EXCEEDED",
        }
    }

    /// 403 for plan gating, 429 for every rate condition. Callers embedding
    /// the gate in an HTTP layer should preserve this distinction.
    pub fn status(&self) -> StatusCode {
        match self {
            DenyReason::PlanUpgradeRequired => StatusCode::FORBIDDEN,
            DenyReason::HourlyQuotaExceeded
            | DenyReason::DailyCapExceeded
            | DenyReason::FeatureDailyLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Whether waiting for a window rollover can clear the condition.
    pub fn retryable(&self) -> bool {
        !matches!(self, DenyReason::PlanUpgradeRequired)
    }

    fn message(&self) -> &'static str {
        match self {
            DenyReason::PlanUpgradeRequired => "This feature requires a higher plan.",
            DenyReason::HourlyQuotaExceeded => {
                "Hourly quota exceeded. Please try again next hour."
            }
            DenyReason::DailyCapExceeded => "Daily cap reached. Please try again tomorrow.",
            DenyReason::FeatureDailyLimitExceeded => {
                "Daily limit for this feature reached. Please try again tomorrow."
            }
        }
    }
}

/// Structured denial returned by the gate.
///
/// A denial is an expected, first-class outcome carried in the `Err` arm so
/// callers can branch on it; it is never raised as a panic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{feature} denied for plan {plan}: {reason:?} (used {used})")]
pub struct Denial {
    pub reason: DenyReason,
    pub feature: String,
    pub plan: String,
    /// The limit the failing gate compared against. For the plan gate this
    /// is the required rank rather than a counter.
    pub limit: Option<i64>,
    pub used: i64,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        let status = self.reason.status();
        let body = Json(ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: self.reason.code().to_string(),
                message: self.reason.message().to_string(),
                details: Some(serde_json::json!({
                    "feature": self.feature,
                    "plan": self.plan,
                    "limit": self.limit,
                    "used": self.used,
                })),
            },
        });
        (status, body).into_response()
    }
}

/// Counter-store fault. Internal only: the fallback layer consumes these and
/// the gate never surfaces them to its callers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_denial(reason: DenyReason) -> Denial {
        Denial {
            reason,
            feature: "report_export".to_string(),
            plan: "free".to_string(),
            limit: Some(3),
            used: 3,
        }
    }

    #[test]
    fn plan_gate_maps_to_forbidden() {
        assert_eq!(
            DenyReason::PlanUpgradeRequired.status(),
            StatusCode::FORBIDDEN
        );
        assert!(!DenyReason::PlanUpgradeRequired.retryable());
    }

    #[test]
    fn rate_conditions_map_to_too_many_requests() {
        for reason in [
            DenyReason::HourlyQuotaExceeded,
            DenyReason::DailyCapExceeded,
            DenyReason::FeatureDailyLimitExceeded,
        ] {
            assert_eq!(reason.status(), StatusCode::TOO_MANY_REQUESTS);
            assert!(reason.retryable());
        }
    }

    #[test]
    fn denial_response_preserves_the_status_split() {
        let rate = sample_denial(DenyReason::FeatureDailyLimitExceeded).into_response();
        assert_eq!(rate.status(), StatusCode::TOO_MANY_REQUESTS);

        let plan = sample_denial(DenyReason::PlanUpgradeRequired).into_response();
        assert_eq!(plan.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn denial_serializes_with_snake_case_reason() {
        let value =
            serde_json::to_value(sample_denial(DenyReason::HourlyQuotaExceeded)).unwrap();
        assert_eq!(value["reason"], "hourly_quota_exceeded");
        assert_eq!(value["used"], 3);
    }
}
