use crate::models::subscription::{Plan, SubscriptionContext};

/// Capabilities gated behind a minimum plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    SingleJob,
    BatchJobs,
}

impl Feature {
    pub fn minimum_plan(self) -> Plan {
        match self {
            Feature::SingleJob => Plan::Free,
            Feature::BatchJobs => Plan::Professional,
        }
    }
}

/// Outcome of a quota check. Denial is an ordinary result, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    Denied(String),
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed)
    }
}

/// Decide whether `ctx` may start `requested` new jobs using `feature`.
///
/// Plan and usage are checked independently; the plan check comes first.
/// The check has no side effects. Usage is recorded by the caller.
pub fn check_allowed(ctx: &SubscriptionContext, feature: Feature, requested: u32) -> QuotaDecision {
    let required = feature.minimum_plan();
    if ctx.plan.rank() < required.rank() {
        return QuotaDecision::Denied(format!("feature requires plan {required}"));
    }

    if let Some(limit) = ctx.period_download_limit {
        let projected = u64::from(ctx.period_download_count) + u64::from(requested);
        if projected > u64::from(limit) {
            return QuotaDecision::Denied("quota exceeded".to_string());
        }
    }

    QuotaDecision::Allowed
}
