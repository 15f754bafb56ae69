use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Subscription tier, resolved by the billing side and read here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Plan {
    Free,
    Starter,
    Professional,
    Enterprise,
}

struct PlanTier {
    plan: Plan,
    rank: u8,
    download_limit: Option<u32>,
}

/// Static tier table. Ranks are explicit so feature gating never depends on
/// enum declaration order.
const PLAN_TIERS: &[PlanTier] = &[
    PlanTier { plan: Plan::Free, rank: 0, download_limit: Some(5) },
    PlanTier { plan: Plan::Starter, rank: 1, download_limit: Some(50) },
    PlanTier { plan: Plan::Professional, rank: 2, download_limit: Some(500) },
    PlanTier { plan: Plan::Enterprise, rank: 3, download_limit: None },
];

impl Plan {
    fn tier(self) -> &'static PlanTier {
        PLAN_TIERS
            .iter()
            .find(|t| t.plan == self)
            .unwrap_or(&PLAN_TIERS[0])
    }

    pub fn rank(self) -> u8 {
        self.tier().rank
    }

    /// Default per-period download allowance; `None` is unlimited.
    pub fn default_download_limit(self) -> Option<u32> {
        self.tier().download_limit
    }
}

/// What the quota gate needs to know about a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionContext {
    pub user_id: String,
    pub plan: Plan,
    pub period_download_count: u32,
    /// `None` means unlimited.
    pub period_download_limit: Option<u32>,
}

impl SubscriptionContext {
    /// Fresh context on `plan` with that plan's default limit.
    pub fn new(user_id: impl Into<String>, plan: Plan) -> Self {
        Self {
            user_id: user_id.into(),
            plan,
            period_download_count: 0,
            period_download_limit: plan.default_download_limit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranks_are_strictly_increasing() {
        assert!(Plan::Free.rank() < Plan::Starter.rank());
        assert!(Plan::Starter.rank() < Plan::Professional.rank());
        assert!(Plan::Professional.rank() < Plan::Enterprise.rank());
    }

    #[test]
    fn test_enterprise_is_unlimited() {
        assert_eq!(Plan::Enterprise.default_download_limit(), None);
        assert_eq!(Plan::Free.default_download_limit(), Some(5));
    }
}
