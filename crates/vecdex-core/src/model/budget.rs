//! Budget and usage-report types (§3, §4.7).

pub use crate::config::BudgetAction;
use serde::{Deserialize, Serialize};

/// A reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// `[UTC midnight today, UTC midnight tomorrow)`.
    Day,
    /// `[UTC first-of-month, UTC first-of-next-month)`.
    Month,
    /// All time; `start`/`end` are both zero.
    Total,
}

/// Aggregate metrics for a reporting period.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UsageMetrics {
    /// Number of embedding requests observed.
    pub requests: u64,
    /// Total tokens billed.
    pub tokens: u64,
    /// Estimated cost in thousandths of a dollar.
    pub cost_millidollars: u64,
}

/// A point-in-time view of one provider's budget state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    /// Daily token limit, if configured.
    pub daily_limit: Option<u64>,
    /// Monthly token limit, if configured.
    pub monthly_limit: Option<u64>,
    /// Tokens used so far in the current day.
    pub daily_used: u64,
    /// Tokens used so far in the current month.
    pub monthly_used: u64,
    /// What happens once a limit is crossed.
    pub action: BudgetAction,
}

impl BudgetSnapshot {
    /// True when a configured limit has been met or exceeded.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.daily_remaining().is_some_and(|r| r <= 0) || self.monthly_remaining().is_some_and(|r| r <= 0)
    }

    /// Remaining daily budget, or `None` if unlimited.
    #[must_use]
    pub fn daily_remaining(&self) -> Option<i64> {
        self.daily_limit
            .map(|limit| limit as i64 - self.daily_used as i64)
    }

    /// Remaining monthly budget, or `None` if unlimited.
    #[must_use]
    pub fn monthly_remaining(&self) -> Option<i64> {
        self.monthly_limit
            .map(|limit| limit as i64 - self.monthly_used as i64)
    }
}

/// A usage report for a single period (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    /// The reporting period this report covers.
    pub period: Period,
    /// Period start, milliseconds since epoch (0 for `Total`).
    pub start_ms: i64,
    /// Period end, milliseconds since epoch, exclusive (0 for `Total`).
    pub end_ms: i64,
    /// Aggregate request/token/cost metrics.
    pub metrics: UsageMetrics,
    /// Budget state as of report generation.
    pub budget: BudgetSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_when_daily_remaining_non_positive() {
        let snap = BudgetSnapshot {
            daily_limit: Some(100),
            monthly_limit: None,
            daily_used: 100,
            monthly_used: 0,
            action: BudgetAction::Reject,
        };
        assert!(snap.is_exhausted());
    }

    #[test]
    fn unlimited_budget_never_exhausted() {
        let snap = BudgetSnapshot {
            daily_limit: None,
            monthly_limit: None,
            daily_used: u64::MAX,
            monthly_used: u64::MAX,
            action: BudgetAction::Warn,
        };
        assert!(!snap.is_exhausted());
    }
}
