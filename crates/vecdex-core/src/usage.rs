//! UsageReporter: period usage reports over the shared budget state (§4.7).

use crate::embedding::budget_gate::BudgetGate;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::model::budget::{Period, UsageMetrics, UsageReport};
use chrono::{Datelike, Duration, TimeZone, Utc};
use std::sync::Arc;

/// Computes [`UsageReport`]s for the day/month/total periods, reading
/// token usage from the shared [`BudgetGate`] (day/month) or from
/// in-process [`Metrics`] (total — there is no persisted all-time
/// counter, §4.7).
pub struct UsageReporter {
    budget_gate: Arc<BudgetGate>,
    metrics: Arc<Metrics>,
}

impl UsageReporter {
    /// Builds a reporter over `budget_gate`'s counters and `metrics`'
    /// process-lifetime totals.
    #[must_use]
    pub fn new(budget_gate: Arc<BudgetGate>, metrics: Arc<Metrics>) -> Self {
        Self {
            budget_gate,
            metrics,
        }
    }

    /// `[UTC midnight today, UTC midnight tomorrow)`, in epoch
    /// milliseconds.
    fn day_bounds() -> (i64, i64) {
        let now = Utc::now();
        let start = Utc
            .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
            .single()
            .expect("valid UTC date");
        let end = start + Duration::days(1);
        (start.timestamp_millis(), end.timestamp_millis())
    }

    /// `[UTC first-of-month, UTC first-of-next-month)`, in epoch
    /// milliseconds.
    fn month_bounds() -> (i64, i64) {
        let now = Utc::now();
        let start = Utc
            .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .expect("valid UTC date");
        let (next_year, next_month) = if now.month() == 12 {
            (now.year() + 1, 1)
        } else {
            (now.year(), now.month() + 1)
        };
        let end = Utc
            .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
            .single()
            .expect("valid UTC date");
        (start.timestamp_millis(), end.timestamp_millis())
    }

    /// Builds the report for `period` (§4.7 "GetReport").
    ///
    /// # Errors
    ///
    /// Propagates storage read failures from the budget gate.
    pub async fn get_report(&self, period: Period) -> Result<UsageReport> {
        let budget = crate::cancel::cancellable(self.budget_gate.snapshot()).await?;

        let (start_ms, end_ms, tokens) = match period {
            Period::Day => {
                let (start, end) = Self::day_bounds();
                (start, end, budget.daily_used)
            }
            Period::Month => {
                let (start, end) = Self::month_bounds();
                (start, end, budget.monthly_used)
            }
            Period::Total => (0, 0, self.metrics.embedding_tokens_total()),
        };

        let requests = match period {
            Period::Total => self.metrics.embedding_requests_total(),
            Period::Day | Period::Month => 0,
        };

        Ok(UsageReport {
            period,
            start_ms,
            end_ms,
            metrics: UsageMetrics {
                requests,
                tokens,
                cost_millidollars: 0,
            },
            budget,
        })
    }
}
