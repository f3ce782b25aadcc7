//! BudgetGate decorator: tracks per-provider token spend and fails fast
//! once a configured limit has already been crossed (§4.2, §5).

use super::{BatchEmbedResult, EmbedResult, EmbeddingPipeline};
use crate::config::BudgetAction;
use crate::error::{Error, Result};
use crate::model::budget::BudgetSnapshot;
use crate::storage::StorageAdapter;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const DAILY_TTL_SECS: u64 = 48 * 3600;
const MONTHLY_TTL_SECS: u64 = 62 * 24 * 3600;

/// Wraps an inner pipeline stage with budget accounting. Counters live in
/// the shared storage adapter, not in process memory (§5): every replica
/// sees the same counters.
pub struct BudgetGate {
    inner: Arc<dyn EmbeddingPipeline>,
    storage: Arc<dyn StorageAdapter>,
    provider: String,
    key_prefix: String,
    daily_limit: Option<u64>,
    monthly_limit: Option<u64>,
    action: BudgetAction,
}

impl BudgetGate {
    /// Builds a budget gate around `inner`.
    #[must_use]
    pub fn new(
        inner: Arc<dyn EmbeddingPipeline>,
        storage: Arc<dyn StorageAdapter>,
        provider: impl Into<String>,
        key_prefix: impl Into<String>,
        daily_limit: Option<u64>,
        monthly_limit: Option<u64>,
        action: BudgetAction,
    ) -> Self {
        Self {
            inner,
            storage,
            provider: provider.into(),
            key_prefix: key_prefix.into(),
            daily_limit,
            monthly_limit,
            action,
        }
    }

    fn daily_key(&self) -> String {
        format!(
            "{}budget:{}:daily:{}",
            self.key_prefix,
            self.provider,
            Utc::now().format("%Y-%m-%d")
        )
    }

    fn monthly_key(&self) -> String {
        format!(
            "{}budget:{}:monthly:{}",
            self.key_prefix,
            self.provider,
            Utc::now().format("%Y-%m")
        )
    }

    async fn current_usage(&self) -> Result<(u64, u64)> {
        let daily = self
            .storage
            .get(&self.daily_key())
            .await?
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let monthly = self
            .storage
            .get(&self.monthly_key())
            .await?
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        Ok((daily, monthly))
    }

    /// Reads a point-in-time snapshot of this provider's budget state.
    ///
    /// # Errors
    ///
    /// Propagates storage read failures.
    pub async fn snapshot(&self) -> Result<BudgetSnapshot> {
        let (daily_used, monthly_used) = self.current_usage().await?;
        Ok(BudgetSnapshot {
            daily_limit: self.daily_limit,
            monthly_limit: self.monthly_limit,
            daily_used,
            monthly_used,
            action: self.action,
        })
    }

    async fn record_usage(&self, total_tokens: u64) -> Result<()> {
        if total_tokens == 0 {
            return Ok(());
        }
        let daily_key = self.daily_key();
        self.storage.incrby(&daily_key, total_tokens as i64).await?;
        self.storage.expire_nx(&daily_key, DAILY_TTL_SECS).await?;

        let monthly_key = self.monthly_key();
        self.storage
            .incrby(&monthly_key, total_tokens as i64)
            .await?;
        self.storage
            .expire_nx(&monthly_key, MONTHLY_TTL_SECS)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EmbeddingPipeline for BudgetGate {
    async fn embed(&self, text: &str) -> Result<EmbedResult> {
        if matches!(self.action, BudgetAction::Reject) {
            let (daily_used, monthly_used) = self.current_usage().await?;
            let exhausted = self.daily_limit.is_some_and(|l| daily_used >= l)
                || self.monthly_limit.is_some_and(|l| monthly_used >= l);
            if exhausted {
                return Err(Error::EmbeddingQuotaExceeded(self.provider.clone()));
            }
        }

        let result = self.inner.embed(text).await?;
        self.record_usage(result.total_tokens).await?;

        if matches!(self.action, BudgetAction::Warn) {
            let (daily_used, monthly_used) = self.current_usage().await?;
            if self.daily_limit.is_some_and(|l| daily_used > l)
                || self.monthly_limit.is_some_and(|l| monthly_used > l)
            {
                tracing::warn!(provider = %self.provider, "embedding budget exceeded (warn mode)");
            }
        }

        Ok(result)
    }

    async fn batch_embed(&self, texts: &[String]) -> Result<BatchEmbedResult> {
        if matches!(self.action, BudgetAction::Reject) {
            let (daily_used, monthly_used) = self.current_usage().await?;
            let exhausted = self.daily_limit.is_some_and(|l| daily_used >= l)
                || self.monthly_limit.is_some_and(|l| monthly_used >= l);
            if exhausted {
                return Err(Error::EmbeddingQuotaExceeded(self.provider.clone()));
            }
        }

        let result = self.inner.batch_embed(texts).await?;
        self.record_usage(result.total_tokens).await?;

        if matches!(self.action, BudgetAction::Warn) {
            let (daily_used, monthly_used) = self.current_usage().await?;
            if self.daily_limit.is_some_and(|l| daily_used > l)
                || self.monthly_limit.is_some_and(|l| monthly_used > l)
            {
                tracing::warn!(provider = %self.provider, "embedding budget exceeded (warn mode)");
            }
        }

        Ok(result)
    }
}
