//! Path: crates/fraud-worker/src/rule_cache.rs
//! Process-wide rule snapshot with a TTL and pub/sub invalidation flag
//! (SPEC_FULL.md §4.3.1).
use fraud_stream::pubsub::InvalidationFlag;
use fraud_types::error::TransientInfrastructureError;
use fraud_types::model::Rule;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

pub struct RuleCache {
    rules: Vec<Rule>,
    loaded_at: Instant,
    ttl: Duration,
    flag: InvalidationFlag,
}

impl RuleCache {
    pub fn new(ttl_secs: u64, flag: InvalidationFlag) -> Self {
        let ttl = Duration::from_secs(ttl_secs);
        Self {
            rules: Vec::new(),
            // Forces a load on the first call regardless of `ttl`.
            loaded_at: Instant::now() - ttl - Duration::from_secs(1),
            ttl,
            flag,
        }
    }

    /// Reloads from the Rule Store if the TTL expired, the invalidation flag
    /// is set, or the cache is empty, then returns the subset of the
    /// (now current) process-wide snapshot visible as of `batch_cutoff`.
    pub async fn snapshot_as_of(
        &mut self,
        pool: &sqlx::PgPool,
        batch_cutoff: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Rule>, TransientInfrastructureError> {
        let invalidated = self.flag.swap(false, Ordering::SeqCst);
        let expired = self.loaded_at.elapsed() >= self.ttl;
        if invalidated || expired || self.rules.is_empty() {
            self.rules = fraud_store::rules::load_active_snapshot(pool).await?;
            self.loaded_at = Instant::now();
            fraud_telemetry::worker_metrics().set_rules_cache_size(self.rules.len() as f64);
            tracing::debug!(target: "fraud_worker", count = self.rules.len(), "rule cache reloaded");
        }
        Ok(fraud_store::rules::snapshot_as_of(&self.rules, batch_cutoff))
    }
}
