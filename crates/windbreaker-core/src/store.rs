use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::quota::Quota;

/// One TTL'd write inside a [`WriteBatch`].
///
/// The value is itself a unix-second timestamp: the breaker's markers store
/// the instant their phase lapses, redundantly with the key's TTL, so state
/// can be derived from a read without consulting store metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetWithTtl {
    /// Key to write.
    pub key: String,
    /// Unix-second timestamp payload.
    pub value: i64,
    /// Seconds until the store drops the key.
    pub ttl_secs: u32,
}

/// A group of writes executed as one pipelined round trip.
///
/// When the breaker trips it writes both markers through a single batch;
/// backends must land the whole batch together so no reader can observe a
/// broken marker without its recovery companion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<SetWithTtl>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a TTL'd set to the batch.
    #[must_use]
    pub fn set_with_ttl(mut self, key: impl Into<String>, value: i64, ttl_secs: u32) -> Self {
        self.ops.push(SetWithTtl {
            key: key.into(),
            value,
            ttl_secs,
        });
        self
    }

    /// The writes in insertion order.
    #[must_use]
    pub fn ops(&self) -> &[SetWithTtl] {
        &self.ops
    }

    /// Returns `true` when the batch holds no writes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Shared TTL'd key-value store holding the breaker's marker keys.
///
/// All breaker instances for a given key must see the same backing store;
/// last-write-wins per key is sufficient because concurrent trippers compute
/// the same target state.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Batched read. Returns one slot per requested key, `None` when the key
    /// is absent or its TTL has lapsed.
    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<i64>>>;

    /// Executes every write in the batch as one pipelined round trip.
    async fn execute(&self, batch: WriteBatch) -> StoreResult<()>;

    /// Removes keys outright. The production path never calls this; it
    /// exists for tests and operational tooling.
    async fn delete_many(&self, keys: &[String]) -> StoreResult<()>;
}

/// Sliding-window quota accounting shared across breaker instances.
///
/// The bucketing algorithm and persistence behind these calls belong to the
/// backend; the breaker only asks it to tally usage and report what is left.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Records `amount` units against each listed quota for the window
    /// ending at `now`. One physical event may be charged to several quotas
    /// at once (the breaker charges recovery-phase errors to both budgets).
    async fn record_usage(
        &self,
        key: &str,
        amount: u32,
        quotas: &[Quota],
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Granted-but-unused budget for `quota` as of `now`. May go negative
    /// when concurrent writers overshoot the limit.
    async fn remaining(&self, key: &str, quota: &Quota, now: DateTime<Utc>) -> StoreResult<i64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_preserves_insertion_order() {
        let batch = WriteBatch::new()
            .set_with_ttl("a.broken", 120, 20)
            .set_with_ttl("a.in_recovery", 320, 220);

        let ops = batch.ops();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].key, "a.broken");
        assert_eq!(ops[0].ttl_secs, 20);
        assert_eq!(ops[1].key, "a.in_recovery");
        assert_eq!(ops[1].value, 320);
    }

    #[test]
    fn new_batch_is_empty() {
        assert!(WriteBatch::new().is_empty());
    }
}
