//! In-memory store double: TTL'd markers plus granule-bucket quota tallies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use windbreaker_core::{
    Clock, KeyValueStore, Quota, QuotaStore, StoreError, StoreResult, WriteBatch,
};

/// Marker entry: timestamp payload plus absolute expiry.
#[derive(Debug, Clone, Copy)]
struct MarkerEntry {
    value: i64,
    expires_at: i64,
}

/// In-memory implementation of both consumed store interfaces (for testing).
///
/// Cloning yields another handle onto the same maps, which is how tests
/// model several breaker instances sharing one distributed store. TTLs are
/// honored against the injected clock rather than wall time, and the quota
/// side keeps one usage bucket per granule, summing the buckets that fall
/// inside the sliding window.
///
/// Fault injection switches make reads or writes fail with
/// [`StoreError::Unavailable`] so the breaker's fail-open and best-effort
/// paths can be exercised.
#[derive(Clone)]
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    markers: Arc<RwLock<HashMap<String, MarkerEntry>>>,
    /// Namespaced usage key -> granule start -> count.
    usage: Arc<RwLock<HashMap<String, HashMap<i64, u64>>>>,
    fail_reads: Arc<AtomicBool>,
    fail_marker_writes: Arc<AtomicBool>,
    fail_usage_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Creates an empty store reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            markers: Arc::new(RwLock::new(HashMap::new())),
            usage: Arc::new(RwLock::new(HashMap::new())),
            fail_reads: Arc::new(AtomicBool::new(false)),
            fail_marker_writes: Arc::new(AtomicBool::new(false)),
            fail_usage_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// When set, every read on either interface fails as unavailable.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// When set, marker batch writes fail as unavailable.
    pub fn fail_marker_writes(&self, fail: bool) {
        self.fail_marker_writes.store(fail, Ordering::SeqCst);
    }

    /// When set, quota usage recording fails as unavailable.
    pub fn fail_usage_writes(&self, fail: bool) {
        self.fail_usage_writes.store(fail, Ordering::SeqCst);
    }

    fn usage_key(quota: &Quota, key: &str) -> String {
        format!("{}.{key}", quota.key_prefix)
    }

    fn check_reads(&self) -> StoreResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("injected read failure"));
        }
        Ok(())
    }
}

/// Start of the granule bucket covering `now_secs`.
fn granule_start(now_secs: i64, granularity_secs: u32) -> i64 {
    let granularity = i64::from(granularity_secs.max(1));
    now_secs - now_secs.rem_euclid(granularity)
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<i64>>> {
        self.check_reads()?;
        let now_secs = self.clock.now().timestamp();
        let markers = self.markers.read();
        Ok(keys
            .iter()
            .map(|key| {
                markers
                    .get(key)
                    .filter(|entry| entry.expires_at > now_secs)
                    .map(|entry| entry.value)
            })
            .collect())
    }

    async fn execute(&self, batch: WriteBatch) -> StoreResult<()> {
        if self.fail_marker_writes.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("injected write failure"));
        }
        let now_secs = self.clock.now().timestamp();
        let mut markers = self.markers.write();
        for op in batch.ops() {
            markers.insert(
                op.key.clone(),
                MarkerEntry {
                    value: op.value,
                    expires_at: now_secs + i64::from(op.ttl_secs),
                },
            );
        }
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> StoreResult<()> {
        let mut markers = self.markers.write();
        for key in keys {
            markers.remove(key);
        }
        Ok(())
    }
}

#[async_trait]
impl QuotaStore for MemoryStore {
    async fn record_usage(
        &self,
        key: &str,
        amount: u32,
        quotas: &[Quota],
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        if self.fail_usage_writes.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("injected write failure"));
        }
        let now_secs = now.timestamp();
        let mut usage = self.usage.write();
        for quota in quotas {
            let bucket = granule_start(now_secs, quota.granularity_secs);
            let buckets = usage.entry(Self::usage_key(quota, key)).or_default();
            *buckets.entry(bucket).or_insert(0) += u64::from(amount);
        }
        Ok(())
    }

    async fn remaining(&self, key: &str, quota: &Quota, now: DateTime<Utc>) -> StoreResult<i64> {
        self.check_reads()?;
        let now_secs = now.timestamp();
        let window_start = now_secs - i64::from(quota.window_secs);
        let usage = self.usage.read();
        let used: u64 = usage
            .get(&Self::usage_key(quota, key))
            .map(|buckets| {
                buckets
                    .iter()
                    // A bucket counts while any part of it overlaps the window.
                    .filter(|(start, _)| **start + i64::from(quota.granularity_secs) > window_start)
                    .map(|(_, count)| count)
                    .sum()
            })
            .unwrap_or(0);
        let used = i64::try_from(used).unwrap_or(i64::MAX);
        Ok(i64::from(quota.limit).saturating_sub(used))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    const T0: i64 = 1_700_000_000;

    fn store_at(start: i64) -> (MemoryStore, ManualClock) {
        let clock = ManualClock::at(start);
        (MemoryStore::new(Arc::new(clock.clone())), clock)
    }

    fn quota(window: u32, granularity: u32, limit: u32) -> Quota {
        Quota::new(window, granularity, limit, Quota::PRIMARY_PREFIX)
    }

    #[test]
    fn granule_start_floors_to_bucket_boundary() {
        assert_eq!(granule_start(107, 10), 100);
        assert_eq!(granule_start(100, 10), 100);
        assert_eq!(granule_start(99, 10), 90);
    }

    #[tokio::test]
    async fn markers_lapse_with_the_clock() {
        let (store, clock) = store_at(T0);
        let keys = vec!["svc.circuit_breaker.broken".to_string()];

        store
            .execute(WriteBatch::new().set_with_ttl(keys[0].clone(), T0 + 20, 20))
            .await
            .unwrap();
        assert_eq!(store.get_many(&keys).await.unwrap(), vec![Some(T0 + 20)]);

        clock.advance(20);
        assert_eq!(store.get_many(&keys).await.unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn usage_ages_out_of_the_window() {
        let (store, clock) = store_at(T0);
        let quota = quota(100, 5, 10);

        store
            .record_usage("svc", 3, std::slice::from_ref(&quota), clock.now())
            .await
            .unwrap();
        assert_eq!(store.remaining("svc", &quota, clock.now()).await.unwrap(), 7);

        // Still inside the window.
        clock.advance(90);
        assert_eq!(store.remaining("svc", &quota, clock.now()).await.unwrap(), 7);

        // The recording granule has fully left the window.
        clock.advance(20);
        assert_eq!(
            store.remaining("svc", &quota, clock.now()).await.unwrap(),
            10
        );
    }

    #[tokio::test]
    async fn quotas_with_different_prefixes_do_not_share_tallies() {
        let (store, clock) = store_at(T0);
        let primary = quota(100, 5, 10);
        let recovery = Quota::new(100, 5, 1, Quota::RECOVERY_PREFIX);

        store
            .record_usage("svc", 1, std::slice::from_ref(&primary), clock.now())
            .await
            .unwrap();

        assert_eq!(
            store.remaining("svc", &primary, clock.now()).await.unwrap(),
            9
        );
        assert_eq!(
            store
                .remaining("svc", &recovery, clock.now())
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn remaining_goes_negative_on_overshoot() {
        let (store, clock) = store_at(T0);
        let quota = quota(100, 5, 2);

        store
            .record_usage("svc", 5, std::slice::from_ref(&quota), clock.now())
            .await
            .unwrap();

        assert_eq!(
            store.remaining("svc", &quota, clock.now()).await.unwrap(),
            -3
        );
    }

    #[tokio::test]
    async fn injected_faults_surface_as_unavailable() {
        let (store, clock) = store_at(T0);
        let quota = quota(100, 5, 10);
        let keys = vec!["svc.circuit_breaker.broken".to_string()];

        store.fail_reads(true);
        assert!(store.get_many(&keys).await.is_err());
        assert!(store.remaining("svc", &quota, clock.now()).await.is_err());
        store.fail_reads(false);

        store.fail_marker_writes(true);
        assert!(store.execute(WriteBatch::new()).await.is_err());

        store.fail_usage_writes(true);
        assert!(store
            .record_usage("svc", 1, std::slice::from_ref(&quota), clock.now())
            .await
            .is_err());
    }
}
