use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, warn};

use crate::clock::Clock;
use crate::config::{CircuitBreakerConfig, ResolvedConfig};
use crate::error::StoreResult;
use crate::metrics::{ERROR_LIMIT_HITS, REQUESTS_BLOCKED};
use crate::quota::Quota;
use crate::state::{BreakerState, RequestDecision, StateSnapshot};
use crate::store::{KeyValueStore, QuotaStore, WriteBatch};

/// Cooperative circuit breaker for one downstream dependency.
///
/// The instance itself is stateless: the phase is carried by two TTL'd
/// marker keys and the error tallies by the quota store, both shared across
/// every process using the same key. Constructing a breaker is cheap and may
/// happen per call; all constructions for a key must use the same
/// configuration.
///
/// Neither public method ever surfaces a store error. An unreachable store
/// degrades to allowing traffic and to best-effort transitions; the breaker
/// must not become a point of failure for the dependency it protects.
pub struct CircuitBreaker {
    key: String,
    broken_key: String,
    recovery_key: String,
    config: ResolvedConfig,
    primary_quota: Quota,
    recovery_quota: Quota,
    kv: Arc<dyn KeyValueStore>,
    quotas: Arc<dyn QuotaStore>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Binds a breaker to its key, resolving the configuration and deriving
    /// the marker keys and the two error budgets.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        config: CircuitBreakerConfig,
        kv: Arc<dyn KeyValueStore>,
        quotas: Arc<dyn QuotaStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let key = key.into();
        let config = config.resolve();
        Self {
            broken_key: format!("{key}.circuit_breaker.broken"),
            recovery_key: format!("{key}.circuit_breaker.in_recovery"),
            primary_quota: config.primary_quota(),
            recovery_quota: config.recovery_quota(),
            key,
            config,
            kv,
            quotas,
            clock,
        }
    }

    /// The breaker's key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Effective configuration after default derivation and auto-correction.
    #[must_use]
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Gates one attempt against the protected dependency.
    ///
    /// Blocks while the breaker is broken, and while the controlling budget
    /// (primary in OK, recovery while recovering) is exhausted. If the
    /// shared store cannot be consulted the request is allowed and the
    /// decision says so: [`RequestDecision::DegradedAllowed`].
    ///
    /// Emits the blocked-request counter whenever it blocks.
    pub async fn should_allow_request(&self) -> RequestDecision {
        let snapshot = match self.read_state().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(
                    "circuit breaker `{}`: state read failed, failing open: {err}",
                    self.key
                );
                return RequestDecision::DegradedAllowed;
            }
        };

        let controlling = match self.controlling_quota(snapshot.state) {
            Some(quota) => quota,
            None => return self.blocked(),
        };

        match self.quotas.remaining(&self.key, controlling, self.clock.now()).await {
            Ok(remaining) if remaining <= 0 => self.blocked(),
            Ok(_) => RequestDecision::Allowed,
            Err(err) => {
                error!(
                    "circuit breaker `{}`: quota check failed, failing open: {err}",
                    self.key
                );
                RequestDecision::DegradedAllowed
            }
        }
    }

    /// Counts one downstream failure against the active budgets, tripping
    /// the breaker when the controlling budget runs out.
    ///
    /// Callers invoke this only for failures that should spend the error
    /// budget; blocked or successful attempts are not recorded. While the
    /// breaker is broken the call is a no-op so already-blocked traffic is
    /// not double-billed. Store failures anywhere along the way are logged
    /// and swallowed, leaving the breaker in its last-known phase.
    pub async fn record_error(&self) {
        let snapshot = self.state().await;

        if snapshot.state == BreakerState::Broken {
            let elapsed = i64::from(self.config.broken_state_duration)
                - snapshot.remaining_secs.unwrap_or(0);
            if elapsed > i64::from(self.config.broken_grace_secs) {
                // A fresh error right after the trip is a benign race with
                // in-flight requests; one this late means somebody is not
                // checking should_allow_request.
                warn!(
                    "circuit breaker `{}`: error recorded {elapsed}s into the broken state; \
                     caller appears to bypass should_allow_request",
                    self.key
                );
            }
            return;
        }

        let now = self.clock.now();
        let charged: Vec<Quota> = match snapshot.state {
            // Recovery-phase errors stay real for the steady-state window
            // too; charge both budgets so a sub-recovery-threshold error
            // rate is still visible once recovery ends.
            BreakerState::Recovery => {
                vec![self.primary_quota.clone(), self.recovery_quota.clone()]
            }
            _ => vec![self.primary_quota.clone()],
        };
        if let Err(err) = self.quotas.record_usage(&self.key, 1, &charged, now).await {
            error!(
                "circuit breaker `{}`: failed to record error: {err}",
                self.key
            );
            return;
        }

        let controlling = match self.controlling_quota(snapshot.state) {
            Some(quota) => quota,
            None => return,
        };
        let remaining = match self.quotas.remaining(&self.key, controlling, now).await {
            Ok(remaining) => remaining,
            Err(err) => {
                error!(
                    "circuit breaker `{}`: quota check after recording failed: {err}",
                    self.key
                );
                return;
            }
        };

        if remaining <= 0 {
            self.trip(snapshot.state, now).await;
        }
    }

    /// Current phase as seen through the shared store.
    ///
    /// An unreachable store reads as OK with no remaining time; unknown
    /// state degrades to "allow" rather than blocking traffic.
    pub async fn state(&self) -> StateSnapshot {
        match self.read_state().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(
                    "circuit breaker `{}`: state read failed, assuming OK: {err}",
                    self.key
                );
                StateSnapshot::OK
            }
        }
    }

    async fn read_state(&self) -> StoreResult<StateSnapshot> {
        let keys = [self.broken_key.clone(), self.recovery_key.clone()];
        let values = self.kv.get_many(&keys).await?;
        let broken_until = values.first().copied().flatten();
        let recovery_until = values.get(1).copied().flatten();
        Ok(StateSnapshot::derive(
            broken_until,
            recovery_until,
            self.clock.now().timestamp(),
        ))
    }

    /// The budget governing the given phase: primary in OK, recovery while
    /// recovering, none while broken.
    fn controlling_quota(&self, state: BreakerState) -> Option<&Quota> {
        match state {
            BreakerState::Ok => Some(&self.primary_quota),
            BreakerState::Recovery => Some(&self.recovery_quota),
            BreakerState::Broken => None,
        }
    }

    /// Writes both markers in one batch: the broken marker covering the
    /// blocked phase, and the recovery marker whose clock starts now and
    /// covers both phases.
    async fn trip(&self, from: BreakerState, now: DateTime<Utc>) {
        ERROR_LIMIT_HITS
            .with_label_values(&[self.key.as_str(), from.as_str()])
            .inc();
        warn!(
            "circuit breaker `{}` tripped from the {} state",
            self.key,
            from.as_str()
        );

        let broken_secs = self.config.broken_state_duration;
        let combined_secs = broken_secs.saturating_add(self.config.recovery_duration);
        let now_secs = now.timestamp();
        let batch = WriteBatch::new()
            .set_with_ttl(
                self.broken_key.clone(),
                now_secs + i64::from(broken_secs),
                broken_secs,
            )
            .set_with_ttl(
                self.recovery_key.clone(),
                now_secs + i64::from(combined_secs),
                combined_secs,
            );

        // Concurrent trippers compute the same target state, so a racing
        // write is a harmless overwrite. A failed write leaves the previous
        // phase standing instead of surfacing to the caller.
        if let Err(err) = self.kv.execute(batch).await {
            error!(
                "circuit breaker `{}`: failed to enter the broken state: {err}",
                self.key
            );
        }
    }

    fn blocked(&self) -> RequestDecision {
        REQUESTS_BLOCKED
            .with_label_values(&[self.key.as_str()])
            .inc();
        RequestDecision::Blocked
    }
}
