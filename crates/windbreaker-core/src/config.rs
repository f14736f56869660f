use serde::{Deserialize, Serialize};

use crate::quota::Quota;

/// Seconds after entering the broken state during which a recorded error is
/// treated as a benign race rather than a bypassing caller.
pub const DEFAULT_BROKEN_GRACE_SECS: u32 = 5;

fn default_broken_grace() -> u32 {
    DEFAULT_BROKEN_GRACE_SECS
}

/// Caller-supplied circuit breaker configuration.
///
/// Only the three required fields must be set; the optional ones are derived
/// from them during [`resolve`](Self::resolve). Inconsistent values are
/// auto-corrected with a logged warning, never rejected: a breaker that
/// refuses to construct would itself be an availability hazard.
///
/// Every process constructing a breaker for the same key must supply the
/// same configuration. It is not persisted in the shared store, so divergent
/// configs silently disagree about budgets and durations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Errors allowed inside the window before the breaker trips.
    pub error_limit: u32,

    /// Length of the tracked error window in seconds.
    pub error_limit_window: u32,

    /// How long all traffic is blocked once tripped, in seconds.
    pub broken_state_duration: u32,

    /// Stricter error budget applied while recovering.
    /// Defaults to `max(error_limit / 10, 1)` and must stay below
    /// `error_limit`.
    #[serde(default)]
    pub recovery_error_limit: Option<u32>,

    /// Bucket resolution of the error window in seconds.
    /// Defaults to `max(error_limit_window / 20, 5)`.
    #[serde(default)]
    pub error_limit_window_granularity: Option<u32>,

    /// Length of the recovery phase in seconds.
    /// Defaults to `error_limit_window * 2`.
    #[serde(default)]
    pub recovery_duration: Option<u32>,

    /// Grace period for errors recorded while already broken, in seconds.
    /// Errors arriving later than this after the trip log a misuse warning.
    #[serde(default = "default_broken_grace")]
    pub broken_grace_secs: u32,
}

impl CircuitBreakerConfig {
    /// Creates a configuration from the three required fields, leaving the
    /// rest to default derivation.
    #[must_use]
    pub fn new(error_limit: u32, error_limit_window: u32, broken_state_duration: u32) -> Self {
        Self {
            error_limit,
            error_limit_window,
            broken_state_duration,
            recovery_error_limit: None,
            error_limit_window_granularity: None,
            recovery_duration: None,
            broken_grace_secs: DEFAULT_BROKEN_GRACE_SECS,
        }
    }

    /// Derives defaults and auto-corrects inconsistencies, producing the
    /// effective configuration the breaker runs with.
    ///
    /// Corrections applied (each with a logged warning):
    /// - `recovery_error_limit >= error_limit` falls back to the derived
    ///   default; recovery must be stricter than steady state.
    /// - `broken_state_duration + recovery_duration < error_limit_window`
    ///   extends the recovery duration to cover the window, so one burst
    ///   cannot re-trip the breaker before it ages out of the primary
    ///   accounting.
    #[must_use]
    pub fn resolve(&self) -> ResolvedConfig {
        let default_recovery_limit = (self.error_limit / 10).max(1);
        let recovery_error_limit = match self.recovery_error_limit {
            Some(limit) if limit < self.error_limit => limit,
            Some(limit) => {
                config_warning(&format!(
                    "recovery_error_limit {limit} must be below error_limit {}; \
                     using derived default {default_recovery_limit}",
                    self.error_limit
                ));
                default_recovery_limit
            }
            None => default_recovery_limit,
        };

        let error_limit_window_granularity = self
            .error_limit_window_granularity
            .unwrap_or_else(|| (self.error_limit_window / 20).max(5));

        let mut recovery_duration = self
            .recovery_duration
            .unwrap_or_else(|| self.error_limit_window.saturating_mul(2));
        if self.broken_state_duration.saturating_add(recovery_duration) < self.error_limit_window {
            let corrected = self
                .error_limit_window
                .saturating_sub(self.broken_state_duration);
            config_warning(&format!(
                "broken_state_duration {} + recovery_duration {recovery_duration} does not \
                 cover error_limit_window {}; extending recovery_duration to {corrected}",
                self.broken_state_duration, self.error_limit_window
            ));
            recovery_duration = corrected;
        }

        ResolvedConfig {
            error_limit: self.error_limit,
            error_limit_window: self.error_limit_window,
            error_limit_window_granularity,
            broken_state_duration: self.broken_state_duration,
            recovery_error_limit,
            recovery_duration,
            broken_grace_secs: self.broken_grace_secs,
        }
    }
}

/// Effective configuration after default derivation and auto-correction.
///
/// Public so callers and tests can inspect what the breaker actually runs
/// with; immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Errors allowed inside the window before the breaker trips.
    pub error_limit: u32,
    /// Length of the tracked error window in seconds.
    pub error_limit_window: u32,
    /// Bucket resolution of the error window in seconds.
    pub error_limit_window_granularity: u32,
    /// How long all traffic is blocked once tripped, in seconds.
    pub broken_state_duration: u32,
    /// Error budget applied during the recovery phase.
    pub recovery_error_limit: u32,
    /// Length of the recovery phase in seconds.
    pub recovery_duration: u32,
    /// Grace period for errors recorded while already broken, in seconds.
    pub broken_grace_secs: u32,
}

impl ResolvedConfig {
    /// The steady-state error budget.
    #[must_use]
    pub fn primary_quota(&self) -> Quota {
        Quota::new(
            self.error_limit_window,
            self.error_limit_window_granularity,
            self.error_limit,
            Quota::PRIMARY_PREFIX,
        )
    }

    /// The stricter budget applied while recovering. Shares the primary
    /// window and granularity; only the limit and namespace differ.
    #[must_use]
    pub fn recovery_quota(&self) -> Quota {
        Quota::new(
            self.error_limit_window,
            self.error_limit_window_granularity,
            self.recovery_error_limit,
            Quota::RECOVERY_PREFIX,
        )
    }
}

/// Configuration inconsistencies are loud in development and diagnostic in
/// production, but never fatal.
fn config_warning(message: &str) {
    if cfg!(debug_assertions) {
        tracing::error!("circuit breaker config: {message}");
    } else {
        tracing::warn!("circuit breaker config: {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_documented_defaults() {
        let resolved = CircuitBreakerConfig::new(100, 600, 120).resolve();

        assert_eq!(resolved.recovery_error_limit, 10); // 100 / 10
        assert_eq!(resolved.error_limit_window_granularity, 30); // 600 / 20
        assert_eq!(resolved.recovery_duration, 1200); // 600 * 2
        assert_eq!(resolved.broken_grace_secs, DEFAULT_BROKEN_GRACE_SECS);
    }

    #[test]
    fn defaults_have_floors() {
        let resolved = CircuitBreakerConfig::new(3, 40, 100).resolve();

        // error_limit / 10 rounds to zero; floor is one error.
        assert_eq!(resolved.recovery_error_limit, 1);
        // window / 20 = 2; floor is five seconds.
        assert_eq!(resolved.error_limit_window_granularity, 5);
    }

    #[test]
    fn recovery_limit_at_or_above_primary_is_corrected() {
        let mut config = CircuitBreakerConfig::new(10, 100, 200);
        config.recovery_error_limit = Some(10);

        assert_eq!(config.resolve().recovery_error_limit, 1);

        config.recovery_error_limit = Some(25);
        assert_eq!(config.resolve().recovery_error_limit, 1);
    }

    #[test]
    fn recovery_limit_below_primary_is_kept() {
        let mut config = CircuitBreakerConfig::new(10, 100, 200);
        config.recovery_error_limit = Some(4);

        assert_eq!(config.resolve().recovery_error_limit, 4);
    }

    #[test]
    fn short_recovery_duration_is_extended_to_cover_window() {
        let mut config = CircuitBreakerConfig::new(10, 100, 30);
        config.recovery_duration = Some(20);

        // 30 + 20 < 100, so recovery is stretched to 100 - 30.
        assert_eq!(config.resolve().recovery_duration, 70);
    }

    #[test]
    fn durations_covering_window_are_untouched() {
        let mut config = CircuitBreakerConfig::new(10, 100, 30);
        config.recovery_duration = Some(90);

        assert_eq!(config.resolve().recovery_duration, 90);
    }

    #[test]
    fn long_broken_duration_needs_no_correction() {
        let mut config = CircuitBreakerConfig::new(10, 100, 150);
        config.recovery_duration = Some(0);

        // The broken phase alone already outlasts the window.
        assert_eq!(config.resolve().recovery_duration, 0);
    }

    #[test]
    fn extreme_durations_resolve_without_overflow() {
        let resolved = CircuitBreakerConfig::new(10, u32::MAX, u32::MAX).resolve();

        // The derived recovery duration saturates instead of wrapping, and
        // the coverage check saturates instead of panicking.
        assert_eq!(resolved.recovery_duration, u32::MAX);

        let mut config = CircuitBreakerConfig::new(10, u32::MAX, 1);
        config.recovery_duration = Some(u32::MAX);
        assert_eq!(config.resolve().recovery_duration, u32::MAX);
    }

    #[test]
    fn quotas_share_window_but_not_namespace() {
        let resolved = CircuitBreakerConfig::new(10, 100, 20).resolve();
        let primary = resolved.primary_quota();
        let recovery = resolved.recovery_quota();

        assert_eq!(primary.limit, 10);
        assert_eq!(recovery.limit, 1);
        assert_eq!(primary.window_secs, recovery.window_secs);
        assert_eq!(primary.granularity_secs, recovery.granularity_secs);
        assert_ne!(primary.key_prefix, recovery.key_prefix);
    }

    #[test]
    fn missing_optional_fields_deserialize_with_defaults() {
        let config: CircuitBreakerConfig = serde_json::from_str(
            r#"{"error_limit": 10, "error_limit_window": 100, "broken_state_duration": 20}"#,
        )
        .unwrap();

        assert_eq!(config.recovery_error_limit, None);
        assert_eq!(config.broken_grace_secs, DEFAULT_BROKEN_GRACE_SECS);
        assert_eq!(config.resolve().recovery_error_limit, 1);
    }
}
