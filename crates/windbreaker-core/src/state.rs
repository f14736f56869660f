/// Breaker phase, derived on every call from the two marker keys.
///
/// Never stored directly: the broken and recovery markers carry expiry
/// timestamps and lapse passively via store TTL, so no transition-out code
/// ever runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Steady state; traffic allowed under the primary budget.
    Ok,
    /// Tripped; all traffic blocked until the broken marker lapses.
    Broken,
    /// Probing after a trip; traffic allowed under the recovery budget.
    Recovery,
}

impl BreakerState {
    /// Canonical lowercase name used in metric labels and log lines.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Broken => "broken",
            Self::Recovery => "recovery",
        }
    }
}

/// Point-in-time view of the breaker: the phase plus how long it has left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSnapshot {
    /// Current phase.
    pub state: BreakerState,
    /// Seconds until the current phase lapses; `None` in the OK state.
    pub remaining_secs: Option<i64>,
}

impl StateSnapshot {
    /// The at-rest snapshot: both markers absent.
    pub const OK: Self = Self {
        state: BreakerState::Ok,
        remaining_secs: None,
    };

    /// Derives the phase from the raw marker expiries.
    ///
    /// Evaluated in order: a live broken marker wins, then a live recovery
    /// marker, else OK. The recovery marker's clock starts the moment the
    /// breaker trips and covers both phases, which is why it loses to the
    /// broken marker while that one is still live.
    #[must_use]
    pub fn derive(broken_until: Option<i64>, recovery_until: Option<i64>, now: i64) -> Self {
        if let Some(expiry) = broken_until {
            if expiry > now {
                return Self {
                    state: BreakerState::Broken,
                    remaining_secs: Some(expiry - now),
                };
            }
        }
        if let Some(expiry) = recovery_until {
            if expiry > now {
                return Self {
                    state: BreakerState::Recovery,
                    remaining_secs: Some(expiry - now),
                };
            }
        }
        Self::OK
    }
}

/// Outcome of [`should_allow_request`](crate::CircuitBreaker::should_allow_request).
///
/// The fail-open path is a distinct value rather than a plain `true` so
/// callers and tests can tell a healthy allow from one granted because the
/// store could not be consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDecision {
    /// Within budget; proceed.
    Allowed,
    /// The store was unreachable; allowing per the fail-open policy.
    DegradedAllowed,
    /// The breaker is broken or the controlling budget is exhausted.
    Blocked,
}

impl RequestDecision {
    /// Collapses the decision to the caller-facing gate: anything but
    /// `Blocked` lets the request through.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        !matches!(self, Self::Blocked)
    }
}
