use serde::{Deserialize, Serialize};

/// Immutable description of one sliding-window error budget.
///
/// The breaker holds two of these per key: the primary budget that governs
/// steady-state traffic and a stricter recovery budget applied while probing
/// after a trip. The `key_prefix` keeps their tallies apart in the shared
/// quota store even though they account against the same logical key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    /// Total tracked duration in seconds.
    pub window_secs: u32,
    /// Bucket resolution within the window in seconds.
    pub granularity_secs: u32,
    /// Maximum permitted count inside the window.
    pub limit: u32,
    /// Namespace distinguishing this budget's accounting from others sharing
    /// the same logical key.
    pub key_prefix: String,
}

impl Quota {
    /// Namespace for the steady-state error budget.
    pub const PRIMARY_PREFIX: &'static str = "circuit_breaker";
    /// Namespace for the recovery-phase error budget.
    pub const RECOVERY_PREFIX: &'static str = "circuit_breaker_recovery";

    /// Creates a quota over `window_secs` split into `granularity_secs`
    /// buckets, permitting `limit` counts.
    #[must_use]
    pub fn new(
        window_secs: u32,
        granularity_secs: u32,
        limit: u32,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            window_secs,
            granularity_secs,
            limit,
            key_prefix: key_prefix.into(),
        }
    }
}
