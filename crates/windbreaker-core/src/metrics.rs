//! Prometheus metric definitions for the circuit breaker.
//!
//! Counters are registered lazily on first access using `once_cell::Lazy`;
//! exporting the default registry is the embedding application's concern.

use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

/// Requests rejected by `should_allow_request`, labeled by breaker key.
pub static REQUESTS_BLOCKED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "windbreaker_requests_blocked_total",
        "Requests rejected by the circuit breaker",
        &["breaker"]
    )
    .expect("Failed to register blocked-request counter")
});

/// Error-budget exhaustions, labeled by breaker key and the phase that
/// tripped.
pub static ERROR_LIMIT_HITS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "windbreaker_error_limit_hits_total",
        "Error budget exhaustions that tripped the circuit breaker",
        &["breaker", "state"]
    )
    .expect("Failed to register error-limit counter")
});
