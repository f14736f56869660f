//! Cooperative circuit breaker backed by a shared sliding-window quota store.
//!
//! A [`CircuitBreaker`] protects one downstream dependency, identified by a
//! stable key, from sustained error bursts. It keeps no mutable state of its
//! own: the current phase lives in two TTL'd marker keys in a shared
//! key-value store and the error tallies live in a shared quota store, so
//! every process that constructs a breaker with the same key and
//! configuration observes the same decisions.
//!
//! Callers gate each attempt with [`CircuitBreaker::should_allow_request`]
//! and report failed attempts with [`CircuitBreaker::record_error`]. When the
//! error budget for the current phase runs out the breaker trips: all traffic
//! is blocked for a while, then cautiously probed under a stricter recovery
//! budget before returning to steady state.
//!
//! If the shared store cannot be reached the breaker fails open and allows
//! the request; an unreachable store must never become an outage of its own.

pub mod breaker;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod quota;
pub mod state;
pub mod store;

pub use breaker::CircuitBreaker;
pub use clock::{Clock, SystemClock};
pub use config::{CircuitBreakerConfig, ResolvedConfig};
pub use error::{StoreError, StoreResult};
pub use quota::Quota;
pub use state::{BreakerState, RequestDecision, StateSnapshot};
pub use store::{KeyValueStore, QuotaStore, SetWithTtl, WriteBatch};
