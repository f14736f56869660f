//! In-memory backends for windbreaker-core's consumed interfaces.
//!
//! [`MemoryStore`] implements both the TTL'd key-value store and the
//! sliding-window quota store against process-local maps, and
//! [`ManualClock`] lets tests advance time explicitly. Together they stand
//! in for the distributed store in tests and local development; they are not
//! the production limiter.

pub mod clock;
pub mod store;

pub use clock::ManualClock;
pub use store::MemoryStore;
