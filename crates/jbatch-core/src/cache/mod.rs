//! Durable TTL cache (SQLite via sqlx).
//!
//! Holds memoized idempotent reads (`cache:<type>:<id>`) and batch
//! checkpoints (`checkpoint:<job_id>`). Expiry is checked on every read, so
//! an expired row is never returned even before `sweep` reclaims it.

mod db;
mod entries;
mod types;

#[cfg(test)]
pub(crate) use db::open_memory;
pub(crate) use db::unix_millis;
pub use db::TtlCache;
pub use types::{CacheEntry, CacheStats};
