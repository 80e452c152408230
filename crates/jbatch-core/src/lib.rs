//! Resilient execution core for issue-tracker REST calls: error
//! classification, retrying execution, a durable TTL cache, bounded
//! concurrent batching and checkpointed bulk processing.

pub mod batcher;
pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod control;
pub mod error;
pub mod executor;
pub mod logging;
pub mod ops;
pub mod processor;
pub mod request;
pub mod retry;
pub mod transport;

#[cfg(test)]
mod testing;

pub use error::BatchError;
