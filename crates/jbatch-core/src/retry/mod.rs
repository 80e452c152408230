//! Retry and backoff policy.
//!
//! This module encapsulates error classification (status codes, network
//! failures, throttling) and exponential backoff decisions so the executor,
//! batcher, and processor share one consistent policy.

mod classify;
mod policy;
mod run;

pub use classify::{classify, classify_http_status, classify_transport_error};
pub use policy::{ErrorKind, PolicyError, RetryDecision, RetryPolicy};
pub use run::{run_with_retry, RetryRun};
