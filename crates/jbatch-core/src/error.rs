//! Hard faults: misuse of the API rather than transient request failures.
//!
//! Ordinary request failures never show up here; they are
//! `RequestOutcome::Failure` values.

use crate::batcher::BatchResult;
use crate::retry::PolicyError;

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("duplicate correlation id `{0}` in batch")]
    DuplicateCorrelationId(String),
    #[error("duplicate item id `{0}` in job")]
    DuplicateItemId(String),
    #[error("batch contains no requests")]
    EmptyBatch,
    #[error("invalid retry policy: {0}")]
    InvalidPolicy(#[from] PolicyError),
    #[error("invalid request url for `{path}`: {source}")]
    InvalidUrl {
        path: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request body could not be serialized: {0}")]
    InvalidBody(#[from] serde_json::Error),
    #[error("request task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
    /// A fault stopped the batch after some requests had already finished.
    /// `completed` holds their outcomes; the rest are listed as not dispatched.
    #[error("batch stopped early with {} request(s) completed", .completed.len())]
    Interrupted {
        completed: Box<BatchResult>,
        source: Box<BatchError>,
    },
}
