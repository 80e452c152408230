//! Cooperative cancellation for batches and jobs.
//!
//! A running job is registered with an abort token. Setting the token stops
//! new dispatches (batcher) and new chunks (processor); requests already in
//! flight finish so no remote write is left half-applied.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Shared abort flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortToken(Arc<AtomicBool>);

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Registry of job id -> abort token. Used by the CLI to route Ctrl-C to
/// whatever job is running.
#[derive(Default)]
pub struct JobControl {
    jobs: RwLock<HashMap<String, AbortToken>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running job; returns the token to pass into `process`.
    pub fn register(&self, job_id: &str) -> AbortToken {
        let token = AbortToken::new();
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_id.to_string(), token.clone());
        token
    }

    /// Unregister a job (call when the job finishes, success or failure).
    pub fn unregister(&self, job_id: &str) {
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(job_id);
    }

    /// Request abort for one job. Returns false if it is not running.
    pub fn request_abort(&self, job_id: &str) -> bool {
        match self.jobs.read().unwrap_or_else(|e| e.into_inner()).get(job_id) {
            Some(token) => {
                token.abort();
                true
            }
            None => false,
        }
    }

    /// Request abort for every registered job.
    pub fn abort_all(&self) {
        for token in self.jobs.read().unwrap_or_else(|e| e.into_inner()).values() {
            token.abort();
        }
    }
}
