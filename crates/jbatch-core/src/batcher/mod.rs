//! Concurrent request batcher.
//!
//! Fans independent descriptors out to the executor with at most
//! `concurrency_limit` in flight. Individual failures are outcomes, never
//! errors; the batch only fails for malformed input or a crashed request
//! task. Cancellation stops new dispatches but lets in-flight requests finish.

mod result;

pub use result::BatchResult;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::control::AbortToken;
use crate::error::BatchError;
use crate::executor::Executor;
use crate::ops;
use crate::request::{RequestDescriptor, RequestOutcome};

#[derive(Clone)]
pub struct RequestBatcher {
    executor: Arc<Executor>,
}

impl RequestBatcher {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self { executor }
    }

    /// Runs all descriptors with up to `concurrency_limit` in flight (0 is
    /// treated as 1). Outcomes come back in input order regardless of
    /// completion order.
    ///
    /// If `abort` is set mid-batch, descriptors not yet dispatched are listed
    /// in `BatchResult::not_dispatched` instead of getting an outcome.
    pub async fn run(
        &self,
        descriptors: Vec<RequestDescriptor>,
        concurrency_limit: usize,
        abort: Option<&AbortToken>,
    ) -> Result<BatchResult, BatchError> {
        self.validate(&descriptors)?;
        let executor = &self.executor;
        dispatch(descriptors, concurrency_limit.max(1), abort, |desc| {
            let executor = Arc::clone(executor);
            async move { executor.execute(&desc).await }
        })
        .await
    }

    fn validate(&self, descriptors: &[RequestDescriptor]) -> Result<(), BatchError> {
        if descriptors.is_empty() {
            return Err(BatchError::EmptyBatch);
        }
        let mut seen = HashSet::with_capacity(descriptors.len());
        for desc in descriptors {
            if !seen.insert(desc.correlation_id.as_str()) {
                return Err(BatchError::DuplicateCorrelationId(desc.correlation_id.clone()));
            }
            self.executor.check(desc)?;
        }
        Ok(())
    }

    /// Fetch many issues concurrently, keyed by issue key. Duplicate keys are
    /// fetched once; reads go through the response cache for `cache_ttl`.
    pub async fn fetch_issues(
        &self,
        keys: &[String],
        fields: &[String],
        concurrency_limit: usize,
        cache_ttl: Duration,
    ) -> Result<BatchResult, BatchError> {
        let mut seen = HashSet::new();
        let descriptors: Vec<RequestDescriptor> = keys
            .iter()
            .filter(|k| seen.insert(k.as_str()))
            .map(|key| {
                ops::get_issue(key, fields)
                    .correlation_id(key.as_str())
                    .cached(ops::cache_key("issue", key), cache_ttl)
            })
            .collect();
        self.run(descriptors, concurrency_limit, None).await
    }
}

/// Fill-to-limit dispatch loop shared by every batch. A crashed task stops
/// further dispatch; the outcomes gathered so far travel with the error.
async fn dispatch<F, Fut>(
    descriptors: Vec<RequestDescriptor>,
    limit: usize,
    abort: Option<&AbortToken>,
    mut execute: F,
) -> Result<BatchResult, BatchError>
where
    F: FnMut(RequestDescriptor) -> Fut,
    Fut: Future<Output = Result<RequestOutcome, BatchError>> + Send + 'static,
{
    let ids: Vec<String> = descriptors.iter().map(|d| d.correlation_id.clone()).collect();
    let mut slots: Vec<Option<RequestOutcome>> = vec![None; descriptors.len()];

    let mut pending = descriptors.into_iter().enumerate();
    let mut join_set = JoinSet::new();
    let mut stopped = false;
    let mut fault: Option<BatchError> = None;

    loop {
        while !stopped && join_set.len() < limit {
            if abort.is_some_and(AbortToken::is_aborted) {
                tracing::info!(in_flight = join_set.len(), "batch cancelled; draining in-flight requests");
                stopped = true;
                break;
            }
            let Some((idx, desc)) = pending.next() else {
                break;
            };
            let task = execute(desc);
            join_set.spawn(async move { (idx, task.await) });
        }

        // In-flight requests always run to completion, even after a fault.
        let Some(res) = join_set.join_next().await else {
            break;
        };
        match res {
            Ok((idx, Ok(outcome))) => slots[idx] = Some(outcome),
            Ok((_, Err(e))) => {
                stopped = true;
                fault.get_or_insert(e);
            }
            Err(e) => {
                stopped = true;
                fault.get_or_insert(BatchError::TaskJoin(e));
            }
        }
    }

    let result = assemble(ids, slots);
    tracing::debug!(
        succeeded = result.succeeded(),
        failed = result.failed(),
        not_dispatched = result.not_dispatched().len(),
        "batch finished"
    );
    match fault {
        Some(e) => Err(BatchError::Interrupted {
            completed: Box::new(result),
            source: Box::new(e),
        }),
        None => Ok(result),
    }
}

/// Pair outcomes with their ids in input order; ids without one are listed as not dispatched.
fn assemble(ids: Vec<String>, slots: Vec<Option<RequestOutcome>>) -> BatchResult {
    let mut outcomes = Vec::with_capacity(ids.len());
    let mut not_dispatched = Vec::new();
    for (id, slot) in ids.into_iter().zip(slots) {
        match slot {
            Some(outcome) => outcomes.push((id, outcome)),
            None => not_dispatched.push(id),
        }
    }
    BatchResult::new(outcomes, not_dispatched)
}
