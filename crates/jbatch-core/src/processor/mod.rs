//! Checkpointed batch processor.
//!
//! Consumes work items in fixed-size chunks. Each chunk is run through the
//! request batcher and its outcomes are persisted before the next chunk
//! starts, so an interrupted job resumes at chunk granularity and never
//! resubmits an item that already succeeded.

mod summary;

pub use summary::{BatchProgress, BatchSummary, ItemFailure};

use anyhow::Result;
use std::collections::HashSet;
use tokio::sync::mpsc;

use crate::batcher::{BatchResult, RequestBatcher};
use crate::checkpoint::{Checkpoint, CheckpointStore, RecordedOutcome};
use crate::control::AbortToken;
use crate::error::BatchError;
use crate::request::RequestDescriptor;

/// Something with a stable identity inside one job.
pub trait WorkItem {
    fn item_id(&self) -> String;
}

impl WorkItem for String {
    fn item_id(&self) -> String {
        self.clone()
    }
}

impl WorkItem for &str {
    fn item_id(&self) -> String {
        (*self).to_string()
    }
}

/// How recorded failures are treated on rerun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessMode {
    /// Only items with no recorded outcome are sent.
    #[default]
    Resume,
    /// Items recorded as failed are sent again too.
    RetryFailed,
}

#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub concurrency_limit: usize,
    /// Items per checkpointed chunk; 0 = `recommended_chunk_size` of the input size hint.
    pub chunk_size: usize,
    pub mode: ProcessMode,
    pub abort: Option<AbortToken>,
    /// Receives one report per persisted chunk. Reports are dropped if the channel is full.
    pub progress: Option<mpsc::Sender<BatchProgress>>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: 5,
            chunk_size: 0,
            mode: ProcessMode::Resume,
            abort: None,
            progress: None,
        }
    }
}

/// 10 for up to 100 items, 50 up to 1000, 100 beyond.
pub fn recommended_chunk_size(total: usize) -> usize {
    match total {
        0..=100 => 10,
        101..=1000 => 50,
        _ => 100,
    }
}

#[derive(Clone)]
pub struct BatchProcessor {
    batcher: RequestBatcher,
    store: CheckpointStore,
}

impl BatchProcessor {
    pub fn new(batcher: RequestBatcher, store: CheckpointStore) -> Self {
        Self { batcher, store }
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Run (or resume) `job_id` over `items`.
    ///
    /// Every descriptor from `item_to_request` is sent with the item id as its
    /// correlation id. Rerunning a finished job with the same input sends
    /// nothing and returns the same summary; clear the checkpoint to force a
    /// full rerun.
    pub async fn process<T, I, F>(
        &self,
        job_id: &str,
        items: I,
        mut item_to_request: F,
        opts: &ProcessOptions,
    ) -> Result<BatchSummary>
    where
        I: IntoIterator<Item = T>,
        T: WorkItem,
        F: FnMut(&T) -> RequestDescriptor,
    {
        let mut checkpoint = match self.store.load(job_id).await? {
            Some(cp) => {
                tracing::info!(
                    job_id,
                    cursor = cp.cursor,
                    recorded = cp.records().len(),
                    "resuming job from checkpoint"
                );
                cp
            }
            None => Checkpoint::new(job_id),
        };

        let mut items = items.into_iter();
        let chunk_size = match opts.chunk_size {
            0 => {
                let (lower, upper) = items.size_hint();
                recommended_chunk_size(upper.unwrap_or(lower))
            }
            n => n,
        };
        let abort = opts.abort.as_ref();

        let mut item_ids: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut exhausted = false;

        for chunk_index in 0.. {
            let chunk: Vec<T> = items.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                exhausted = true;
                break;
            }
            for item in &chunk {
                let id = item.item_id();
                if !seen.insert(id.clone()) {
                    return Err(BatchError::DuplicateItemId(id).into());
                }
                item_ids.push(id);
            }
            if abort.is_some_and(AbortToken::is_aborted) {
                tracing::info!(job_id, chunk_index, "job cancelled before chunk");
                break;
            }

            let first = item_ids.len() - chunk.len();
            let descriptors: Vec<RequestDescriptor> = chunk
                .iter()
                .zip(&item_ids[first..])
                .filter(|(_, id)| match checkpoint.outcome(id) {
                    None => true,
                    Some(RecordedOutcome::Succeeded { .. }) => false,
                    Some(RecordedOutcome::Failed { .. }) => opts.mode == ProcessMode::RetryFailed,
                })
                .map(|(item, id)| item_to_request(item).correlation_id(id.as_str()))
                .collect();

            let complete = if descriptors.is_empty() {
                true
            } else {
                let sent = descriptors.len();
                let result = match self.batcher.run(descriptors, opts.concurrency_limit, abort).await {
                    Ok(result) => result,
                    Err(BatchError::Interrupted { completed, source }) => {
                        // Keep what was applied remotely before surfacing the fault.
                        record_outcomes(&mut checkpoint, &completed);
                        self.store.save(&mut checkpoint).await?;
                        tracing::error!(job_id, chunk_index, recorded = completed.len(), "chunk stopped by a fault");
                        return Err(anyhow::Error::from(*source)
                            .context(format!("job {} stopped in chunk {}", job_id, chunk_index)));
                    }
                    Err(e) => return Err(e.into()),
                };
                record_outcomes(&mut checkpoint, &result);
                tracing::debug!(
                    job_id,
                    chunk_index,
                    sent,
                    succeeded = result.succeeded(),
                    failed = result.failed(),
                    "chunk finished"
                );
                result.is_complete()
            };

            let advanced = complete && item_ids.len() > checkpoint.cursor;
            if advanced {
                checkpoint.cursor = item_ids.len();
            }
            if advanced || checkpoint.has_unsaved() {
                self.store.save(&mut checkpoint).await?;
            }
            self.report(opts, &checkpoint, chunk_index, item_ids.len());

            if !complete {
                tracing::info!(job_id, chunk_index, "job cancelled mid-chunk");
                break;
            }
        }

        if exhausted && !checkpoint.finished {
            checkpoint.finished = true;
            self.store.save(&mut checkpoint).await?;
        }

        let summary = BatchSummary::from_checkpoint(&checkpoint, &item_ids, exhausted);
        tracing::info!(
            job_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            completed = summary.completed,
            "job finished"
        );
        Ok(summary)
    }

    fn report(&self, opts: &ProcessOptions, checkpoint: &Checkpoint, chunk_index: usize, items_seen: usize) {
        let Some(tx) = &opts.progress else {
            return;
        };
        let progress = BatchProgress {
            job_id: checkpoint.job_id.clone(),
            chunk_index,
            items_seen,
            succeeded: checkpoint.succeeded(),
            failed: checkpoint.failed(),
        };
        if tx.try_send(progress).is_err() {
            tracing::debug!(job_id = %checkpoint.job_id, chunk_index, "progress report dropped");
        }
    }
}

fn record_outcomes(checkpoint: &mut Checkpoint, result: &BatchResult) {
    checkpoint.record_all(
        result
            .iter()
            .map(|(id, outcome)| (id.to_string(), RecordedOutcome::from(outcome))),
    );
}
