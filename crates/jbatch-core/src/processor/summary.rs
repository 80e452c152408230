//! Job summary and per-chunk progress reports.

use crate::checkpoint::{Checkpoint, RecordedOutcome};
use crate::retry::ErrorKind;

/// Snapshot sent after each persisted chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgress {
    pub job_id: String,
    /// 0-based index of the chunk just persisted.
    pub chunk_index: usize,
    /// Input items examined so far in this run.
    pub items_seen: usize,
    /// Totals over the whole checkpoint.
    pub succeeded: usize,
    pub failed: usize,
}

/// Why one item failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub item_id: String,
    pub kind: ErrorKind,
    pub message: String,
    pub attempts: u32,
}

/// Result of one `process` call, computed from the checkpoint over the
/// input items examined in this run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub job_id: String,
    pub succeeded: usize,
    pub failed: usize,
    /// Items taken from the input that have no recorded outcome (cancelled run).
    pub skipped: usize,
    /// Failed items in input order.
    pub failures: Vec<ItemFailure>,
    /// True when the run reached the end of the input.
    pub completed: bool,
}

impl BatchSummary {
    pub(crate) fn from_checkpoint(checkpoint: &Checkpoint, item_ids: &[String], completed: bool) -> Self {
        let mut summary = BatchSummary {
            job_id: checkpoint.job_id.clone(),
            succeeded: 0,
            failed: 0,
            skipped: 0,
            failures: Vec::new(),
            completed,
        };
        for id in item_ids {
            match checkpoint.outcome(id) {
                Some(RecordedOutcome::Succeeded { .. }) => summary.succeeded += 1,
                Some(RecordedOutcome::Failed {
                    kind,
                    message,
                    attempts,
                }) => {
                    summary.failed += 1;
                    summary.failures.push(ItemFailure {
                        item_id: id.clone(),
                        kind: *kind,
                        message: message.clone(),
                        attempts: *attempts,
                    });
                }
                None => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}
