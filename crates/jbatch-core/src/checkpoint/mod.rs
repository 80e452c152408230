//! Durable job progress, persisted in the TTL cache.
//!
//! A checkpoint records one outcome per processed item plus a cursor: the
//! number of input items covered by fully completed chunks. It is stored as
//! a small header under `checkpoint:<job_id>` and one record segment per
//! saved chunk under `checkpoint:<job_id>#<seq>`, so each save writes only
//! what changed. Checkpoints are kept after the job finishes so a rerun is
//! a no-op.

mod store;

pub use store::CheckpointStore;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::request::RequestOutcome;
use crate::retry::ErrorKind;

/// Default retention after the last update.
pub const DEFAULT_CHECKPOINT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Persisted form of an item's terminal outcome (no response body).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RecordedOutcome {
    Succeeded {
        status: u16,
        attempts: u32,
    },
    Failed {
        kind: ErrorKind,
        message: String,
        attempts: u32,
    },
}

impl RecordedOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RecordedOutcome::Succeeded { .. })
    }
}

impl From<&RequestOutcome> for RecordedOutcome {
    fn from(outcome: &RequestOutcome) -> Self {
        match outcome {
            RequestOutcome::Success {
                status, attempts, ..
            } => RecordedOutcome::Succeeded {
                status: *status,
                attempts: *attempts,
            },
            RequestOutcome::Failure {
                kind,
                message,
                attempts,
                ..
            } => RecordedOutcome::Failed {
                kind: *kind,
                message: message.clone(),
                attempts: *attempts,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item_id: String,
    pub outcome: RecordedOutcome,
}

/// Stored header of a checkpoint; also what `CheckpointStore::list` returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub job_id: String,
    pub cursor: usize,
    pub finished: bool,
    /// Unix milliseconds of the last save.
    pub updated_at: i64,
    pub succeeded: usize,
    pub failed: usize,
    /// Record segments written so far.
    pub segments: u32,
}

/// In-memory checkpoint with an id index, so lookups and records are O(1).
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub job_id: String,
    /// Input items covered by completed chunks.
    pub cursor: usize,
    pub finished: bool,
    /// Unix milliseconds of the last save.
    pub updated_at: i64,
    /// One record per item id, in first-processed order.
    records: Vec<ItemRecord>,
    positions: HashMap<String, usize>,
    succeeded: usize,
    /// Indexes into `records` changed since the last save.
    unsaved: Vec<usize>,
    segments: u32,
}

impl Checkpoint {
    pub fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            cursor: 0,
            finished: false,
            updated_at: 0,
            records: Vec::new(),
            positions: HashMap::new(),
            succeeded: 0,
            unsaved: Vec::new(),
            segments: 0,
        }
    }

    /// Rebuild from a stored header and its segments, oldest first.
    pub(crate) fn restore(info: &CheckpointInfo, records: impl IntoIterator<Item = ItemRecord>) -> Self {
        let mut cp = Checkpoint::new(&info.job_id);
        cp.cursor = info.cursor;
        cp.finished = info.finished;
        cp.updated_at = info.updated_at;
        cp.segments = info.segments;
        for record in records {
            cp.apply(record.item_id, record.outcome);
        }
        cp
    }

    /// Latest outcome for `item_id`.
    pub fn outcome(&self, item_id: &str) -> Option<&RecordedOutcome> {
        self.positions.get(item_id).map(|&i| &self.records[i].outcome)
    }

    /// Insert or replace the record for `item_id` (a retry-failed pass
    /// overwrites the earlier failure).
    pub fn record(&mut self, item_id: &str, outcome: RecordedOutcome) {
        let idx = self.apply(item_id.to_string(), outcome);
        self.unsaved.push(idx);
    }

    /// Record a chunk's outcomes.
    pub fn record_all(&mut self, outcomes: impl IntoIterator<Item = (String, RecordedOutcome)>) {
        for (item_id, outcome) in outcomes {
            let idx = self.apply(item_id, outcome);
            self.unsaved.push(idx);
        }
    }

    fn apply(&mut self, item_id: String, outcome: RecordedOutcome) -> usize {
        let success = outcome.is_success();
        let idx = match self.positions.get(&item_id) {
            Some(&i) => {
                if self.records[i].outcome.is_success() {
                    self.succeeded -= 1;
                }
                self.records[i].outcome = outcome;
                i
            }
            None => {
                let i = self.records.len();
                self.positions.insert(item_id.clone(), i);
                self.records.push(ItemRecord { item_id, outcome });
                i
            }
        };
        if success {
            self.succeeded += 1;
        }
        idx
    }

    pub fn records(&self) -> &[ItemRecord] {
        &self.records
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.records.len() - self.succeeded
    }

    /// True when records changed since the last save.
    pub fn has_unsaved(&self) -> bool {
        !self.unsaved.is_empty()
    }

    pub fn info(&self) -> CheckpointInfo {
        CheckpointInfo {
            job_id: self.job_id.clone(),
            cursor: self.cursor,
            finished: self.finished,
            updated_at: self.updated_at,
            succeeded: self.succeeded(),
            failed: self.failed(),
            segments: self.segments,
        }
    }

    /// Records changed since the last save, each once, in record order.
    pub(crate) fn unsaved_records(&self) -> Vec<ItemRecord> {
        let mut idx = self.unsaved.clone();
        idx.sort_unstable();
        idx.dedup();
        idx.into_iter().map(|i| self.records[i].clone()).collect()
    }

    pub(crate) fn mark_saved(&mut self, segments: u32) {
        self.unsaved.clear();
        self.segments = segments;
    }
}

/// `<operation>-<unix ms, hex>-<random>`, e.g. `transition-18c1f2a3b4d-5e2a`.
pub fn generate_job_id(operation: &str) -> String {
    let suffix: u16 = rand::random();
    format!(
        "{}-{:x}-{:04x}",
        operation,
        crate::cache::unix_millis(),
        suffix
    )
}
