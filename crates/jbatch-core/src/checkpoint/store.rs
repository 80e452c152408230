//! Checkpoint persistence on top of the TTL cache.

use anyhow::{Context, Result};
use std::time::Duration;

use super::{Checkpoint, CheckpointInfo, ItemRecord, DEFAULT_CHECKPOINT_TTL};
use crate::cache::TtlCache;

const PREFIX: &str = "checkpoint:";

#[derive(Clone)]
pub struct CheckpointStore {
    cache: TtlCache,
    ttl: Duration,
}

impl CheckpointStore {
    pub fn new(cache: TtlCache) -> Self {
        Self {
            cache,
            ttl: DEFAULT_CHECKPOINT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Key of the checkpoint header.
    pub fn key(job_id: &str) -> String {
        format!("{}{}", PREFIX, job_id)
    }

    fn segment_prefix(job_id: &str) -> String {
        format!("{}{}#", PREFIX, job_id)
    }

    fn segment_key(job_id: &str, seq: u32) -> String {
        format!("{}{:08}", Self::segment_prefix(job_id), seq)
    }

    fn is_segment_key(key: &str) -> bool {
        key.rsplit_once('#')
            .is_some_and(|(_, seq)| seq.len() == 8 && seq.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Read the header and every segment. Segments get the header's
    /// retention again so a resumed job never loses its early chunks.
    pub async fn load(&self, job_id: &str) -> Result<Option<Checkpoint>> {
        let info: Option<CheckpointInfo> = self
            .cache
            .get_json(&Self::key(job_id))
            .await
            .with_context(|| format!("load checkpoint for job {}", job_id))?;
        let Some(info) = info else {
            return Ok(None);
        };

        let mut records: Vec<ItemRecord> = Vec::new();
        for seq in 0..info.segments {
            let segment: Vec<ItemRecord> = self
                .cache
                .get_json(&Self::segment_key(job_id, seq))
                .await
                .with_context(|| format!("load checkpoint segment {} for job {}", seq, job_id))?
                .with_context(|| {
                    format!(
                        "checkpoint for job {} is missing segment {}; clear it to rerun the job",
                        job_id, seq
                    )
                })?;
            records.extend(segment);
        }
        self.cache
            .touch_namespace(&Self::segment_prefix(job_id), self.ttl)
            .await
            .with_context(|| format!("refresh checkpoint for job {}", job_id))?;
        Ok(Some(Checkpoint::restore(&info, records)))
    }

    /// Persist records changed since the last save as a new segment, then the
    /// header, stamping `updated_at`. Cost is independent of how many items
    /// the job has already recorded.
    pub async fn save(&self, checkpoint: &mut Checkpoint) -> Result<()> {
        checkpoint.updated_at = crate::cache::unix_millis();
        let mut info = checkpoint.info();
        let fresh = checkpoint.unsaved_records();
        if !fresh.is_empty() {
            self.cache
                .set_json(&Self::segment_key(&info.job_id, info.segments), &fresh, self.ttl)
                .await
                .with_context(|| format!("save checkpoint segment for job {}", info.job_id))?;
            info.segments += 1;
        }
        self.cache
            .set_json(&Self::key(&info.job_id), &info, self.ttl)
            .await
            .with_context(|| format!("save checkpoint for job {}", info.job_id))?;
        checkpoint.mark_saved(info.segments);
        Ok(())
    }

    /// Returns true if a checkpoint existed.
    pub async fn clear(&self, job_id: &str) -> Result<bool> {
        let existed = self.cache.evict(&Self::key(job_id)).await?;
        self.cache.clear_namespace(&Self::segment_prefix(job_id)).await?;
        Ok(existed)
    }

    /// Headers of all live checkpoints, by job id. Entries that no longer parse are skipped.
    pub async fn list(&self) -> Result<Vec<CheckpointInfo>> {
        let mut out = Vec::new();
        for key in self.cache.keys(PREFIX).await? {
            if Self::is_segment_key(&key) {
                continue;
            }
            match self.cache.get_json::<CheckpointInfo>(&key).await {
                Ok(Some(info)) => out.push(info),
                Ok(None) => {}
                Err(e) => tracing::warn!(key = %key, "unreadable checkpoint: {:#}", e),
            }
        }
        Ok(out)
    }

    /// Checkpoints of jobs that have not reached the end of their input.
    pub async fn list_pending(&self) -> Result<Vec<CheckpointInfo>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|info| !info.finished)
            .collect())
    }
}
