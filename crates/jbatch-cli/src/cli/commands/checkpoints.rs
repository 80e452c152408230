//! `jbatch checkpoints` – list or clear job checkpoints.

use anyhow::Result;
use jbatch_core::cache::TtlCache;
use jbatch_core::checkpoint::CheckpointStore;
use jbatch_core::config::JbatchConfig;
use std::time::Duration;

use crate::cli::CheckpointsAction;

pub async fn run_checkpoints(cfg: &JbatchConfig, cache: TtlCache, action: CheckpointsAction) -> Result<()> {
    let store = CheckpointStore::new(cache)
        .with_ttl(Duration::from_secs(cfg.cache.checkpoint_ttl_secs));
    match action {
        CheckpointsAction::List { pending } => {
            let checkpoints = if pending {
                store.list_pending().await?
            } else {
                store.list().await?
            };
            if checkpoints.is_empty() {
                println!("No checkpoints.");
                return Ok(());
            }
            println!("{:<36} {:<9} {:<8} {:<6} {}", "JOB", "STATE", "CURSOR", "OK", "FAILED");
            for cp in checkpoints {
                let state = if cp.finished { "finished" } else { "pending" };
                println!(
                    "{:<36} {:<9} {:<8} {:<6} {}",
                    cp.job_id,
                    state,
                    cp.cursor,
                    cp.succeeded,
                    cp.failed
                );
            }
        }
        CheckpointsAction::Clear { job } => {
            if store.clear(&job).await? {
                println!("Cleared checkpoint for job {}.", job);
            } else {
                println!("No checkpoint for job {}.", job);
            }
        }
    }
    Ok(())
}
