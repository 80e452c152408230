//! `jbatch transition` – apply a workflow transition to many issues as a
//! checkpointed job. Ctrl-C stops new requests; rerun with the same `--job`
//! to resume.

use anyhow::Result;
use jbatch_core::batcher::RequestBatcher;
use jbatch_core::cache::TtlCache;
use jbatch_core::checkpoint::{generate_job_id, CheckpointStore};
use jbatch_core::config::JbatchConfig;
use jbatch_core::control::JobControl;
use jbatch_core::executor::Executor;
use jbatch_core::ops;
use jbatch_core::processor::{BatchProcessor, BatchProgress, ProcessMode, ProcessOptions};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TransitionArgs {
    pub job: Option<String>,
    pub transition_id: String,
    pub retry_failed: bool,
    pub chunk_size: Option<usize>,
    pub concurrency: Option<usize>,
}

pub async fn run_transition(
    cfg: &JbatchConfig,
    cache: TtlCache,
    keys: Vec<String>,
    args: TransitionArgs,
) -> Result<()> {
    let executor = Executor::from_config(cfg)?;
    let store = CheckpointStore::new(cache)
        .with_ttl(Duration::from_secs(cfg.cache.checkpoint_ttl_secs));
    let processor = BatchProcessor::new(RequestBatcher::new(Arc::new(executor)), store);

    let job_id = args.job.unwrap_or_else(|| generate_job_id("transition"));
    println!("job {}", job_id);

    let control = Arc::new(JobControl::new());
    let abort = control.register(&job_id);
    let signal_control = Arc::clone(&control);
    let signal_handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupt received; finishing in-flight requests");
            signal_control.abort_all();
        }
    });

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel::<BatchProgress>(64);
    let progress_handle = tokio::spawn(async move {
        while let Some(p) = progress_rx.recv().await {
            println!(
                "  chunk {}: {} item(s) seen, {} ok, {} failed",
                p.chunk_index + 1,
                p.items_seen,
                p.succeeded,
                p.failed
            );
        }
    });

    let opts = ProcessOptions {
        concurrency_limit: args.concurrency.unwrap_or(cfg.concurrency),
        chunk_size: args.chunk_size.unwrap_or(cfg.chunk_size),
        mode: if args.retry_failed {
            ProcessMode::RetryFailed
        } else {
            ProcessMode::Resume
        },
        abort: Some(abort),
        progress: Some(progress_tx),
    };
    let transition_id = args.transition_id;
    let result = processor
        .process(
            &job_id,
            keys,
            |key: &String| ops::transition_issue(key, &transition_id, None),
            &opts,
        )
        .await;

    control.unregister(&job_id);
    signal_handle.abort();
    drop(opts);
    let _ = progress_handle.await;
    let summary = result?;

    for f in &summary.failures {
        println!(
            "  FAILED {} [{}] after {} attempt(s): {}",
            f.item_id, f.kind, f.attempts, f.message
        );
    }
    println!(
        "{} succeeded, {} failed, {} skipped",
        summary.succeeded, summary.failed, summary.skipped
    );
    if !summary.completed {
        println!("job {} interrupted; rerun with --job {} to resume", job_id, job_id);
    }
    if summary.failed > 0 {
        anyhow::bail!("{} item(s) failed; rerun with --retry-failed to try them again", summary.failed);
    }
    Ok(())
}
