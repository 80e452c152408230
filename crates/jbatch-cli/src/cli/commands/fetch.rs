//! `jbatch fetch` – fetch issues concurrently, one JSON line per key.

use anyhow::Result;
use jbatch_core::batcher::RequestBatcher;
use jbatch_core::cache::TtlCache;
use jbatch_core::config::JbatchConfig;
use jbatch_core::executor::Executor;
use jbatch_core::request::RequestOutcome;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub async fn run_fetch(
    cfg: &JbatchConfig,
    cache: TtlCache,
    keys: &[String],
    fields: &[String],
    no_cache: bool,
    concurrency: Option<usize>,
) -> Result<()> {
    let mut executor = Executor::from_config(cfg)?;
    if !no_cache {
        executor = executor.with_cache(cache);
    }
    let batcher = RequestBatcher::new(Arc::new(executor));
    let ttl = Duration::from_secs(cfg.cache.default_ttl_secs);
    let result = batcher
        .fetch_issues(keys, fields, concurrency.unwrap_or(cfg.concurrency), ttl)
        .await?;

    for (key, outcome) in result.iter() {
        let line = match outcome {
            RequestOutcome::Success { body, cached, .. } => {
                json!({ "key": key, "cached": cached, "issue": body })
            }
            RequestOutcome::Failure {
                kind,
                message,
                status,
                attempts,
            } => json!({
                "key": key,
                "error": kind.as_str(),
                "status": status,
                "message": message,
                "attempts": attempts,
            }),
        };
        println!("{}", line);
    }
    if result.failed() > 0 {
        anyhow::bail!("{} of {} issue(s) could not be fetched", result.failed(), result.len());
    }
    Ok(())
}
