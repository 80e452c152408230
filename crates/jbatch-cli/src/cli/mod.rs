//! CLI for the jbatch issue-tracker batch executor.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use jbatch_core::cache::TtlCache;
use jbatch_core::config::{self, JbatchConfig};

use commands::{run_cache, run_checkpoints, run_fetch, run_transition};

/// Top-level CLI for jbatch.
#[derive(Debug, Parser)]
#[command(name = "jbatch")]
#[command(about = "jbatch: resilient bulk operations against an issue-tracker REST API", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Fetch issues concurrently and print them as JSON lines.
    Fetch {
        /// Issue keys, e.g. PROJ-1 PROJ-2.
        #[arg(required = true)]
        keys: Vec<String>,
        /// Comma-separated fields to request (default: all).
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
        /// Bypass the response cache.
        #[arg(long)]
        no_cache: bool,
        /// Maximum requests in flight (default from config).
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,
    },

    /// Transition many issues as a resumable job.
    Transition {
        /// Job id to create or resume (generated if omitted).
        #[arg(long)]
        job: Option<String>,
        /// Transition id to apply.
        #[arg(long, value_name = "TID")]
        to: String,
        /// Re-send items that failed in a previous run of this job.
        #[arg(long)]
        retry_failed: bool,
        /// Items per checkpointed chunk (default from config).
        #[arg(long, value_name = "N")]
        chunk_size: Option<usize>,
        /// Maximum requests in flight (default from config).
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,
        /// Issue keys to transition.
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Inspect or clear job checkpoints.
    Checkpoints {
        #[command(subcommand)]
        action: CheckpointsAction,
    },

    /// Maintain the local TTL cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum CheckpointsAction {
    /// List stored checkpoints.
    List {
        /// Only jobs that have not reached the end of their input.
        #[arg(long)]
        pending: bool,
    },
    /// Delete a job's checkpoint so the next run starts over.
    Clear {
        /// Job identifier.
        job: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Remove expired entries.
    Sweep,
    /// Remove every entry whose key starts with PREFIX.
    Clear {
        prefix: String,
    },
    /// Show entry counts.
    Stats,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!(base_url = %cfg.base_url, concurrency = cfg.concurrency, "loaded config");
        let cache = open_cache(&cfg).await?;

        match cli.command {
            CliCommand::Fetch {
                keys,
                fields,
                no_cache,
                concurrency,
            } => run_fetch(&cfg, cache, &keys, &fields, no_cache, concurrency).await?,
            CliCommand::Transition {
                job,
                to,
                retry_failed,
                chunk_size,
                concurrency,
                keys,
            } => {
                let opts = commands::TransitionArgs {
                    job,
                    transition_id: to,
                    retry_failed,
                    chunk_size,
                    concurrency,
                };
                run_transition(&cfg, cache, keys, opts).await?
            }
            CliCommand::Checkpoints { action } => run_checkpoints(&cfg, cache, action).await?,
            CliCommand::Cache { action } => run_cache(&cache, action).await?,
        }

        Ok(())
    }
}

async fn open_cache(cfg: &JbatchConfig) -> Result<TtlCache> {
    match &cfg.cache.path {
        Some(path) => TtlCache::open_at(path).await,
        None => TtlCache::open_default().await,
    }
}

#[cfg(test)]
mod tests;
