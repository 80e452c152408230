//! `jbatch cache` – sweep, clear or inspect the local TTL cache.

use anyhow::Result;
use jbatch_core::cache::TtlCache;

use crate::cli::CacheAction;

pub async fn run_cache(cache: &TtlCache, action: CacheAction) -> Result<()> {
    match action {
        CacheAction::Sweep => {
            let removed = cache.sweep().await?;
            println!("Removed {} expired entr{}.", removed, if removed == 1 { "y" } else { "ies" });
        }
        CacheAction::Clear { prefix } => {
            let removed = cache.clear_namespace(&prefix).await?;
            println!("Removed {} entr{} under '{}'.", removed, if removed == 1 { "y" } else { "ies" }, prefix);
        }
        CacheAction::Stats => {
            let stats = cache.stats().await?;
            println!("live entries:    {}", stats.entries);
            println!("expired entries: {}", stats.expired);
        }
    }
    Ok(())
}
