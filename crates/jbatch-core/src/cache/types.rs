//! Types used by the TTL cache.

/// One stored row. Timestamps are Unix milliseconds; `expires_at > created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at <= now_ms
    }
}

/// Snapshot used by the CLI `cache stats` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Live (unexpired) rows.
    pub entries: u64,
    /// Expired rows not yet swept.
    pub expired: u64,
    /// Reads served by this process.
    pub hits: u64,
    /// Reads that found nothing live in this process.
    pub misses: u64,
}
