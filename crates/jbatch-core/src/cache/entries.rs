//! Entry operations: get, set, evict, sweep, namespace clear.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::Row;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::db::{unix_millis, TtlCache};
use super::types::{CacheEntry, CacheStats};

/// Whole milliseconds, rounded up so any non-zero TTL keeps the entry.
fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_micros().div_ceil(1000)).unwrap_or(i64::MAX)
}

impl TtlCache {
    /// Live value for `key`, or `None` if missing or expired.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.get_at(key, unix_millis()).await
    }

    pub(crate) async fn get_at(&self, key: &str, now_ms: i64) -> Result<Option<String>> {
        Ok(self.get_entry_at(key, now_ms).await?.map(|e| e.value))
    }

    /// Live entry for `key` with its timestamps.
    pub async fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.get_entry_at(key, unix_millis()).await
    }

    pub(crate) async fn get_entry_at(&self, key: &str, now_ms: i64) -> Result<Option<CacheEntry>> {
        let row = sqlx::query(
            r#"
            SELECT key, value, created_at, expires_at
            FROM cache_entries
            WHERE key = ?1 AND expires_at > ?2
            "#,
        )
        .bind(key)
        .bind(now_ms)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(CacheEntry {
            key: row.get("key"),
            value: row.get("value"),
            created_at: row.get("created_at"),
            expires_at: row.get("expires_at"),
        }))
    }

    /// Live value for `key`, deserialized from JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .await?
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .with_context(|| format!("decoding cache entry {}", key))
    }

    /// Store `value` under `key` for `ttl`, replacing any previous value.
    ///
    /// A zero TTL stores nothing and evicts any existing entry, so the key
    /// reads as absent immediately.
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.set_at(key, value, ttl, unix_millis()).await
    }

    pub(crate) async fn set_at(&self, key: &str, value: &str, ttl: Duration, now_ms: i64) -> Result<()> {
        let ttl_ms = ttl_millis(ttl);
        if ttl_ms == 0 {
            self.evict(key).await?;
            return Ok(());
        }
        let expires_at = now_ms.saturating_add(ttl_ms);

        // Single statement: concurrent readers see the old row or the new one.
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now_ms)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store `value` as JSON under `key` for `ttl`.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.set(key, &json, ttl).await
    }

    /// Remove `key`. Returns true if a row was deleted.
    pub async fn evict(&self, key: &str) -> Result<bool> {
        let r = sqlx::query(
            r#"
            DELETE FROM cache_entries
            WHERE key = ?1
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() > 0)
    }

    /// Delete every expired row. Returns the number reclaimed.
    pub async fn sweep(&self) -> Result<u64> {
        self.sweep_at(unix_millis()).await
    }

    pub(crate) async fn sweep_at(&self, now_ms: i64) -> Result<u64> {
        let r = sqlx::query(
            r#"
            DELETE FROM cache_entries
            WHERE expires_at <= ?1
            "#,
        )
        .bind(now_ms)
        .execute(&self.pool)
        .await?;
        let n = r.rows_affected();
        if n > 0 {
            tracing::debug!(removed = n, "swept expired cache entries");
        }
        Ok(n)
    }

    /// Delete every entry whose key starts with `prefix` (live or expired).
    pub async fn clear_namespace(&self, prefix: &str) -> Result<u64> {
        // substr() instead of LIKE so `%` and `_` in keys are literal.
        let r = sqlx::query(
            r#"
            DELETE FROM cache_entries
            WHERE substr(key, 1, length(?1)) = ?1
            "#,
        )
        .bind(prefix)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }

    /// Push the expiry of every live entry under `prefix` to `ttl` from now.
    /// Returns the number of rows refreshed.
    pub async fn touch_namespace(&self, prefix: &str, ttl: Duration) -> Result<u64> {
        self.touch_namespace_at(prefix, ttl, unix_millis()).await
    }

    pub(crate) async fn touch_namespace_at(&self, prefix: &str, ttl: Duration, now_ms: i64) -> Result<u64> {
        let expires_at = now_ms.saturating_add(ttl_millis(ttl));
        let r = sqlx::query(
            r#"
            UPDATE cache_entries
            SET expires_at = ?2
            WHERE substr(key, 1, length(?1)) = ?1 AND expires_at > ?3
            "#,
        )
        .bind(prefix)
        .bind(expires_at)
        .bind(now_ms)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }

    /// Live keys starting with `prefix`, sorted.
    pub async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT key FROM cache_entries
            WHERE substr(key, 1, length(?1)) = ?1 AND expires_at > ?2
            ORDER BY key ASC
            "#,
        )
        .bind(prefix)
        .bind(unix_millis())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|row| row.get("key")).collect())
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN expires_at > ?1 THEN 1 ELSE 0 END), 0) AS live,
                COALESCE(SUM(CASE WHEN expires_at <= ?1 THEN 1 ELSE 0 END), 0) AS expired
            FROM cache_entries
            "#,
        )
        .bind(unix_millis())
        .fetch_one(&self.pool)
        .await?;
        let live: i64 = row.get("live");
        let expired: i64 = row.get("expired");
        Ok(CacheStats {
            entries: live.max(0) as u64,
            expired: expired.max(0) as u64,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        })
    }
}
