//! Retrying request executor.
//!
//! Executes one `RequestDescriptor` to completion or exhaustion: resolves the
//! URL, optionally serves idempotent reads from the TTL cache, then drives
//! the transport through the shared retry loop. Ordinary failures come back
//! as `RequestOutcome::Failure`; only misuse (bad policy, unresolvable URL)
//! is an `Err`.

mod message;

pub use message::sanitize;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::config::JbatchConfig;
use crate::error::BatchError;
use crate::request::{RequestDescriptor, RequestOutcome};
use crate::retry::{self, RetryPolicy, RetryRun};
use crate::transport::{CurlTransport, HttpRequest, Transport, TransportError};

/// Successful response as kept in the TTL cache.
#[derive(Debug, Serialize, Deserialize)]
struct CachedResponse {
    status: u16,
    body: Value,
}

/// Stateless apart from the shared transport (connection pool) and optional
/// cache handle; safe to share across concurrent tasks behind an `Arc`.
pub struct Executor {
    transport: Arc<dyn Transport>,
    base_url: String,
    policy: RetryPolicy,
    timeout: Duration,
    cache: Option<TtlCache>,
}

impl Executor {
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        policy: RetryPolicy,
    ) -> Result<Self, BatchError> {
        policy.validate()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            transport,
            base_url,
            policy,
            timeout: Duration::from_secs(30),
            cache: None,
        })
    }

    /// Build a curl-backed executor from configuration.
    pub fn from_config(cfg: &JbatchConfig) -> Result<Self> {
        let transport = CurlTransport::new(cfg.credentials())
            .with_connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .with_max_idle(cfg.concurrency);
        let executor = Executor::new(Arc::new(transport), &cfg.base_url, cfg.retry_policy()?)?
            .with_timeout(Duration::from_secs(cfg.timeout_secs));
        Ok(executor)
    }

    /// Default per-request timeout (descriptors may override).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable the response cache for descriptors marked `cached`.
    pub fn with_cache(mut self, cache: TtlCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Reject descriptors that can never be sent (bad policy override or URL).
    pub fn check(&self, desc: &RequestDescriptor) -> Result<(), BatchError> {
        if let Some(policy) = &desc.policy {
            policy.validate()?;
        }
        desc.resolve_url(&self.base_url)?;
        Ok(())
    }

    /// Run one descriptor through the retry loop.
    pub async fn execute(&self, desc: &RequestDescriptor) -> Result<RequestOutcome, BatchError> {
        let policy = desc.policy.as_ref().unwrap_or(&self.policy);
        policy.validate()?;
        let url = desc.resolve_url(&self.base_url)?;
        let body = desc.body.as_ref().map(serde_json::to_vec).transpose()?;

        if let Some(hit) = self.cache_lookup(desc).await {
            tracing::debug!(id = %desc.correlation_id, "served from cache");
            return Ok(hit);
        }

        let request = Arc::new(HttpRequest {
            method: desc.method,
            url: url.to_string(),
            body,
            timeout: desc.timeout.unwrap_or(self.timeout),
        });
        let run = retry::run_with_retry(policy, |_attempt| {
            let transport = Arc::clone(&self.transport);
            let request = Arc::clone(&request);
            async move {
                tokio::task::spawn_blocking(move || transport.send(&request))
                    .await
                    .unwrap_or_else(|e| {
                        Err(TransportError::Other(format!("transport task failed: {}", e)))
                    })
            }
        })
        .await;

        let outcome = into_outcome(run);
        match &outcome {
            RequestOutcome::Success { status, body, attempts, .. } => {
                tracing::debug!(id = %desc.correlation_id, status, attempts, "request succeeded");
                self.cache_store(desc, *status, body).await;
            }
            RequestOutcome::Failure { kind, status, attempts, message } => {
                tracing::warn!(
                    id = %desc.correlation_id,
                    kind = %kind,
                    status = ?status,
                    attempts,
                    "request failed: {}",
                    message
                );
            }
        }
        Ok(outcome)
    }

    async fn cache_lookup(&self, desc: &RequestDescriptor) -> Option<RequestOutcome> {
        let (cache, directive) = self.cache.as_ref().zip(desc.cache_directive())?;
        match cache.get_json::<CachedResponse>(&directive.key).await {
            Ok(Some(CachedResponse { status, body })) => Some(RequestOutcome::Success {
                status,
                body,
                attempts: 0,
                cached: true,
            }),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key = %directive.key, "cache read failed, bypassing: {:#}", e);
                None
            }
        }
    }

    async fn cache_store(&self, desc: &RequestDescriptor, status: u16, body: &Value) {
        let Some((cache, directive)) = self.cache.as_ref().zip(desc.cache_directive()) else {
            return;
        };
        let entry = CachedResponse {
            status,
            body: body.clone(),
        };
        if let Err(e) = cache.set_json(&directive.key, &entry, directive.ttl).await {
            tracing::warn!(key = %directive.key, "cache write failed: {:#}", e);
        }
    }
}

fn into_outcome(run: RetryRun) -> RequestOutcome {
    let attempts = run.attempts;
    match (run.result, run.kind) {
        (Ok(resp), None) => RequestOutcome::Success {
            status: resp.status,
            body: decode_body(&resp.body),
            attempts,
            cached: false,
        },
        (Ok(resp), Some(kind)) => RequestOutcome::Failure {
            kind,
            message: message::response_message(&resp),
            status: Some(resp.status),
            attempts,
        },
        (Err(e), kind) => RequestOutcome::Failure {
            kind: kind.unwrap_or_else(|| retry::classify_transport_error(&e)),
            message: message::transport_message(&e),
            status: None,
            attempts,
        },
    }
}

/// Empty bodies (e.g. 204) become `null`; non-JSON text is kept as a string.
fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
