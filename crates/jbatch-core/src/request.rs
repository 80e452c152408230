//! Request descriptors and per-request outcomes.
//!
//! A `RequestDescriptor` is an immutable description of one outbound call;
//! the executor turns it into zero or more HTTP attempts and reports a
//! `RequestOutcome`. Neither is persisted.

use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::error::BatchError;
use crate::retry::{ErrorKind, RetryPolicy};
use crate::transport::Method;

/// Serve an idempotent GET from the TTL cache under `key`, storing fresh
/// results for `ttl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDirective {
    pub key: String,
    pub ttl: Duration,
}

/// One logical API call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the configured base URL, e.g. `/rest/api/3/issue/PROJ-1`.
    pub path: String,
    /// Query parameters in the order they are sent.
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Overrides the executor's default request timeout.
    pub timeout: Option<Duration>,
    /// Overrides the executor's default retry policy.
    pub policy: Option<RetryPolicy>,
    /// Caller-chosen id used to match outcomes back; unique within a batch.
    pub correlation_id: String,
    pub cache: Option<CacheDirective>,
}

impl RequestDescriptor {
    /// New descriptor whose correlation id defaults to `"<METHOD> <path>"`.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            correlation_id: format!("{} {}", method, path),
            method,
            path,
            query: Vec::new(),
            body: None,
            timeout: None,
            policy: None,
            cache: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    /// Mark this request as cacheable. Ignored for anything but GET.
    pub fn cached(mut self, key: impl Into<String>, ttl: Duration) -> Self {
        self.cache = Some(CacheDirective {
            key: key.into(),
            ttl,
        });
        self
    }

    /// Cache directive that actually applies (GET only).
    pub fn cache_directive(&self) -> Option<&CacheDirective> {
        self.cache.as_ref().filter(|_| self.method == Method::Get)
    }

    /// Join `path` and `query` onto `base_url`. The base URL may carry a
    /// path prefix (e.g. a context path); it is kept.
    pub fn resolve_url(&self, base_url: &str) -> Result<Url, BatchError> {
        let joined = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        );
        let mut url = Url::parse(&joined).map_err(|source| BatchError::InvalidUrl {
            path: self.path.clone(),
            source,
        })?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }
}

/// Terminal result of one descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// 2xx response. `body` is `null` for empty responses; `attempts` is 0
    /// when served from the cache.
    Success {
        status: u16,
        body: Value,
        attempts: u32,
        cached: bool,
    },
    /// Retries exhausted or a non-retryable failure.
    Failure {
        kind: ErrorKind,
        message: String,
        /// Last HTTP status, if a response arrived at all.
        status: Option<u16>,
        attempts: u32,
    },
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RequestOutcome::Success { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RequestOutcome::Success { attempts, .. } | RequestOutcome::Failure { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            RequestOutcome::Failure { kind, .. } => Some(*kind),
            RequestOutcome::Success { .. } => None,
        }
    }

    pub fn body(&self) -> Option<&Value> {
        match self {
            RequestOutcome::Success { body, .. } => Some(body),
            RequestOutcome::Failure { .. } => None,
        }
    }
}
