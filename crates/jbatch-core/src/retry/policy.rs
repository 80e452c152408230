use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Classified reason a request failed.
///
/// Every failed call resolves to exactly one kind. Callers map HTTP status
/// codes and transport failures into these via `retry::classify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Request was rejected as malformed (400, 409, 422).
    Validation,
    /// Credentials missing or invalid (401).
    Authentication,
    /// Authenticated but not allowed (403).
    PermissionDenied,
    /// Resource does not exist (404, 410).
    NotFound,
    /// Server asked us to slow down (429), optionally with a `Retry-After` hint.
    RateLimited { retry_after: Option<Duration> },
    /// Any 5xx response.
    ServerError,
    /// DNS, connect, reset, or timeout before a response arrived.
    NetworkError,
    /// Anything else, including unmapped statuses and garbled responses.
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authentication => "authentication",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::NotFound => "not_found",
            ErrorKind::RateLimited { .. } => "rate_limited",
            ErrorKind::ServerError => "server_error",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Kinds that are worth retrying at all. The policy narrows this further
    /// by status code.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited { .. } | ErrorKind::ServerError | ErrorKind::NetworkError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Reason a `RetryPolicy` was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("backoff_multiplier must be greater than 1 (got {0})")]
    Multiplier(f64),
    #[error("jitter_fraction must be within 0..=1 (got {0})")]
    Jitter(f64),
}

/// Exponential backoff policy with jitter and a hard delay cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay before the second attempt, before jitter.
    pub base_delay_ms: u64,
    /// Growth factor per attempt.
    pub backoff_multiplier: f64,
    /// Upper bound on any delay between attempts.
    pub max_delay_ms: u64,
    /// Multiplicative jitter range: delay * [1 - j, 1 + j].
    pub jitter_fraction: f64,
    /// HTTP statuses that may be retried. Network failures are always retryable.
    pub retryable_status_codes: BTreeSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter_fraction: 0.1,
            retryable_status_codes: [429, 500, 502, 503, 504].into_iter().collect(),
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        if self.backoff_multiplier.is_nan()
            || self.backoff_multiplier <= 1.0
            || !self.backoff_multiplier.is_finite()
        {
            return Err(PolicyError::Multiplier(self.backoff_multiplier));
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(PolicyError::Jitter(self.jitter_fraction));
        }
        Ok(())
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Whether a failure of `kind` (with the response status, if one arrived)
    /// may be retried under this policy.
    pub fn is_retryable(&self, kind: &ErrorKind, status: Option<u16>) -> bool {
        if !kind.is_retryable() {
            return false;
        }
        match (kind, status) {
            (ErrorKind::NetworkError, _) => true,
            (_, Some(code)) => self.retryable_status_codes.contains(&code),
            (_, None) => false,
        }
    }

    /// Un-jittered backoff before attempt `attempt + 1`, capped at `max_delay_ms`.
    ///
    /// `attempt` is 1-based (1 = the attempt that just failed).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exp);
        let capped = if raw.is_finite() {
            raw.min(self.max_delay_ms as f64)
        } else {
            self.max_delay_ms as f64
        };
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Apply jitter to `delay`. `sample` is drawn from `[-1, 1]`; the result
    /// never exceeds `max_delay_ms`.
    pub fn jittered(&self, delay: Duration, sample: f64) -> Duration {
        let factor = 1.0 + self.jitter_fraction * sample.clamp(-1.0, 1.0);
        delay.mul_f64(factor.max(0.0)).min(self.max_delay())
    }

    /// Decide whether to retry after `attempt` failed with `kind`.
    ///
    /// A `retry_after` hint on a rate-limited failure replaces the computed
    /// delay when it is longer, still bounded by `max_delay_ms`.
    pub fn decide<R: Rng>(
        &self,
        attempt: u32,
        kind: &ErrorKind,
        status: Option<u16>,
        rng: &mut R,
    ) -> RetryDecision {
        if attempt >= self.max_attempts || !self.is_retryable(kind, status) {
            return RetryDecision::NoRetry;
        }

        let mut delay = self.jittered(self.backoff(attempt), rng.random_range(-1.0..=1.0));
        if let ErrorKind::RateLimited {
            retry_after: Some(hint),
        } = kind
        {
            if *hint > delay {
                delay = (*hint).min(self.max_delay());
            }
        }
        RetryDecision::RetryAfter(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 20,
            base_delay_ms: 100,
            backoff_multiplier: 2.0,
            max_delay_ms: 5_000,
            jitter_fraction: 0.5,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn no_retry_for_client_errors() {
        let p = RetryPolicy::default();
        let mut rng = rand::rng();
        for kind in [
            ErrorKind::Validation,
            ErrorKind::Authentication,
            ErrorKind::PermissionDenied,
            ErrorKind::NotFound,
            ErrorKind::Unknown,
        ] {
            assert_eq!(p.decide(1, &kind, Some(400), &mut rng), RetryDecision::NoRetry);
        }
    }

    #[test]
    fn server_errors_follow_status_set() {
        let p = RetryPolicy::default();
        assert!(p.is_retryable(&ErrorKind::ServerError, Some(503)));
        assert!(!p.is_retryable(&ErrorKind::ServerError, Some(501)));
        assert!(p.is_retryable(&ErrorKind::RateLimited { retry_after: None }, Some(429)));
        assert!(p.is_retryable(&ErrorKind::NetworkError, None));
    }

    #[test]
    fn exponential_backoff_grows_and_is_capped() {
        let p = fast_policy();
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(400));
        assert_eq!(p.backoff(10), p.max_delay());
        assert_eq!(p.backoff(u32::MAX), p.max_delay());
    }

    #[test]
    fn jittered_delay_never_exceeds_cap() {
        let p = fast_policy();
        let mut rng = rand::rng();
        for attempt in 1..p.max_attempts {
            for _ in 0..50 {
                match p.decide(attempt, &ErrorKind::ServerError, Some(503), &mut rng) {
                    RetryDecision::RetryAfter(d) => assert!(d <= p.max_delay()),
                    RetryDecision::NoRetry => panic!("expected retry at attempt {attempt}"),
                }
            }
        }
        assert_eq!(p.jittered(p.max_delay(), 1.0), p.max_delay());
        assert_eq!(
            p.jittered(Duration::from_millis(1000), -1.0),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn retry_after_hint_overrides_but_stays_capped() {
        let p = fast_policy();
        let mut rng = rand::rng();
        let kind = ErrorKind::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(
            p.decide(1, &kind, Some(429), &mut rng),
            RetryDecision::RetryAfter(Duration::from_secs(2))
        );
        let huge = ErrorKind::RateLimited {
            retry_after: Some(Duration::from_secs(600)),
        };
        assert_eq!(
            p.decide(1, &huge, Some(429), &mut rng),
            RetryDecision::RetryAfter(p.max_delay())
        );
    }

    #[test]
    fn respects_max_attempts() {
        let p = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        let mut rng = rand::rng();
        let kind = ErrorKind::ServerError;
        assert!(matches!(
            p.decide(1, &kind, Some(500), &mut rng),
            RetryDecision::RetryAfter(_)
        ));
        assert!(matches!(
            p.decide(2, &kind, Some(500), &mut rng),
            RetryDecision::RetryAfter(_)
        ));
        assert_eq!(p.decide(3, &kind, Some(500), &mut rng), RetryDecision::NoRetry);
    }

    #[test]
    fn validate_rejects_bad_policies() {
        assert!(RetryPolicy::default().validate().is_ok());
        let p = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(p.validate(), Err(PolicyError::ZeroAttempts));
        let p = RetryPolicy {
            backoff_multiplier: 1.0,
            ..RetryPolicy::default()
        };
        assert_eq!(p.validate(), Err(PolicyError::Multiplier(1.0)));
        let p = RetryPolicy {
            jitter_fraction: 1.5,
            ..RetryPolicy::default()
        };
        assert_eq!(p.validate(), Err(PolicyError::Jitter(1.5)));
    }

    #[test]
    fn base_delay_above_cap_is_clamped() {
        let p = RetryPolicy {
            base_delay_ms: 10,
            max_delay_ms: 5,
            ..RetryPolicy::default()
        };
        assert!(p.validate().is_ok());
        assert_eq!(p.backoff(1), Duration::from_millis(5));
        let mut rng = rand::rng();
        for _ in 0..20 {
            match p.decide(1, &ErrorKind::ServerError, Some(503), &mut rng) {
                RetryDecision::RetryAfter(d) => assert!(d <= Duration::from_millis(5)),
                RetryDecision::NoRetry => panic!("expected a retry"),
            }
        }
    }
}
