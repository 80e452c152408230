//! Retry loop: run an attempt until success or the policy says stop.

use std::future::Future;

use super::classify;
use super::policy::{ErrorKind, RetryDecision, RetryPolicy};
use crate::transport::{HttpResponse, TransportError};

/// Final state of a retried call.
#[derive(Debug)]
pub struct RetryRun {
    /// Last transport result (a 2xx response on success).
    pub result: Result<HttpResponse, TransportError>,
    /// Attempts made, `1..=policy.max_attempts`.
    pub attempts: u32,
    /// Classification of the last result when it was not a 2xx.
    pub kind: Option<ErrorKind>,
}

/// Runs `attempt_fn` until it yields a 2xx response or the retry policy says
/// to stop. On a retryable failure, suspends the calling task for the backoff
/// delay (sibling tasks keep running) and tries again.
///
/// `attempt_fn` receives the 1-based attempt number.
pub async fn run_with_retry<F, Fut>(policy: &RetryPolicy, mut attempt_fn: F) -> RetryRun
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<HttpResponse, TransportError>>,
{
    let mut attempt = 1u32;
    loop {
        let result = attempt_fn(attempt).await;
        if matches!(&result, Ok(resp) if resp.is_success()) {
            return RetryRun {
                result,
                attempts: attempt,
                kind: None,
            };
        }

        let kind = classify::classify(&result);
        let status = result.as_ref().ok().map(|r| r.status);
        let decision = policy.decide(attempt, &kind, status, &mut rand::rng());
        match decision {
            RetryDecision::NoRetry => {
                return RetryRun {
                    result,
                    attempts: attempt,
                    kind: Some(kind),
                };
            }
            RetryDecision::RetryAfter(delay) => {
                tracing::debug!(
                    attempt,
                    kind = %kind,
                    status = ?status,
                    delay_ms = delay.as_millis() as u64,
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
