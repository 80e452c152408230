//! Classify HTTP statuses and transport failures into error kinds.
//!
//! This is the single source of truth for what a failure means; retry
//! decisions downstream only look at the resulting `ErrorKind`.

use std::time::Duration;

use crate::retry::policy::ErrorKind;
use crate::transport::{HttpResponse, TransportError};

/// Classify an HTTP status code. `retry_after` is only kept for 429.
///
/// Total over all codes: anything without a specific meaning (including
/// 1xx/2xx/3xx, which the executor never hands in as failures) is `Unknown`.
pub fn classify_http_status(code: u16, retry_after: Option<Duration>) -> ErrorKind {
    match code {
        400 | 409 | 422 => ErrorKind::Validation,
        401 => ErrorKind::Authentication,
        403 => ErrorKind::PermissionDenied,
        404 | 410 => ErrorKind::NotFound,
        429 => ErrorKind::RateLimited { retry_after },
        500..=599 => ErrorKind::ServerError,
        _ => ErrorKind::Unknown,
    }
}

/// Classify a failure that happened before a response arrived.
pub fn classify_transport_error(e: &TransportError) -> ErrorKind {
    match e {
        TransportError::Timeout
        | TransportError::Connect
        | TransportError::Dns
        | TransportError::Reset => ErrorKind::NetworkError,
        TransportError::Malformed(_) | TransportError::Other(_) => ErrorKind::Unknown,
    }
}

/// Classify one transport outcome.
pub fn classify(result: &Result<HttpResponse, TransportError>) -> ErrorKind {
    match result {
        Ok(resp) => classify_http_status(resp.status, resp.retry_after()),
        Err(e) => classify_transport_error(e),
    }
}
