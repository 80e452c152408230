//! HTTP transport seam.
//!
//! The executor talks to the remote API only through [`Transport`], a
//! blocking interface that is driven from `tokio::task::spawn_blocking`.
//! [`CurlTransport`] is the production implementation; tests script their own.

mod curl_transport;

pub use curl_transport::{CurlTransport, Credentials};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// HTTP method of an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully resolved request, ready for the wire.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL including the query string.
    pub url: String,
    /// Serialized JSON body, if any.
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

/// Raw response as received: status, header lines, and body bytes.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First value of header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }

    /// `Retry-After` in its delta-seconds form. HTTP-date values are ignored.
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("retry-after")?
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }
}

/// Failure before a complete HTTP response was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connect or transfer timed out.
    Timeout,
    /// TCP/TLS connection could not be established.
    Connect,
    /// Host or proxy name did not resolve.
    Dns,
    /// Connection dropped mid-exchange (send/recv error, empty reply, short body).
    Reset,
    /// Server replied with something that is not HTTP.
    Malformed(String),
    /// Any other transport failure.
    Other(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "request timed out"),
            TransportError::Connect => write!(f, "could not connect"),
            TransportError::Dns => write!(f, "could not resolve host"),
            TransportError::Reset => write!(f, "connection reset"),
            TransportError::Malformed(msg) => write!(f, "malformed response: {}", msg),
            TransportError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

/// Sends one HTTP request and waits for the full response.
///
/// Implementations must be safe to call from many blocking-pool threads at
/// once; any connection reuse is internal to the implementation.
pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(headers: &[&str]) -> HttpResponse {
        HttpResponse {
            status: 429,
            headers: headers.iter().map(|h| h.to_string()).collect(),
            body: Vec::new(),
        }
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let r = response(&["HTTP/1.1 429 Too Many Requests", "Content-Type: application/json"]);
        assert_eq!(r.header("content-type"), Some("application/json"));
        assert_eq!(r.header("x-missing"), None);
    }

    #[test]
    fn retry_after_seconds() {
        assert_eq!(
            response(&["Retry-After: 7"]).retry_after(),
            Some(Duration::from_secs(7))
        );
        assert_eq!(
            response(&["Retry-After: Wed, 21 Oct 2015 07:28:00 GMT"]).retry_after(),
            None
        );
        assert_eq!(response(&[]).retry_after(), None);
    }

    #[test]
    fn success_range() {
        let mut r = HttpResponse::default();
        r.status = 204;
        assert!(r.is_success());
        r.status = 302;
        assert!(!r.is_success());
    }
}
