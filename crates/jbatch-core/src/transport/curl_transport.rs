//! libcurl-backed transport with a small pool of reusable easy handles.
//!
//! libcurl keeps live connections, TLS sessions, and DNS results per easy
//! handle, so handing handles back to the pool after `reset()` gives
//! keep-alive reuse across requests without sharing a handle between threads.

use std::str;
use std::sync::Mutex;
use std::time::Duration;

use curl::easy::{Auth, Easy, List};

use super::{HttpRequest, HttpResponse, Method, Transport, TransportError};

/// Basic-auth credentials (account email + API token).
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub api_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("api_token", &"[REDACTED]")
            .finish()
    }
}

/// Production transport: one libcurl easy handle per in-flight request,
/// recycled through an internally synchronized idle pool.
pub struct CurlTransport {
    credentials: Option<Credentials>,
    connect_timeout: Duration,
    max_idle: usize,
    idle: Mutex<Vec<Easy>>,
}

impl CurlTransport {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            credentials,
            connect_timeout: Duration::from_secs(15),
            max_idle: 16,
            idle: Mutex::new(Vec::new()),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Upper bound on idle handles kept for reuse (normally the batch concurrency).
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle.max(1);
        self
    }

    fn checkout(&self) -> Easy {
        self.idle
            .lock()
            .ok()
            .and_then(|mut idle| idle.pop())
            .unwrap_or_else(Easy::new)
    }

    fn checkin(&self, mut easy: Easy) {
        easy.reset();
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < self.max_idle {
                idle.push(easy);
            }
        }
    }

    fn perform(&self, easy: &mut Easy, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        easy.url(&request.url)?;
        easy.signal(false)?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.timeout(request.timeout)?;

        match request.method {
            Method::Get => easy.get(true)?,
            Method::Post => easy.post(true)?,
            Method::Put => {
                easy.post(true)?;
                easy.custom_request("PUT")?;
            }
            Method::Delete => easy.custom_request("DELETE")?,
        }
        match (&request.body, request.method) {
            (Some(body), method) => {
                easy.post_fields_copy(body)?;
                // Attaching fields switches curl to POST; pin the verb.
                if method != Method::Post {
                    easy.custom_request(method.as_str())?;
                }
            }
            (None, Method::Post | Method::Put) => easy.post_fields_copy(&[])?,
            (None, _) => {}
        }

        let mut list = List::new();
        list.append("Accept: application/json")?;
        list.append("Content-Type: application/json")?;
        easy.http_headers(list)?;

        if let Some(creds) = &self.credentials {
            let mut auth = Auth::new();
            auth.basic(true);
            easy.http_auth(&auth)?;
            easy.username(&creds.email)?;
            easy.password(&creds.api_token)?;
        }

        let mut headers: Vec<String> = Vec::new();
        let mut body: Vec<u8> = Vec::new();
        {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    let line = s.trim_end();
                    if !line.is_empty() {
                        headers.push(line.to_string());
                    }
                }
                true
            })?;
            transfer.write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()?;
        }

        let status = easy.response_code()?;
        let status = u16::try_from(status)
            .map_err(|_| TransportError::Malformed(format!("status code {}", status)))?;
        if status == 0 {
            return Err(TransportError::Malformed("no status line".to_string()));
        }
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for CurlTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut easy = self.checkout();
        let result = self.perform(&mut easy, request);
        self.checkin(easy);
        result
    }
}

impl From<curl::Error> for TransportError {
    fn from(e: curl::Error) -> Self {
        if e.is_operation_timedout() {
            return TransportError::Timeout;
        }
        if e.is_couldnt_resolve_host() || e.is_couldnt_resolve_proxy() {
            return TransportError::Dns;
        }
        if e.is_couldnt_connect() {
            return TransportError::Connect;
        }
        if e.is_read_error()
            || e.is_recv_error()
            || e.is_send_error()
            || e.is_got_nothing()
            || e.is_partial_file()
        {
            return TransportError::Reset;
        }
        TransportError::Other(e.to_string())
    }
}
