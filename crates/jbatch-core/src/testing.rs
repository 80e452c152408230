//! Scripted transport shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::executor::Executor;
use crate::retry::RetryPolicy;
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};

pub(crate) const BASE_URL: &str = "https://test.atlassian.net";

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Status(u16, &'static str),
    Response(HttpResponse),
    Error(TransportError),
}

impl Reply {
    fn into_result(self) -> Result<HttpResponse, TransportError> {
        match self {
            Reply::Status(status, body) => Ok(HttpResponse {
                status,
                headers: Vec::new(),
                body: body.as_bytes().to_vec(),
            }),
            Reply::Response(resp) => Ok(resp),
            Reply::Error(e) => Err(e),
        }
    }
}

/// Replies per URL path. The last scripted reply for a path repeats; paths
/// with no script get the default reply.
pub(crate) struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    default: Reply,
    calls: Mutex<Vec<HttpRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Duration,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default: Reply::Status(200, r#"{"ok":true}"#),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn script(self, path: &str, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(path.to_string(), replies.into());
        self
    }

    pub(crate) fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| path_of(&r.url) == path)
            .count()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn path_of(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_default()
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(request.clone());
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        let path = path_of(&request.url);
        let reply = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&path) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        }
        .unwrap_or_else(|| self.default.clone());

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply.into_result()
    }
}

/// Policy with millisecond delays so retry tests run fast.
pub(crate) fn quick_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay_ms: 1,
        backoff_multiplier: 2.0,
        max_delay_ms: 5,
        jitter_fraction: 0.5,
        ..RetryPolicy::default()
    }
}

pub(crate) fn executor(transport: &Arc<ScriptedTransport>, max_attempts: u32) -> Executor {
    let transport: Arc<dyn Transport> = Arc::clone(transport) as Arc<dyn Transport>;
    Executor::new(transport, BASE_URL, quick_policy(max_attempts)).unwrap()
}
