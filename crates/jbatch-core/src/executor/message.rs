//! Human-readable failure messages from remote error bodies.
//!
//! The API reports errors as `{"errorMessages": [...], "errors": {field: msg}}`;
//! some endpoints use a bare `{"message": "..."}` instead.

use serde_json::Value;

use crate::transport::{HttpResponse, TransportError};

const RAW_BODY_LIMIT: usize = 200;

/// Best message for a failed response.
pub fn response_message(resp: &HttpResponse) -> String {
    let text = String::from_utf8_lossy(&resp.body);
    let text = text.trim();
    let extracted = serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| message_from_json(&v))
        .or_else(|| {
            (!text.is_empty() && !text.starts_with('<'))
                .then(|| text.chars().take(RAW_BODY_LIMIT).collect::<String>())
        });
    match extracted {
        Some(msg) => sanitize(&msg),
        None => format!("HTTP {}", resp.status),
    }
}

pub fn transport_message(e: &TransportError) -> String {
    sanitize(&e.to_string())
}

fn message_from_json(v: &Value) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    if let Some(list) = v.get("errorMessages").and_then(Value::as_array) {
        parts.extend(list.iter().filter_map(Value::as_str).map(str::to_string));
    }
    if let Some(fields) = v.get("errors").and_then(Value::as_object) {
        for (field, msg) in fields {
            match msg.as_str() {
                Some(m) => parts.push(format!("{}: {}", field, m)),
                None => parts.push(format!("{}: {}", field, msg)),
            }
        }
    }
    if parts.is_empty() {
        if let Some(m) = v.get("message").and_then(Value::as_str) {
            parts.push(m.to_string());
        }
    }
    (!parts.is_empty()).then(|| parts.join("; "))
}

/// Redact anything that looks like a credential.
pub fn sanitize(msg: &str) -> String {
    const MARKERS: [&str; 4] = ["Bearer ", "Basic ", "api_token=", "token="];
    const REDACTED: &str = "[REDACTED]";
    let mut out = msg.to_string();
    for marker in MARKERS {
        let mut search_from = 0;
        while let Some(found) = out[search_from..].find(marker) {
            let start = search_from + found + marker.len();
            let end = out[start..]
                .find(|c: char| c.is_whitespace() || c == '&' || c == '"' || c == ',')
                .map(|i| start + i)
                .unwrap_or(out.len());
            if end > start && &out[start..end] != REDACTED {
                out.replace_range(start..end, REDACTED);
                search_from = start + REDACTED.len();
            } else {
                search_from = end;
            }
        }
    }
    out
}
