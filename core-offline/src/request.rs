//! Queued request model and ordering

use bridge_traits::http::{HttpMethod, HttpRequest};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::Result;

/// Delivery priority. Higher drains first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-safe queued request identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A write request waiting for connectivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub id: RequestId,
    pub url: String,
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Unix milliseconds
    pub enqueued_at: i64,
    pub retry_count: u32,
    pub priority: Priority,
}

impl QueuedRequest {
    pub fn new(
        url: impl Into<String>,
        method: HttpMethod,
        priority: Priority,
        enqueued_at: i64,
    ) -> Self {
        Self {
            id: RequestId::new(),
            url: url.into(),
            method,
            payload: None,
            headers: HashMap::new(),
            enqueued_at,
            retry_count: 0,
            priority,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Whether the request has used up its deliveries.
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        self.retry_count >= max_retries
    }

    /// Build the request handed to the executor. The payload becomes a JSON
    /// body.
    pub fn to_http_request(&self) -> Result<HttpRequest> {
        let mut request = HttpRequest::new(self.method, self.url.clone()).headers(self.headers.clone());

        if let Some(payload) = &self.payload {
            request = request.body(Bytes::from(serde_json::to_vec(payload)?));
            if !request
                .headers
                .keys()
                .any(|name| name.eq_ignore_ascii_case("content-type"))
            {
                request = request.header("Content-Type", "application/json");
            }
        }

        Ok(request)
    }
}

/// Drain order: priority descending, then oldest first.
pub fn drain_order(a: &QueuedRequest, b: &QueuedRequest) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then(a.enqueued_at.cmp(&b.enqueued_at))
}

/// Re-establish drain order. Stable, so timestamp ties keep insertion order.
pub fn sort_queue(entries: &mut [QueuedRequest]) {
    entries.sort_by(drain_order);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
    }

    #[test]
    fn test_request_id_round_trip() {
        let id = RequestId::new();
        assert_eq!(RequestId::parse(&id.to_string()), Some(id));
        assert_eq!(RequestId::parse("not-a-uuid"), None);
    }

    #[test]
    fn test_sort_by_priority_then_age() {
        let mut entries = vec![
            QueuedRequest::new("/low", HttpMethod::Post, Priority::Low, 1),
            QueuedRequest::new("/high-late", HttpMethod::Post, Priority::High, 5),
            QueuedRequest::new("/normal", HttpMethod::Post, Priority::Normal, 0),
            QueuedRequest::new("/high-early", HttpMethod::Post, Priority::High, 2),
        ];
        sort_queue(&mut entries);

        let urls: Vec<&str> = entries.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["/high-early", "/high-late", "/normal", "/low"]);
    }

    #[test]
    fn test_sort_keeps_insertion_order_on_ties() {
        let mut entries = vec![
            QueuedRequest::new("/a", HttpMethod::Put, Priority::Normal, 7),
            QueuedRequest::new("/b", HttpMethod::Put, Priority::Normal, 7),
            QueuedRequest::new("/c", HttpMethod::Put, Priority::Normal, 7),
        ];
        sort_queue(&mut entries);

        let urls: Vec<&str> = entries.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn test_to_http_request_encodes_payload() {
        let request = QueuedRequest::new("https://api.test/likes", HttpMethod::Post, Priority::High, 0)
            .with_payload(serde_json::json!({"track": 42}))
            .with_headers(HashMap::from([("Authorization".to_string(), "Bearer t".to_string())]));

        let http = request.to_http_request().unwrap();
        assert_eq!(http.method, HttpMethod::Post);
        assert_eq!(http.url, "https://api.test/likes");
        assert_eq!(http.headers["Content-Type"], "application/json");
        assert_eq!(http.headers["Authorization"], "Bearer t");
        assert_eq!(http.json_body(), Some(serde_json::json!({"track": 42})));
    }

    #[test]
    fn test_persisted_shape() {
        let request = QueuedRequest::new("/x", HttpMethod::Delete, Priority::Low, 10);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["method"], "DELETE");
        assert_eq!(json["priority"], "low");
        assert!(json.get("payload").is_none());
        assert!(json.get("headers").is_none());

        let back: QueuedRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn test_exhaustion() {
        let mut request = QueuedRequest::new("/x", HttpMethod::Post, Priority::Normal, 0);
        assert!(!request.is_exhausted(3));
        request.retry_count = 3;
        assert!(request.is_exhausted(3));
    }
}
