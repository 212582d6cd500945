//! HTTP Abstractions
//!
//! The offline core never owns an HTTP transport. It only needs two
//! capabilities from the host's HTTP layer:
//! - [`RequestExecutor`]: perform a previously queued write request
//! - [`FileDownloader`]: fetch a remote asset into a local file

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP request handed to a [`RequestExecutor`]
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let json = serde_json::to_vec(body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON serialization failed: {}", e))
        })?;
        self.body = Some(Bytes::from(json));
        self.headers
            .entry("Content-Type".to_string())
            .or_insert_with(|| "application/json".to_string());
        Ok(self)
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Parse the body back into JSON, if there is one
    pub fn json_body(&self) -> Option<serde_json::Value> {
        self.body
            .as_ref()
            .and_then(|body| serde_json::from_slice(body).ok())
    }
}

/// Executes a replayed request on behalf of the offline queue.
///
/// Implemented by the host's HTTP layer. Timeouts, authentication and TLS are
/// the executor's concern; the queue only interprets `Ok` as delivered and
/// `Err` as "try again on a later drain".
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpRequest, RequestExecutor};
///
/// struct LoggingExecutor;
///
/// #[async_trait::async_trait]
/// impl RequestExecutor for LoggingExecutor {
///     async fn execute(&self, request: HttpRequest) -> Result<()> {
///         println!("{} {}", request.method, request.url);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    /// Perform the request. Any non-success outcome must be an `Err`.
    async fn execute(&self, request: HttpRequest) -> Result<()>;
}

/// Platform file-download primitive used by the binary asset cache.
#[async_trait]
pub trait FileDownloader: Send + Sync {
    /// Download `url` into `destination`, returning the number of bytes written.
    ///
    /// On error the implementation should not leave a file at `destination`,
    /// and callers remove it again on error.
    async fn download_to(&self, url: &str, destination: &Path) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::new(HttpMethod::Post, "https://api.example.com/likes")
            .header("X-Trace", "abc")
            .json(&serde_json::json!({ "track": 7 }))
            .unwrap();

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.headers.get("X-Trace"), Some(&"abc".to_string()));
        assert_eq!(
            request.headers.get("Content-Type"),
            Some(&"application/json".to_string())
        );
        assert_eq!(request.json_body(), Some(serde_json::json!({ "track": 7 })));
    }

    #[test]
    fn test_json_keeps_explicit_content_type() {
        let request = HttpRequest::new(HttpMethod::Put, "https://api.example.com")
            .header("Content-Type", "application/vnd.api+json")
            .json(&serde_json::json!({}))
            .unwrap();

        assert_eq!(
            request.headers.get("Content-Type"),
            Some(&"application/vnd.api+json".to_string())
        );
    }

    #[test]
    fn test_method_serialization() {
        let json = serde_json::to_string(&HttpMethod::Patch).unwrap();
        assert_eq!(json, "\"PATCH\"");
        let method: HttpMethod = serde_json::from_str("\"DELETE\"").unwrap();
        assert_eq!(method, HttpMethod::Delete);
        assert_eq!(HttpMethod::Get.to_string(), "GET");
    }
}
