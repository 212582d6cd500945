//! HTTP Implementation using Reqwest
//!
//! One client serves both HTTP capabilities of the core: replaying queued
//! requests and downloading binary assets.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{FileDownloader, HttpMethod, HttpRequest, RequestExecutor},
};
use futures_util::StreamExt;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Reqwest-based HTTP client implementation
///
/// Provides:
/// - Connection pooling via reqwest
/// - TLS support by default (rustls)
/// - Streaming downloads straight to disk
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a new HTTP client with custom timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("offline-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                BridgeError::NotAvailable(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    /// Create a new HTTP client from a preconfigured reqwest client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    fn build_request(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let method = Self::convert_method(request.method);
        let mut req = self.client.request(method, &request.url);

        for (key, value) in request.headers {
            req = req.header(key, value);
        }

        if let Some(body) = request.body {
            req = req.body(body);
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    fn map_send_error(e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::OperationFailed("Request timed out".to_string())
        } else if e.is_connect() {
            BridgeError::OperationFailed(format!("Connection failed: {}", e))
        } else {
            BridgeError::OperationFailed(e.to_string())
        }
    }

    async fn stream_to_file(&self, url: &str, destination: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        if !response.status().is_success() {
            return Err(BridgeError::OperationFailed(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(destination).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| BridgeError::OperationFailed(e.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl RequestExecutor for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<()> {
        let url = request.url.clone();
        debug!(method = %request.method, url = %url, "Executing HTTP request");

        let response = self
            .build_request(request)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), url = %url, "HTTP request rejected");
            return Err(BridgeError::OperationFailed(format!(
                "HTTP {} error",
                status.as_u16()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl FileDownloader for ReqwestHttpClient {
    async fn download_to(&self, url: &str, destination: &Path) -> Result<u64> {
        match self.stream_to_file(url, destination).await {
            Ok(written) => {
                debug!(url = url, bytes = written, "Downloaded file");
                Ok(written)
            }
            Err(e) => {
                warn!(url = url, error = %e, "Download failed");
                let _ = tokio::fs::remove_file(destination).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_creation() {
        assert!(ReqwestHttpClient::new().is_ok());
    }

    #[test]
    fn test_method_conversion() {
        assert_eq!(
            ReqwestHttpClient::convert_method(HttpMethod::Get),
            reqwest::Method::GET
        );
        assert_eq!(
            ReqwestHttpClient::convert_method(HttpMethod::Patch),
            reqwest::Method::PATCH
        );
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_file() {
        let client = ReqwestHttpClient::with_timeout(Duration::from_millis(500)).unwrap();
        let destination = std::env::temp_dir()
            .join(format!("offline-core-dl-{}", uuid::Uuid::new_v4()))
            .join("image.jpg.part");

        // Port 9 on localhost is discard; nothing listens there in CI
        let result = client
            .download_to("http://127.0.0.1:9/image.jpg", &destination)
            .await;

        assert!(result.is_err());
        assert!(!destination.exists());
    }
}
