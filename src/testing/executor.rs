//! Request execution
//!
//! Sends exactly one request per scenario. No retries and no redirects: the
//! first response the target produces is the one that gets matched.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use serde::Serialize;

use crate::common::{Error, Result};

use super::config::RequestSpec;

/// A response as observed on the wire
#[derive(Debug, Clone, Serialize)]
pub struct CapturedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Body decoded lossily as UTF-8, parsed only when assertions need it
    pub body: String,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Why a request produced no response
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("transport error: {0}")]
    Other(String),
}

/// Sends a single scenario request
#[async_trait]
pub trait Executor: Send + Sync {
    /// Issue one request and capture whatever comes back
    async fn execute(&self, request: &RequestSpec) -> std::result::Result<CapturedResponse, TransportError>;
}

/// Executor backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
    base: String,
    timeout: Duration,
}

impl HttpExecutor {
    /// Build an executor for `target` with a per-request timeout
    pub fn new(target: &str, timeout: Duration) -> Result<Self> {
        let base = validate_target(target)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base: base.as_str().to_string(),
            timeout,
        })
    }

    fn map_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout.as_millis() as u64)
        } else if e.is_connect() {
            TransportError::Connect(error_chain(&e))
        } else if e.is_builder() {
            TransportError::InvalidRequest(error_chain(&e))
        } else if e.is_body() || e.is_decode() {
            TransportError::Body(error_chain(&e))
        } else {
            TransportError::Other(error_chain(&e))
        }
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self, request: &RequestSpec) -> std::result::Result<CapturedResponse, TransportError> {
        let url = join_url(&self.base, &request.path);
        let mut builder = self.client.request(request.method.clone(), &url);

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::InvalidRequest(format!("header '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::InvalidRequest(format!("header value: {}", e)))?;
            builder = builder.header(name, value);
        }
        if let Some(content_type) = &request.content_type {
            let value = HeaderValue::from_str(content_type)
                .map_err(|e| TransportError::InvalidRequest(format!("content type: {}", e)))?;
            builder = builder.header(CONTENT_TYPE, value);
        }
        if let Some(bytes) = request.body_bytes() {
            builder = builder.body(bytes);
        }

        tracing::debug!(method = %request.method, url = %url, "Sending request");
        let started = Instant::now();
        let response = builder.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or("<binary>").to_string(),
                )
            })
            .collect();
        let bytes = response.bytes().await.map_err(|e| self.map_error(e))?;
        let elapsed = started.elapsed();

        tracing::debug!(
            status,
            bytes = bytes.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Received response"
        );

        Ok(CapturedResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
            elapsed,
        })
    }
}

/// Check that `target` is an absolute http(s) URL
pub fn validate_target(target: &str) -> Result<Url> {
    let url = Url::parse(target)
        .map_err(|e| Error::Config(format!("Invalid target URL '{}': {}", target, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "Target URL '{}' must use http or https",
            target
        )));
    }
    if url.host_str().is_none() {
        return Err(Error::Config(format!("Target URL '{}' has no host", target)));
    }
    Ok(url)
}

/// Join base and path with exactly one slash between them
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Open and drop a TCP connection to the target before anything runs
pub async fn preflight(target: &str, timeout: Duration) -> Result<()> {
    let url = validate_target(target)?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::preflight(target, "no host"))?
        .to_string();
    let port = url
        .port_or_known_default()
        .ok_or_else(|| Error::preflight(target, "no port"))?;

    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect((host.as_str(), port))).await
    {
        Ok(Ok(_)) => {
            tracing::debug!(%host, port, "Preflight connection succeeded");
            Ok(())
        }
        Ok(Err(e)) => Err(Error::preflight(target, e)),
        Err(_) => Err(Error::preflight(
            target,
            format!("no connection within {} ms", timeout.as_millis()),
        )),
    }
}

/// Flatten an error and its sources into one line
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut text = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_normalizes_slashes() {
        assert_eq!(join_url("http://h:1", "/a/b"), "http://h:1/a/b");
        assert_eq!(join_url("http://h:1/", "/a"), "http://h:1/a");
        assert_eq!(join_url("http://h:1/base/", "a?x=1"), "http://h:1/base/a?x=1");
    }

    #[test]
    fn test_validate_target() {
        assert!(validate_target("http://localhost:8080").is_ok());
        assert!(validate_target("https://api.example.com/base").is_ok());
        assert!(matches!(validate_target("localhost:8080"), Err(Error::Config(_))));
        assert!(matches!(validate_target("ftp://example.com"), Err(Error::Config(_))));
        assert!(matches!(validate_target("not a url"), Err(Error::Config(_))));
    }

    #[test]
    fn test_new_rejects_bad_target() {
        assert!(HttpExecutor::new("nope", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_preflight_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let target = format!("http://127.0.0.1:{}", port);
        let err = preflight(&target, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, Error::Preflight { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_preflight_reachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = format!("http://{}", listener.local_addr().unwrap());
        preflight(&target, Duration::from_secs(2)).await.unwrap();
    }
}
