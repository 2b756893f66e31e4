// # HTTP Feed Source
//
// This crate provides the HTTP feed source for the RPZ zone loader.
//
// ## Purpose
//
// Managed zones mirror an RPZ zone published over HTTP(S). The feed is a
// plain zone file; the core strips its SOA, NS and `$TTL` lines and puts its
// own header in front of the rest.
//
// ## Behavior
//
// - One GET per sync, no caching and no conditional requests
// - Any non-2xx status is a fetch error
// - The body is read chunk by chunk but returned only once complete, so a
//   broken download never reaches the zone file
// - Line endings may be `\n` or `\r\n`

use rpz_core::traits::FeedSource;
use rpz_core::{Error, Result};

use std::time::Duration;

/// Default request timeout for feed downloads
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;

/// HTTP-based feed source
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    /// Request timeout (connect + body)
    timeout: Duration,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpFeedSource {
    /// Create a new HTTP feed source with the default timeout
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS))
    }

    /// Create with a custom request timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(concat!("rpz-loader/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Configured request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HttpFeedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_lines(&self, url: &str) -> Result<Vec<String>> {
        tracing::debug!("Fetching RPZ feed from {}", url);

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::fetch(format!("GET {}: request failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(format!("GET {}: {}", url, status)));
        }

        let mut splitter = LineSplitter::default();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::fetch(format!("GET {}: error reading response body: {}", url, e)))?
        {
            splitter.push(&chunk);
        }

        let lines = splitter.finish();
        tracing::debug!("Fetched {} lines from {}", lines.len(), url);
        Ok(lines)
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}

/// Splits a chunked body into lines
///
/// A line may span chunk boundaries. Invalid UTF-8 is replaced, not rejected.
#[derive(Debug, Default)]
struct LineSplitter {
    partial: Vec<u8>,
    lines: Vec<String>,
}

impl LineSplitter {
    fn push(&mut self, chunk: &[u8]) {
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.partial.extend_from_slice(&rest[..pos]);
            self.flush_line();
            rest = &rest[pos + 1..];
        }
        self.partial.extend_from_slice(rest);
    }

    fn finish(mut self) -> Vec<String> {
        if !self.partial.is_empty() {
            self.flush_line();
        }
        self.lines
    }

    fn flush_line(&mut self) {
        if self.partial.last() == Some(&b'\r') {
            self.partial.pop();
        }
        self.lines.push(String::from_utf8_lossy(&self.partial).into_owned());
        self.partial.clear();
    }
}
