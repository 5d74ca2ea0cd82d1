//! Single-page HTTP fetching
//!
//! One GET with a deadline, an identifying User-Agent, a content-type gate,
//! and a body size cap. The fetcher never sleeps and never retries on its
//! own; pacing and retry scheduling belong to the per-job queue, which uses
//! [`FetchError::is_retryable`] to decide what is worth another attempt.

use std::time::Duration;

use futures_util::StreamExt;
use log::debug;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use url::Url;

/// Content types the extractor can work with.
const ACCEPTED_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

/// Redirect hops before a fetch is abandoned.
const MAX_REDIRECTS: usize = 5;

/// Default cap on a response body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Total attempts for a retryable URL, first try included.
pub const MAX_FETCH_ATTEMPTS: u32 = 3;

/// Fetch failure, classified the way the retry policy cares about.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport-level failure: DNS, connection refused or reset, TLS.
    #[error("network error: {0}")]
    Network(String),

    /// The per-request deadline elapsed.
    #[error("request timed out")]
    Timeout,

    /// Server answered with a non-success status.
    #[error("HTTP status {status}")]
    HttpStatus { status: u16 },

    /// Response is not an HTML document.
    #[error("unsupported content type {content_type:?}")]
    WrongContentType { content_type: String },

    /// Response body exceeds the configured cap.
    #[error("response body exceeds {limit_bytes} bytes")]
    TooLarge { limit_bytes: usize },
}

impl FetchError {
    /// Short stable label used in events and page results.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Timeout => "timeout",
            Self::HttpStatus { status } if *status >= 500 => "http_5xx",
            Self::HttpStatus { .. } => "http_4xx",
            Self::WrongContentType { .. } => "wrong_content_type",
            Self::TooLarge { .. } => "too_large",
        }
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Network faults, timeouts, and 5xx responses are transient; 4xx,
    /// wrong content type, and oversized bodies are terminal.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::HttpStatus { status } => *status >= 500,
            Self::WrongContentType { .. } | Self::TooLarge { .. } => false,
        }
    }
}

/// A successfully fetched HTML page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub content_type: String,
    pub body: String,
    /// URL after redirects, for correct relative-link resolution.
    pub final_url: Url,
}

/// HTTP fetcher shared by all jobs in the process.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    user_agent: String,
    max_body_bytes: usize,
}

impl Fetcher {
    /// Build a fetcher with the given identifying User-Agent.
    ///
    /// The client follows at most five redirects and carries no cookie
    /// store. Per-request deadlines are supplied per call, not here, since
    /// every job configures its own.
    pub fn new(user_agent: &str, max_body_bytes: usize) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
            max_body_bytes,
        })
    }

    /// Perform a single GET.
    ///
    /// # Arguments
    /// * `url` - Normalized target URL
    /// * `timeout` - Overall deadline for this request
    ///
    /// # Returns
    /// * `Ok(FetchedPage)` - 2xx HTML response within the size cap
    /// * `Err(FetchError)` - Classified failure; see [`FetchError::is_retryable`]
    pub async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "text/html, application/xhtml+xml")
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        if !ACCEPTED_CONTENT_TYPES.contains(&media_type.as_str()) {
            return Err(FetchError::WrongContentType { content_type });
        }

        if let Some(len) = response.content_length()
            && len as usize > self.max_body_bytes
        {
            return Err(FetchError::TooLarge {
                limit_bytes: self.max_body_bytes,
            });
        }

        let final_url = response.url().clone();

        // Stream the body so an unbounded response is cut off at the cap
        // instead of buffered whole.
        let mut body = Vec::with_capacity(8 * 1024);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(classify_reqwest_error)?;
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(FetchError::TooLarge {
                    limit_bytes: self.max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        debug!("fetched {url} ({} bytes, {media_type})", body.len());

        Ok(FetchedPage {
            status: status.as_u16(),
            content_type,
            body: String::from_utf8_lossy(&body).into_owned(),
            final_url,
        })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(e.to_string())
    }
}
