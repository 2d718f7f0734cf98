//! Paginated fetching from the KoboToolbox data endpoint

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use std::collections::HashSet;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::types::{Page, RawRecord};
use crate::utils::snippet;

const USER_AGENT: &str = "kobo-digest/0.1 (consultation dashboard)";
const BODY_SNIPPET_CHARS: usize = 300;

/// Anything that can return one page of results for a URL
pub trait PageSource {
    fn fetch_page(&self, url: &str) -> Result<Page, PipelineError>;
}

impl<T: PageSource + ?Sized> PageSource for &T {
    fn fetch_page(&self, url: &str) -> Result<Page, PipelineError> {
        (**self).fetch_page(url)
    }
}

/// Blocking HTTP client for the Kobo v2 API
pub struct KoboClient {
    client: reqwest::blocking::Client,
}

impl KoboClient {
    pub fn new(token: &str, timeout: Duration) -> Result<Self, PipelineError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Token {}", token))
            .map_err(|_| PipelineError::Config("token contains invalid header characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl PageSource for KoboClient {
    fn fetch_page(&self, url: &str) -> Result<Page, PipelineError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| PipelineError::transport(url, format!("request failed: {}", e)))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .text()
            .map_err(|e| PipelineError::transport(url, format!("failed to read body: {}", e)))?;

        classify_response(url, status, content_type.as_deref(), &body)
    }
}

fn looks_like_html(content_type: Option<&str>, body: &str) -> bool {
    if content_type.is_some_and(|ct| ct.to_lowercase().contains("text/html")) {
        return true;
    }
    let head: String = body.trim_start().chars().take(200).collect::<String>().to_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Turn a raw HTTP exchange into a page or the matching error.
///
/// Unauthenticated requests are sometimes redirected to the HTML login page with a
/// 200, so the body shape is checked as well as the status.
pub fn classify_response(
    url: &str,
    status: u16,
    content_type: Option<&str>,
    body: &str,
) -> Result<Page, PipelineError> {
    if status == 401 || status == 403 {
        return Err(PipelineError::Auth {
            url: url.to_string(),
            status,
        });
    }

    if !(200..300).contains(&status) {
        return Err(PipelineError::transport(
            url,
            format!("HTTP {}: {}", status, snippet(body.trim(), BODY_SNIPPET_CHARS)),
        ));
    }

    if looks_like_html(content_type, body) {
        return Err(PipelineError::transport(
            url,
            "received HTML instead of JSON (wrong API URL, or the token is missing and the server redirected to a login page)",
        ));
    }

    serde_json::from_str::<Page>(body).map_err(|e| {
        PipelineError::transport(
            url,
            format!(
                "response is not a results page ({}): {}",
                e,
                snippet(body.trim(), BODY_SNIPPET_CHARS)
            ),
        )
    })
}

/// Bounded retry with exponential backoff for transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1` (attempts are 1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Follows `next` links from an entry URL until the last page
pub struct Paginator<S> {
    source: S,
    page_delay: Duration,
    retry: RetryPolicy,
}

impl<S: PageSource> Paginator<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            page_delay: Duration::ZERO,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn fetch_with_retry(&self, url: &str) -> Result<Page, PipelineError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.source.fetch_page(url) {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(%url, attempt, ?delay, error = %e, "page fetch failed, retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Every record of every page, first page first.
    ///
    /// Stops at the first page without a `next` link. Any error aborts the whole
    /// fetch; no partial result is returned.
    pub fn fetch_all(&self, entry_url: &str) -> Result<Vec<RawRecord>, PipelineError> {
        let started = Instant::now();
        let mut rows: Vec<RawRecord> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut next = Some(entry_url.to_string());
        let mut page_number = 0u32;

        while let Some(url) = next.take() {
            if !visited.insert(url.clone()) {
                return Err(PipelineError::transport(
                    &url,
                    "pagination loop: next page points to an already fetched URL",
                ));
            }

            if page_number > 0 && !self.page_delay.is_zero() {
                thread::sleep(self.page_delay);
            }
            page_number += 1;

            let page = self.fetch_with_retry(&url)?;
            info!(page = page_number, %url, rows = page.results.len(), "fetched page");
            if let Some(count) = page.count {
                debug!(count, "server reported total count");
            }

            rows.extend(page.results);
            next = page.next.filter(|n| !n.trim().is_empty());
        }

        info!(
            rows = rows.len(),
            pages = page_number,
            elapsed = ?started.elapsed(),
            "fetched all submissions"
        );
        Ok(rows)
    }
}
