use std::{error::Error as StdError, time::Duration};

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, RequestBuilder};
use thiserror::Error;
use url::Url;

use crate::{domain::content::FetchStrategy, services::admission::Overloaded};

/// Raw markup read per byte of text a page may keep.
pub const MARKUP_ALLOWANCE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Html,
    Text,
}

/// Raw page as returned by one strategy, before text extraction.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final url after redirects.
    pub url: Url,
    pub status: u16,
    pub body: String,
    pub strategy: FetchStrategy,
    pub kind: BodyKind,
    /// The body stopped at the read limit.
    pub truncated: bool,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("dns lookup failed: {0}")]
    Dns(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("http status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("blocked by bot protection")]
    Blocked,
    #[error("page has too little text ({0} chars)")]
    Thin(usize),
    #[error("only {0:?} left, not enough for this strategy")]
    InsufficientBudget(Duration),
    #[error("rendering failed: {0}")]
    Rendering(String),
    #[error(transparent)]
    Overloaded(#[from] Overloaded),
    #[error("could not read body: {0}")]
    Body(String),
    #[error("unsupported content: {0}")]
    Unsupported(String),
}

impl FetchError {
    /// Whether the next strategy in the cascade may have better luck.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status(status) => is_retryable_status(*status),
            FetchError::Unsupported(_) => false,
            _ => true,
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 403 | 408 | 425 | 429) || (500..600).contains(&status)
}

/// Turns a reqwest failure into a cascade-friendly error, telling resolver
/// failures apart from other connect errors.
pub fn classify_reqwest_error(e: reqwest::Error, budget: Duration) -> FetchError {
    if e.is_timeout() {
        return FetchError::Timeout(budget);
    }
    if let Some(status) = e.status() {
        return FetchError::Status(status.as_u16());
    }

    let mut source = e.source();
    while let Some(cause) = source {
        let message = cause.to_string().to_lowercase();
        if message.contains("dns")
            || message.contains("failed to lookup address")
            || message.contains("name or service not known")
            || message.contains("no such host")
        {
            return FetchError::Dns(cause.to_string());
        }
        source = cause.source();
    }

    match e.is_body() || e.is_decode() {
        true => FetchError::Body(e.to_string()),
        false => FetchError::Transport(e.to_string()),
    }
}

/// One way of getting a page. Strategies are tried in order until one
/// returns usable content.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    fn strategy(&self) -> FetchStrategy;

    /// Least remaining time worth starting this strategy with.
    fn min_budget(&self) -> Duration {
        Duration::ZERO
    }

    /// Upper bound for a single fetch.
    fn timeout(&self) -> Duration;

    /// Fetches `url`, finishing within `budget`.
    async fn fetch(&self, url: &Url, budget: Duration) -> Result<FetchedPage, FetchError>;
}

/// Sends `request` and reads at most `max_body_bytes * MARKUP_ALLOWANCE`
/// bytes of body, bounded by `budget` overall.
pub async fn get_page(
    request: RequestBuilder,
    budget: Duration,
    strategy: FetchStrategy,
    max_body_bytes: usize,
) -> Result<FetchedPage, FetchError> {
    let fetch = async {
        let mut response = request
            .send()
            .await
            .map_err(|e| classify_reqwest_error(e, budget))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let kind = match response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_lowercase())
        {
            None => BodyKind::Html,
            Some(ct) if ct.contains("html") || ct.contains("xml") => BodyKind::Html,
            Some(ct) if ct.starts_with("text/") => BodyKind::Text,
            Some(ct) => return Err(FetchError::Unsupported(ct)),
        };

        let url = response.url().clone();
        let limit = max_body_bytes.saturating_mul(MARKUP_ALLOWANCE);
        let mut bytes = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| classify_reqwest_error(e, budget))?
        {
            let room = limit - bytes.len();
            if chunk.len() > room {
                bytes.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        if truncated {
            log::debug!("Stopped reading {} at {} bytes", url, limit);
        }

        Ok(FetchedPage {
            url,
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
            strategy,
            kind,
            truncated,
        })
    };

    match tokio::time::timeout(budget, fetch).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(budget)),
    }
}

#[cfg(test)]
mod tests {
    use super::{is_retryable_status, FetchError};

    #[test]
    fn retryable_statuses() {
        for status in [403, 408, 425, 429, 500, 502, 503, 599] {
            assert!(is_retryable_status(status), "{}", status);
        }
        for status in [400, 401, 404, 410, 451] {
            assert!(!is_retryable_status(status), "{}", status);
        }
    }

    #[test]
    fn fetch_error_retryable() {
        assert!(FetchError::Blocked.is_retryable());
        assert!(FetchError::Thin(12).is_retryable());
        assert!(FetchError::Dns("nxdomain".to_string()).is_retryable());
        assert!(!FetchError::Status(404).is_retryable());
        assert!(!FetchError::Unsupported("application/pdf".to_string()).is_retryable());
    }
}
