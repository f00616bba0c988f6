mod browser_rendered;
mod crawler;
mod fetcher;
mod header_spoofed;
pub mod html;
mod primary_http;

use std::{fmt, sync::Arc, time::Duration};

use chrono::Utc;
use thiserror::Error;
use url::Url;

pub use browser_rendered::*;
pub use fetcher::*;
pub use header_spoofed::*;
pub use primary_http::*;

use crate::domain::{
    content::{FetchStrategy, ScrapedContent},
    deadline::Deadline,
};
use html::{collapse_whitespace, extract_page, looks_blocked, truncate_utf8};

#[derive(Debug, Clone, PartialEq)]
pub struct CrawlSettings {
    pub multi_page: bool,
    pub max_pages: usize,
    pub page_concurrency: usize,
    pub page_timeout: Duration,
    /// Aggregate text length after which crawling stops.
    pub sufficient_content_chars: usize,
    /// Pages with less text than this count as thin.
    pub min_page_text_chars: usize,
    pub max_content_bytes: usize,
    pub sitemap_timeout: Duration,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        CrawlSettings {
            multi_page: true,
            max_pages: 8,
            page_concurrency: 3,
            page_timeout: Duration::from_secs(8),
            sufficient_content_chars: 500,
            min_page_text_chars: 40,
            max_content_bytes: 65536,
            sitemap_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug)]
pub struct StrategyAttempt {
    pub strategy: FetchStrategy,
    pub error: FetchError,
}

impl fmt::Display for StrategyAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.error)
    }
}

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("all strategies failed for {url}: [{}]", join_attempts(.attempts))]
    AllStrategiesFailed {
        url: Url,
        attempts: Vec<StrategyAttempt>,
    },
    #[error("deadline exhausted before {0} could be fetched")]
    DeadlineExhausted(Url),
}

fn join_attempts(attempts: &[StrategyAttempt]) -> String {
    attempts
        .iter()
        .map(StrategyAttempt::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Page content plus the same-site links found on it.
struct Acquired {
    content: ScrapedContent,
    links: Vec<Url>,
}

/// Ordered list of fetch strategies. Each url goes down the list until a
/// strategy returns usable text, a non-retryable error stops it, or the
/// deadline runs out.
pub struct CascadingScraper {
    fetchers: Vec<Arc<dyn ContentFetcher>>,
    settings: CrawlSettings,
}

impl CascadingScraper {
    pub fn new(fetchers: Vec<Arc<dyn ContentFetcher>>, settings: CrawlSettings) -> Self {
        CascadingScraper { fetchers, settings }
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    pub fn strategies(&self) -> Vec<FetchStrategy> {
        self.fetchers.iter().map(|f| f.strategy()).collect()
    }

    pub async fn fetch_content(
        &self,
        url: &Url,
        deadline: Deadline,
    ) -> Result<ScrapedContent, AcquisitionError> {
        self.acquire(url, deadline).await.map(|a| a.content)
    }

    async fn acquire(&self, url: &Url, deadline: Deadline) -> Result<Acquired, AcquisitionError> {
        let mut attempts = Vec::new();
        let mut thin: Option<Acquired> = None;

        for fetcher in &self.fetchers {
            let strategy = fetcher.strategy();
            let remaining = deadline.remaining();
            if remaining.is_zero() {
                break;
            }
            if remaining < fetcher.min_budget() {
                log::info!("Skipping {} for {}, only {:?} left", strategy, url, remaining);
                attempts.push(StrategyAttempt {
                    strategy,
                    error: FetchError::InsufficientBudget(remaining),
                });
                continue;
            }

            let budget = deadline.budget(fetcher.timeout());
            let outcome = match tokio::time::timeout(budget, fetcher.fetch(url, budget)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(FetchError::Timeout(budget)),
            };

            let error = match outcome {
                Ok(page) => {
                    let (acquired, blocked) = self.inspect(page);
                    let chars = acquired.content.char_count();
                    if blocked {
                        FetchError::Blocked
                    } else if chars < self.settings.min_page_text_chars {
                        let longer = chars > 0
                            && thin
                                .as_ref()
                                .map_or(true, |t| t.content.char_count() < chars);
                        if longer {
                            thin = Some(acquired);
                        }
                        FetchError::Thin(chars)
                    } else {
                        log::info!("Fetched {} with {} ({} chars)", url, strategy, chars);
                        return Ok(acquired);
                    }
                }
                Err(e) => e,
            };

            log::warn!("Strategy {} failed for {}. Error: {}", strategy, url, error);
            let retryable = error.is_retryable();
            attempts.push(StrategyAttempt { strategy, error });
            if !retryable {
                break;
            }
        }

        if let Some(page) = thin {
            log::warn!("Using thin page for {}", url);
            return Ok(page);
        }

        match attempts.is_empty() {
            true => Err(AcquisitionError::DeadlineExhausted(url.clone())),
            false => Err(AcquisitionError::AllStrategiesFailed {
                url: url.clone(),
                attempts,
            }),
        }
    }

    /// Extracts text and links; the flag is set for bot-wall pages.
    fn inspect(&self, page: FetchedPage) -> (Acquired, bool) {
        let (title, meta_description, mut text, links, blocked) = match page.kind {
            BodyKind::Html => {
                let extracted = extract_page(&page.body, &page.url);
                let blocked = looks_blocked(&page.body, &extracted.text);
                (
                    extracted.title,
                    extracted.meta_description,
                    extracted.text,
                    extracted.links,
                    blocked,
                )
            }
            BodyKind::Text => (None, None, collapse_whitespace(&page.body), Vec::new(), false),
        };
        let truncated =
            truncate_utf8(&mut text, self.settings.max_content_bytes) || page.truncated;

        let content = ScrapedContent {
            url: page.url,
            strategy_used: page.strategy,
            title,
            meta_description,
            text,
            fetched_at: Utc::now(),
            byte_size: page.body.len(),
            truncated,
        };

        (Acquired { content, links }, blocked)
    }
}
