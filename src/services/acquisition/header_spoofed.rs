use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use fake_user_agent::get_rua;
use rand::seq::SliceRandom;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, REFERER, USER_AGENT};
use url::Url;

use super::fetcher::{get_page, ContentFetcher, FetchError, FetchedPage};
use crate::{domain::content::FetchStrategy, services::admission::Admission};

const REFERERS: [&str; 3] = [
    "https://www.google.com/",
    "https://www.bing.com/",
    "https://duckduckgo.com/",
];

const ACCEPT_LANGUAGES: [&str; 3] = [
    "en-US,en;q=0.9",
    "en-GB,en;q=0.9,en-US;q=0.8",
    "en-US,en;q=0.8,es;q=0.5",
];

/// GET dressed up as a real browser: random user agent, browser headers,
/// a cookie jar, and optionally a random proxy per request.
pub struct HeaderSpoofedFetcher {
    proxies: Vec<String>,
    admission: Arc<Admission>,
    timeout: Duration,
    max_body_bytes: usize,
}

impl HeaderSpoofedFetcher {
    pub fn new(
        admission: Arc<Admission>,
        timeout: Duration,
        max_body_bytes: usize,
        proxies: Vec<String>,
    ) -> Result<Self, reqwest::Error> {
        for proxy in &proxies {
            reqwest::Proxy::all(proxy)?;
        }

        Ok(HeaderSpoofedFetcher {
            proxies,
            admission,
            timeout,
            max_body_bytes,
        })
    }

    /// New client per fetch, so cookies live only as long as one fetch and
    /// its redirects. Nothing carries over between sites.
    fn client(&self) -> Result<reqwest::Client, FetchError> {
        let mut builder = reqwest::Client::builder()
            .cookie_store(true)
            .connect_timeout(self.timeout);
        if let Some(proxy) = self.proxies.choose(&mut rand::thread_rng()) {
            let proxy =
                reqwest::Proxy::all(proxy).map_err(|e| FetchError::Transport(e.to_string()))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))
    }
}

#[async_trait]
impl ContentFetcher for HeaderSpoofedFetcher {
    fn strategy(&self) -> FetchStrategy {
        FetchStrategy::HeaderSpoofed
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self, url: &Url, budget: Duration) -> Result<FetchedPage, FetchError> {
        let _permit = tokio::time::timeout(budget, self.admission.acquire())
            .await
            .map_err(|_| FetchError::Timeout(budget))??;

        let request = {
            let mut rng = rand::thread_rng();
            let referer = REFERERS.choose(&mut rng).copied().unwrap_or(REFERERS[0]);
            let language = ACCEPT_LANGUAGES
                .choose(&mut rng)
                .copied()
                .unwrap_or(ACCEPT_LANGUAGES[0]);

            self.client()?
                .get(url.clone())
                .header(USER_AGENT, get_rua())
                .header(
                    ACCEPT,
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
                )
                .header(ACCEPT_LANGUAGE, language)
                .header(REFERER, referer)
                .header(CACHE_CONTROL, "no-cache")
                .header("Upgrade-Insecure-Requests", "1")
                .header("Sec-Fetch-Dest", "document")
                .header("Sec-Fetch-Mode", "navigate")
                .header("Sec-Fetch-Site", "cross-site")
        };

        get_page(request, budget, self.strategy(), self.max_body_bytes).await
    }
}
