use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{
    header::{ACCEPT, ACCEPT_LANGUAGE},
    redirect::Policy,
};
use url::Url;

use super::fetcher::{get_page, ContentFetcher, FetchError, FetchedPage};
use crate::{domain::content::FetchStrategy, services::admission::Admission};

const USER_AGENT: &str = concat!("sector/", env!("CARGO_PKG_VERSION"), " (+business classifier)");

/// Plain GET with ordinary headers. Cheapest strategy, tried first.
pub struct PrimaryHttpFetcher {
    client: reqwest::Client,
    admission: Arc<Admission>,
    timeout: Duration,
    max_body_bytes: usize,
}

impl PrimaryHttpFetcher {
    pub fn new(
        admission: Arc<Admission>,
        timeout: Duration,
        max_body_bytes: usize,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(Policy::limited(5))
            .connect_timeout(timeout)
            .build()?;

        Ok(PrimaryHttpFetcher {
            client,
            admission,
            timeout,
            max_body_bytes,
        })
    }
}

#[async_trait]
impl ContentFetcher for PrimaryHttpFetcher {
    fn strategy(&self) -> FetchStrategy {
        FetchStrategy::PrimaryHttp
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self, url: &Url, budget: Duration) -> Result<FetchedPage, FetchError> {
        let _permit = tokio::time::timeout(budget, self.admission.acquire())
            .await
            .map_err(|_| FetchError::Timeout(budget))??;

        let request = self
            .client
            .get(url.clone())
            .header(ACCEPT, "text/html,application/xhtml+xml,text/plain;q=0.9,*/*;q=0.5")
            .header(ACCEPT_LANGUAGE, "en");

        get_page(request, budget, self.strategy(), self.max_body_bytes).await
    }
}
