use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thirtyfour::{DesiredCapabilities, WebDriver};
use url::Url;

use super::fetcher::{
    classify_reqwest_error, BodyKind, ContentFetcher, FetchError, FetchedPage,
};
use crate::{domain::content::FetchStrategy, services::admission::Admission};

#[derive(Debug, Clone, PartialEq)]
pub enum RenderBackend {
    /// HTTP rendering service: `POST {url, timeout}` -> `{html|text, status}`.
    Service { endpoint: Url },
    /// Remote WebDriver grid, e.g. `http://chrome:4444/wd/hub`.
    WebDriver { server_url: String },
}

#[derive(Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
    timeout: u64,
}

#[derive(Deserialize)]
struct RenderResponse {
    html: Option<String>,
    text: Option<String>,
    status: u16,
}

/// Runs the page through a real browser. Slow, so only used as the last
/// strategy and only when enough of the deadline is left.
pub struct BrowserRenderedFetcher {
    backend: RenderBackend,
    client: reqwest::Client,
    admission: Arc<Admission>,
    timeout: Duration,
    min_budget: Duration,
}

impl BrowserRenderedFetcher {
    pub fn new(
        backend: RenderBackend,
        admission: Arc<Admission>,
        timeout: Duration,
        min_budget: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;

        Ok(BrowserRenderedFetcher {
            backend,
            client,
            admission,
            timeout,
            min_budget,
        })
    }

    async fn render_with_service(
        &self,
        endpoint: &Url,
        url: &Url,
        budget: Duration,
    ) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .post(endpoint.clone())
            .timeout(budget)
            .json(&RenderRequest {
                url: url.as_str(),
                timeout: budget.as_millis() as u64,
            })
            .send()
            .await
            .map_err(|e| classify_reqwest_error(e, budget))?;

        if !response.status().is_success() {
            return Err(FetchError::Rendering(format!(
                "render service returned {}",
                response.status()
            )));
        }

        let rendered: RenderResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Rendering(e.to_string()))?;

        if !(200..300).contains(&rendered.status) {
            return Err(FetchError::Status(rendered.status));
        }

        let (body, kind) = match (rendered.html, rendered.text) {
            (Some(html), _) => (html, BodyKind::Html),
            (None, Some(text)) => (text, BodyKind::Text),
            (None, None) => return Err(FetchError::Rendering("empty render".to_string())),
        };

        Ok(FetchedPage {
            url: url.clone(),
            status: rendered.status,
            body,
            strategy: self.strategy(),
            kind,
            truncated: false,
        })
    }

    async fn render_with_webdriver(
        &self,
        server_url: &str,
        url: &Url,
        budget: Duration,
    ) -> Result<FetchedPage, FetchError> {
        let caps = DesiredCapabilities::chrome();
        let driver = WebDriver::new(server_url, caps)
            .await
            .map_err(|e| FetchError::Rendering(e.to_string()))?;

        let navigation = async {
            driver.goto(url.as_str()).await?;
            let source = driver.source().await?;
            let current_url = driver.current_url().await?;
            Ok::<_, thirtyfour::error::WebDriverError>((source, current_url))
        };
        let result = tokio::time::timeout(budget, navigation).await;

        if let Err(e) = driver.quit().await {
            log::error!("Failed to quit webdriver session. Error: {:?}", e);
        }

        let (body, final_url) = result
            .map_err(|_| FetchError::Timeout(budget))?
            .map_err(|e| FetchError::Rendering(e.to_string()))?;

        Ok(FetchedPage {
            url: Url::parse(final_url.as_str()).unwrap_or_else(|_| url.clone()),
            status: 200,
            body,
            strategy: self.strategy(),
            kind: BodyKind::Html,
            truncated: false,
        })
    }
}

#[async_trait]
impl ContentFetcher for BrowserRenderedFetcher {
    fn strategy(&self) -> FetchStrategy {
        FetchStrategy::BrowserRendered
    }

    fn min_budget(&self) -> Duration {
        self.min_budget
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self, url: &Url, budget: Duration) -> Result<FetchedPage, FetchError> {
        let _permit = tokio::time::timeout(budget, self.admission.acquire())
            .await
            .map_err(|_| FetchError::Timeout(budget))??;

        match &self.backend {
            RenderBackend::Service { endpoint } => {
                self.render_with_service(endpoint, url, budget).await
            }
            RenderBackend::WebDriver { server_url } => {
                self.render_with_webdriver(server_url, url, budget).await
            }
        }
    }
}
