use std::collections::HashSet;

use futures::{stream, StreamExt};
use url::Url;

use super::{
    html::{extract_sitemap_urls, link_priority},
    AcquisitionError, CascadingScraper,
};
use crate::domain::{
    content::{total_chars, ScrapedContent},
    deadline::Deadline,
};

impl CascadingScraper {
    /// Fetches the seed page and, when multi-page mode is on and the seed
    /// alone is too thin, up to `max_pages - 1` more same-site pages.
    ///
    /// Candidates come from `/sitemap.xml` first, then from the seed's links,
    /// each group ranked by [`link_priority`]. Pages are returned in that
    /// order no matter which fetch finishes first. Whatever has been fetched
    /// when the deadline hits is kept.
    pub async fn crawl(
        &self,
        seed: &Url,
        deadline: Deadline,
    ) -> Result<Vec<ScrapedContent>, AcquisitionError> {
        let seed_page = self.acquire(seed, deadline).await?;

        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(seed.to_string());
        seen.insert(seed_page.content.url.to_string());
        let mut pages = vec![seed_page.content];

        if !self.settings.multi_page
            || self.settings.max_pages <= 1
            || total_chars(&pages) >= self.settings.sufficient_content_chars
        {
            return Ok(pages);
        }

        let mut sitemap_links = self.sitemap_links(seed, deadline).await;
        sitemap_links.sort_by_key(|url| -link_priority(url));
        let mut page_links = seed_page.links;
        page_links.sort_by_key(|url| -link_priority(url));

        let mut queued = seen.clone();
        let candidates: Vec<Url> = sitemap_links
            .into_iter()
            .chain(page_links)
            .filter(|url| queued.insert(url.to_string()))
            .take(self.settings.max_pages - 1)
            .collect();

        log::info!("Crawling {} extra pages for {}", candidates.len(), seed);

        let page_timeout = self.settings.page_timeout;
        let mut fetches = std::pin::pin!(stream::iter(candidates)
            .map(|url| async move {
                match deadline.is_expired() {
                    true => Err(AcquisitionError::DeadlineExhausted(url)),
                    false => {
                        let page_deadline = deadline.earliest(Deadline::after(page_timeout));
                        self.acquire(&url, page_deadline).await
                    }
                }
            })
            .buffered(self.settings.page_concurrency.max(1)));

        loop {
            match tokio::time::timeout_at(deadline.instant(), fetches.next()).await {
                Ok(Some(Ok(page))) => {
                    if seen.insert(page.content.url.to_string()) {
                        pages.push(page.content);
                    }
                    if total_chars(&pages) >= self.settings.sufficient_content_chars {
                        break;
                    }
                }
                Ok(Some(Err(e))) => log::info!("Skipping page. Error: {}", e),
                Ok(None) => break,
                Err(_) => {
                    log::warn!(
                        "Deadline reached while crawling {}, keeping {} pages",
                        seed,
                        pages.len()
                    );
                    break;
                }
            }
        }

        Ok(pages)
    }

    async fn sitemap_links(&self, seed: &Url, deadline: Deadline) -> Vec<Url> {
        let (Some(fetcher), Ok(sitemap_url)) = (self.fetchers.first(), seed.join("/sitemap.xml"))
        else {
            return Vec::new();
        };

        let budget = deadline.budget(self.settings.sitemap_timeout);
        if budget.is_zero() {
            return Vec::new();
        }

        match tokio::time::timeout(budget, fetcher.fetch(&sitemap_url, budget)).await {
            Ok(Ok(page)) => extract_sitemap_urls(&page.body, seed),
            Ok(Err(e)) => {
                log::debug!("No sitemap for {}. Error: {}", seed, e);
                Vec::new()
            }
            Err(_) => Vec::new(),
        }
    }
}
