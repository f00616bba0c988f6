use std::{net::TcpListener, sync::Arc, time::Duration};

use actix_web::{dev::Server, middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use url::Url;

use crate::{
    configuration::{MlBackendKind, ScraperSettings, Settings},
    routes::{classify_route, health_route},
    services::{
        acquisition::{
            BrowserRenderedFetcher, CascadingScraper, ContentFetcher, HeaderSpoofedFetcher,
            PrimaryHttpFetcher,
        },
        Admission, CircuitBreaker, HttpModelBackend, MlClassifier, ModelBackend, OpenAiBackend,
        Pipeline, PipelineParts, TaxonomySource,
    },
};

pub fn run(listener: TcpListener, pipeline: Arc<Pipeline>) -> Result<Server, std::io::Error> {
    let pipeline = web::Data::from(pipeline);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .service(classify_route::classify)
            .service(
                web::scope("/health")
                    .service(health_route::health)
                    .service(health_route::ml_circuit),
            )
            .app_data(pipeline.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}

/// Strategy cascade in order: plain HTTP, header-spoofed HTTP, then the
/// browser when it is enabled. All of them share one outbound admission.
pub fn build_scraper(settings: &ScraperSettings) -> anyhow::Result<CascadingScraper> {
    let admission = Arc::new(Admission::new(
        "outbound fetches",
        settings.max_concurrent_fetches,
        settings.max_queued_fetches,
    ));

    let mut fetchers: Vec<Arc<dyn ContentFetcher>> = vec![
        Arc::new(PrimaryHttpFetcher::new(
            admission.clone(),
            Duration::from_millis(settings.primary_timeout_ms),
            settings.max_content_bytes,
        )?),
        Arc::new(HeaderSpoofedFetcher::new(
            admission.clone(),
            Duration::from_millis(settings.spoofed_timeout_ms),
            settings.max_content_bytes,
            settings.proxies.clone(),
        )?),
    ];

    let browser = &settings.browser;
    if browser.enabled {
        let backend = browser
            .render_backend()
            .context("Invalid browser rendering service url")?;
        fetchers.push(Arc::new(BrowserRenderedFetcher::new(
            backend,
            admission,
            Duration::from_millis(browser.timeout_ms),
            Duration::from_millis(browser.min_remaining_budget_ms),
        )?));
    }

    Ok(CascadingScraper::new(fetchers, settings.crawl_settings()))
}

/// `None` when ML is disabled in the configuration.
pub fn build_ml_classifier(settings: &Settings) -> anyhow::Result<Option<MlClassifier>> {
    let ml = &settings.ml;
    if !ml.enabled {
        return Ok(None);
    }

    let backend: Arc<dyn ModelBackend> = match ml.backend {
        MlBackendKind::Http => Arc::new(HttpModelBackend::new(
            Url::parse(&ml.predict_url).context("Invalid ML predict url")?,
            Url::parse(&ml.health_url).context("Invalid ML health url")?,
        )?),
        MlBackendKind::Openai => Arc::new(OpenAiBackend::new(
            ml.openai_api_key.clone(),
            ml.openai_model.clone(),
        )),
    };
    let breaker = Arc::new(CircuitBreaker::new(
        "ml-classifier",
        settings.circuit_breaker.breaker_config(),
    ));

    Ok(Some(MlClassifier::new(
        backend,
        breaker,
        ml.client_settings(settings.thresholds.label_similarity),
    )))
}

pub fn build_pipeline(
    settings: &Settings,
    taxonomy: Arc<dyn TaxonomySource>,
    ml: Option<Arc<MlClassifier>>,
) -> anyhow::Result<Pipeline> {
    let scraper = build_scraper(&settings.scraper)?;

    Ok(Pipeline::new(
        PipelineParts {
            scraper: Arc::new(scraper),
            ml,
            taxonomy,
            thresholds: settings.thresholds.clone(),
            max_content_keywords: settings.pipeline.max_content_keywords,
            max_concurrent_requests: settings.pipeline.max_concurrent_requests,
            max_queued_requests: settings.pipeline.max_queued_requests,
        },
        settings.pipeline.settings(),
    ))
}
