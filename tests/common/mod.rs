#![allow(dead_code)]

use std::{
    net::TcpListener,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use actix_web::{cookie::Cookie, web, App, HttpRequest, HttpResponse, HttpServer};
use async_trait::async_trait;
use sector::{
    domain::{code::CodeType, content::FetchStrategy, taxonomy::{KeywordFamily, Taxonomy}},
    services::{
        acquisition::{
            BodyKind, CascadingScraper, ContentFetcher, CrawlSettings, FetchError, FetchedPage,
        },
        BreakerConfig, CircuitBreaker, MlClassifier, MlClientSettings, MlError, ModelBackend,
        ModelPrediction, Pipeline, PipelineParts, PipelineSettings, TaxonomySource,
    },
};
use tokio::sync::Notify;
use url::Url;

pub enum StubBehaviour {
    Html(String),
    Status(u16),
    /// Host does not resolve.
    Dns,
    /// Never answers.
    Pending,
}

/// Scripted fetch strategy that never touches the network.
pub struct StubFetcher {
    strategy: FetchStrategy,
    behaviour: StubBehaviour,
    timeout: Duration,
    pub calls: AtomicUsize,
    pub started: Arc<Notify>,
}

impl StubFetcher {
    pub fn new(strategy: FetchStrategy, behaviour: StubBehaviour) -> Self {
        StubFetcher {
            strategy,
            behaviour,
            timeout: Duration::from_secs(10),
            calls: AtomicUsize::new(0),
            started: Arc::new(Notify::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentFetcher for StubFetcher {
    fn strategy(&self) -> FetchStrategy {
        self.strategy
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self, url: &Url, _budget: Duration) -> Result<FetchedPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();

        match &self.behaviour {
            StubBehaviour::Html(body) => Ok(FetchedPage {
                url: url.clone(),
                status: 200,
                body: body.clone(),
                strategy: self.strategy,
                kind: BodyKind::Html,
                truncated: false,
            }),
            StubBehaviour::Status(status) => Err(FetchError::Status(*status)),
            StubBehaviour::Dns => Err(FetchError::Dns(format!(
                "no such host {}",
                url.host_str().unwrap_or_default()
            ))),
            StubBehaviour::Pending => std::future::pending().await,
        }
    }
}

/// Scripted classification service.
pub struct StubModel {
    answer: Result<ModelPrediction, MlError>,
    pub calls: AtomicUsize,
}

impl StubModel {
    pub fn answering(label: &str, confidence: f64) -> Self {
        StubModel {
            answer: Ok(ModelPrediction {
                label: label.to_string(),
                confidence,
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        StubModel {
            answer: Err(MlError::ServiceUnavailable("status 503".to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelBackend for StubModel {
    fn name(&self) -> &str {
        "stub"
    }

    async fn predict(&self, _text: &str, _labels: &[String]) -> Result<ModelPrediction, MlError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }

    async fn health(&self) -> bool {
        self.answer.is_ok()
    }
}

pub fn ml_classifier(backend: Arc<StubModel>, failure_threshold: u32) -> Arc<MlClassifier> {
    let breaker = CircuitBreaker::new(
        "ml",
        BreakerConfig {
            failure_threshold,
            ..BreakerConfig::default()
        },
    );
    Arc::new(MlClassifier::new(
        backend,
        Arc::new(breaker),
        MlClientSettings::default(),
    ))
}

pub struct PipelineBuilder {
    fetchers: Vec<Arc<dyn ContentFetcher>>,
    ml: Option<Arc<MlClassifier>>,
    taxonomy: Arc<dyn TaxonomySource>,
    max_concurrent_requests: usize,
    max_queued_requests: usize,
}

impl PipelineBuilder {
    pub fn new(taxonomy: Arc<dyn TaxonomySource>) -> Self {
        PipelineBuilder {
            fetchers: Vec::new(),
            ml: None,
            taxonomy,
            max_concurrent_requests: 8,
            max_queued_requests: 8,
        }
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetchers.push(fetcher);
        self
    }

    pub fn ml(mut self, ml: Arc<MlClassifier>) -> Self {
        self.ml = Some(ml);
        self
    }

    pub fn admission(mut self, max_concurrent: usize, max_queued: usize) -> Self {
        self.max_concurrent_requests = max_concurrent;
        self.max_queued_requests = max_queued;
        self
    }

    pub fn build(self) -> Pipeline {
        let crawl = CrawlSettings {
            multi_page: false,
            ..CrawlSettings::default()
        };
        Pipeline::new(
            PipelineParts {
                scraper: Arc::new(CascadingScraper::new(self.fetchers, crawl)),
                ml: self.ml,
                taxonomy: self.taxonomy,
                thresholds: Default::default(),
                max_content_keywords: 300,
                max_concurrent_requests: self.max_concurrent_requests,
                max_queued_requests: self.max_queued_requests,
            },
            PipelineSettings::default(),
        )
    }
}

fn food_family(compatible: &[&str]) -> KeywordFamily {
    KeywordFamily {
        name: "food_drink".to_string(),
        keywords: ["pizza", "pizzeria", "pasta", "catering", "wine"]
            .into_iter()
            .map(String::from)
            .collect(),
        compatible_industries: compatible.iter().map(|s| s.to_string()).collect(),
    }
}

fn energy_family() -> KeywordFamily {
    KeywordFamily {
        name: "energy_utilities".to_string(),
        keywords: vec!["electricity".to_string(), "grid".to_string()],
        compatible_industries: ["Utilities".to_string()].into_iter().collect(),
    }
}

/// Small taxonomy whose numbers are easy to follow in assertions.
pub fn test_taxonomy() -> Taxonomy {
    Taxonomy::builder()
        .keyword("pizza", "Restaurants", 1.0)
        .keyword("pizzeria", "Restaurants", 1.0)
        .keyword("pasta", "Restaurants", 0.8)
        .keyword("catering", "Restaurants", 0.7)
        .keyword("wine", "Bars & Nightlife", 0.6)
        .keyword("electricity", "Utilities", 1.0)
        .keyword("grid", "Utilities", 0.8)
        .industry_code("Restaurants", CodeType::Mcc, "5812", "Eating Places", 1.0)
        .industry_code("Restaurants", CodeType::Naics, "722511", "Full-Service Restaurants", 1.0)
        .industry_code("Utilities", CodeType::Mcc, "4900", "Utilities", 1.0)
        .crosswalk("5812", "722511", "5812")
        .family(food_family(&["Restaurants", "Bars & Nightlife"]))
        .family(energy_family())
        .build()
}

/// Catering and wine strongly mapped to Utilities, while their family says
/// they belong with restaurants.
pub fn mismatched_taxonomy() -> Taxonomy {
    Taxonomy::builder()
        .keyword("catering", "Utilities", 3.0)
        .keyword("wine", "Utilities", 3.0)
        .industry_code("Restaurants", CodeType::Mcc, "5812", "Eating Places", 1.0)
        .industry_code("Restaurants", CodeType::Naics, "722511", "Full-Service Restaurants", 1.0)
        .industry_code("Utilities", CodeType::Mcc, "4900", "Utilities", 1.0)
        .family(food_family(&["Restaurants"]))
        .family(energy_family())
        .build()
}

pub fn html_page(title: &str, text: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">{}</a> "#, href, href.trim_matches('/')))
        .collect();
    format!(
        r#"<html><head><title>{}</title><meta name="description" content="{}"></head><body><nav>{}</nav><main><p>{}</p></main><script>var tracking = "pizza";</script></body></html>"#,
        title, title, anchors, text
    )
}

/// Throwaway website on a random local port.
///
/// `/` links to a few pages and `/sitemap.xml` lists `/catering` and
/// `/about`; `/blocked` serves a bot wall, `/slow` answers after 3s, `/huge`
/// streams about 6 MB without a content length, `/gate` sets a cookie and
/// redirects to `/gate-check`, and everything unknown is a 404.
pub fn spawn_website() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let base = format!("http://127.0.0.1:{}", port);
    let base_data = web::Data::new(base.clone());

    let server = HttpServer::new(move || {
        App::new()
            .app_data(base_data.clone())
            .route("/", web::get().to(home))
            .route("/sitemap.xml", web::get().to(sitemap))
            .route("/blocked", web::get().to(blocked))
            .route("/slow", web::get().to(slow))
            .route("/thin", web::get().to(thin))
            .route("/huge", web::get().to(huge))
            .route("/gate", web::get().to(gate))
            .route("/gate-check", web::get().to(gate_check))
            .route("/{page:.*}", web::get().to(subpage))
    })
    .workers(1)
    .listen(listener)
    .expect("Failed to listen")
    .run();
    tokio::spawn(server);

    Url::parse(&format!("{}/", base)).unwrap()
}

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

async fn home() -> HttpResponse {
    html(html_page(
        "Tony's Pizzeria",
        "Tony's Pizzeria bakes wood fired pizza in the heart of town every single day.",
        &["/blog/post-1", "/about", "/privacy", "/menu"],
    ))
}

async fn sitemap(base: web::Data<String>) -> HttpResponse {
    let body = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><urlset><url><loc>{0}/catering</loc></url><url><loc>{0}/about</loc></url><url><loc>https://elsewhere.example/about</loc></url></urlset>"#,
        base.get_ref()
    );
    HttpResponse::Ok().content_type("application/xml").body(body)
}

async fn blocked() -> HttpResponse {
    html(r#"<html><body><div id="cf-chl-widget"></div><p>Just a moment...</p></body></html>"#.to_string())
}

async fn slow() -> HttpResponse {
    tokio::time::sleep(Duration::from_secs(3)).await;
    html(html_page("Slow", &"slow page ".repeat(20), &[]))
}

async fn huge() -> HttpResponse {
    let chunk = web::Bytes::from("<p>pizza pasta catering</p>".repeat(220));
    let chunks = futures::stream::iter(
        std::iter::repeat(chunk)
            .take(1000)
            .map(Ok::<_, actix_web::Error>),
    );
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .streaming(chunks)
}

async fn gate() -> HttpResponse {
    HttpResponse::Found()
        .cookie(Cookie::new("passed", "1"))
        .insert_header(("Location", "/gate-check"))
        .finish()
}

async fn gate_check(request: HttpRequest) -> HttpResponse {
    let text = match request.cookie("passed") {
        Some(_) => "Welcome back to the pizzeria",
        None => "First visit, please wait",
    };
    html(html_page("Gate", text, &[]))
}

async fn thin() -> HttpResponse {
    html(html_page("Thin", "Coming soon", &[]))
}

async fn subpage(path: web::Path<String>) -> HttpResponse {
    let page = path.into_inner();
    match page.as_str() {
        "about" | "menu" | "catering" | "privacy" | "blog/post-1" => {
            let topic = page.replace(['/', '-'], " ");
            html(html_page(&topic, &format!("{} words ", topic).repeat(25), &["/"]))
        }
        _ => HttpResponse::NotFound().finish(),
    }
}
