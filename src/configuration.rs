use std::time::Duration;

use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use url::Url;

use crate::{
    domain::thresholds::ClassifierThresholds,
    services::{
        acquisition::{CrawlSettings, RenderBackend},
        BreakerConfig, MlClientSettings, PipelineSettings,
    },
};

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub thresholds: ClassifierThresholds,
    pub circuit_breaker: CircuitBreakerSettings,
    pub scraper: ScraperSettings,
    pub ml: MlSettings,
    pub taxonomy: TaxonomySettings,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub enabled: bool,
    pub username: String,
    pub password: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub database_name: String,
    pub require_ssl: bool,
}

impl DatabaseSettings {
    pub fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = match self.require_ssl {
            true => PgSslMode::Require,
            false => PgSslMode::Prefer,
        };
        PgConnectOptions::new()
            .host(&self.host)
            .username(&self.username)
            .password(&self.password)
            .port(self.port)
            .ssl_mode(ssl_mode)
    }

    pub fn with_db(&self) -> PgConnectOptions {
        self.without_db().database(&self.database_name)
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct PipelineConfig {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub request_timeout_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub ml_reserve_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_concurrent_requests: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_queued_requests: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_content_keywords: usize,
}

impl PipelineConfig {
    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            ml_reserve: Duration::from_millis(self.ml_reserve_ms),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct CircuitBreakerSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub failure_threshold: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub success_threshold: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub open_timeout_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub reset_timeout_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub half_open_max_probes: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub health_check_interval_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub health_check_timeout_ms: u64,
}

impl CircuitBreakerSettings {
    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            open_timeout: Duration::from_millis(self.open_timeout_ms),
            reset_timeout: Duration::from_millis(self.reset_timeout_ms),
            half_open_max_probes: self.half_open_max_probes,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct ScraperSettings {
    pub multi_page: bool,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_pages: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub page_concurrency: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub page_timeout_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub sufficient_content_chars: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub min_page_text_chars: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_content_bytes: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub sitemap_timeout_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub primary_timeout_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub spoofed_timeout_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_concurrent_fetches: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_queued_fetches: usize,
    #[serde(default)]
    pub proxies: Vec<String>,
    pub browser: BrowserRenderingSettings,
}

impl ScraperSettings {
    pub fn crawl_settings(&self) -> CrawlSettings {
        CrawlSettings {
            multi_page: self.multi_page,
            max_pages: self.max_pages,
            page_concurrency: self.page_concurrency,
            page_timeout: Duration::from_millis(self.page_timeout_ms),
            sufficient_content_chars: self.sufficient_content_chars,
            min_page_text_chars: self.min_page_text_chars,
            max_content_bytes: self.max_content_bytes,
            sitemap_timeout: Duration::from_millis(self.sitemap_timeout_ms),
        }
    }
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RenderBackendKind {
    Service,
    Webdriver,
}

#[derive(Deserialize, Clone, Debug)]
pub struct BrowserRenderingSettings {
    pub enabled: bool,
    pub backend: RenderBackendKind,
    pub service_url: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub min_remaining_budget_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_ms: u64,
}

impl BrowserRenderingSettings {
    pub fn render_backend(&self) -> Result<RenderBackend, url::ParseError> {
        match self.backend {
            RenderBackendKind::Service => Ok(RenderBackend::Service {
                endpoint: Url::parse(&self.service_url)?,
            }),
            RenderBackendKind::Webdriver => Ok(RenderBackend::WebDriver {
                server_url: self.service_url.clone(),
            }),
        }
    }
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MlBackendKind {
    Http,
    Openai,
}

#[derive(Deserialize, Clone, Debug)]
pub struct MlSettings {
    pub enabled: bool,
    pub backend: MlBackendKind,
    pub predict_url: String,
    pub health_url: String,
    #[serde(default)]
    pub openai_api_key: String,
    pub openai_model: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub min_text_chars: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_text_chars: usize,
}

impl MlSettings {
    pub fn client_settings(&self, label_similarity: f64) -> MlClientSettings {
        MlClientSettings {
            min_text_chars: self.min_text_chars,
            max_text_chars: self.max_text_chars,
            timeout: Duration::from_millis(self.timeout_ms),
            label_similarity,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct TaxonomySettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub refresh_interval_secs: u64,
}

pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

/// `configuration/base.yaml`, then `configuration/{APP_ENVIRONMENT}.yaml`,
/// then `APP_*` environment variables (`APP_APPLICATION__PORT=8001`).
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(e.to_string()))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;
    let environment_filename = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")))
        .add_source(config::File::from(
            configuration_directory.join(environment_filename),
        ))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
