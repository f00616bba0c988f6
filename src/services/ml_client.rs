use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use super::circuit_breaker::{CallError, CircuitBreaker, CircuitState};
use crate::domain::{deadline::Deadline, industry::IndustryCandidate, taxonomy::Taxonomy};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MlError {
    #[error("only {chars} chars of text, at least {min} needed")]
    InsufficientContent { chars: usize, min: usize },
    #[error("ML circuit is open")]
    CircuitOpen,
    #[error("ML call timed out after {0:?}")]
    Timeout(Duration),
    #[error("ML service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("ML service rejected the request with status {0}")]
    Rejected(u16),
    #[error("invalid ML response: {0}")]
    InvalidResponse(String),
    #[error("ML label {0:?} does not match any known industry")]
    UnknownLabel(String),
}

impl MlError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MlError::CircuitOpen | MlError::Timeout(_) | MlError::ServiceUnavailable(_)
        )
    }

    /// Errors that say something about the service's health. Client-side
    /// rejections and unknown labels do not.
    pub fn counts_as_failure(&self) -> bool {
        matches!(
            self,
            MlError::Timeout(_) | MlError::ServiceUnavailable(_) | MlError::InvalidResponse(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelPrediction {
    pub label: String,
    pub confidence: f64,
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &str;

    /// `labels` lists the industries the answer should come from; backends
    /// may ignore it.
    async fn predict(&self, text: &str, labels: &[String]) -> Result<ModelPrediction, MlError>;

    async fn health(&self) -> bool;
}

#[derive(Serialize)]
struct PredictBody<'a> {
    text: &'a str,
}

/// Remote classification service: `POST {text}` answers `{label, confidence}`.
pub struct HttpModelBackend {
    client: Client,
    predict_url: Url,
    health_url: Url,
}

impl HttpModelBackend {
    pub fn new(predict_url: Url, health_url: Url) -> Result<Self, reqwest::Error> {
        let client = Client::builder().build()?;
        Ok(HttpModelBackend {
            client,
            predict_url,
            health_url,
        })
    }
}

#[async_trait]
impl ModelBackend for HttpModelBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn predict(&self, text: &str, _labels: &[String]) -> Result<ModelPrediction, MlError> {
        let response = self
            .client
            .post(self.predict_url.clone())
            .json(&PredictBody { text })
            .send()
            .await
            .map_err(|e| MlError::ServiceUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(MlError::ServiceUnavailable(format!("status {}", status)));
        }
        if !status.is_success() {
            return Err(MlError::Rejected(status.as_u16()));
        }

        response
            .json::<ModelPrediction>()
            .await
            .map_err(|e| MlError::InvalidResponse(e.to_string()))
    }

    async fn health(&self) -> bool {
        match self.client.get(self.health_url.clone()).send().await {
            Ok(res) => res.status().is_success(),
            Err(e) => {
                log::debug!("ML health check failed. Error: {}", e);
                false
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MlClientSettings {
    pub min_text_chars: usize,
    pub max_text_chars: usize,
    pub timeout: Duration,
    pub label_similarity: f64,
}

impl Default for MlClientSettings {
    fn default() -> Self {
        MlClientSettings {
            min_text_chars: 50,
            max_text_chars: 6000,
            timeout: Duration::from_secs(5),
            label_similarity: 0.90,
        }
    }
}

/// Asks a [`ModelBackend`] for a label, always through the breaker.
pub struct MlClassifier {
    backend: Arc<dyn ModelBackend>,
    breaker: Arc<CircuitBreaker>,
    settings: MlClientSettings,
}

impl MlClassifier {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        breaker: Arc<CircuitBreaker>,
        settings: MlClientSettings,
    ) -> Self {
        MlClassifier {
            backend,
            breaker,
            settings,
        }
    }

    pub fn backend(&self) -> &Arc<dyn ModelBackend> {
        &self.backend
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn settings(&self) -> &MlClientSettings {
        &self.settings
    }

    /// Short text is rejected locally without using a breaker slot. The
    /// returned label is mapped onto `taxonomy`'s industries when one is
    /// given.
    pub async fn classify(
        &self,
        text: &str,
        deadline: Deadline,
        taxonomy: Option<&Taxonomy>,
    ) -> Result<IndustryCandidate, MlError> {
        let chars = text.chars().count();
        if chars < self.settings.min_text_chars {
            return Err(MlError::InsufficientContent {
                chars,
                min: self.settings.min_text_chars,
            });
        }

        let budget = deadline.budget(self.settings.timeout);
        if budget.is_zero() {
            return Err(MlError::Timeout(budget));
        }

        let snippet = match text.char_indices().nth(self.settings.max_text_chars) {
            Some((end, _)) => &text[..end],
            None => text,
        };
        let labels: Vec<String> = taxonomy
            .map(|t| t.industries().map(String::from).collect())
            .unwrap_or_default();
        let backend = &self.backend;

        let prediction = self
            .breaker
            .call_with(
                move || async move {
                    let prediction =
                        match tokio::time::timeout(budget, backend.predict(snippet, &labels)).await
                        {
                            Ok(Ok(prediction)) => prediction,
                            Ok(Err(e)) => return Err(e),
                            Err(_) => return Err(MlError::Timeout(budget)),
                        };
                    match prediction.confidence.is_finite() && !prediction.label.trim().is_empty() {
                        true => Ok(prediction),
                        false => Err(MlError::InvalidResponse(format!("{:?}", prediction))),
                    }
                },
                MlError::counts_as_failure,
            )
            .await
            .map_err(|e| match e {
                CallError::Open => MlError::CircuitOpen,
                CallError::Inner(e) => e,
            })?;

        let label = match taxonomy {
            Some(taxonomy) => taxonomy
                .normalize_label(&prediction.label, self.settings.label_similarity)
                .ok_or_else(|| MlError::UnknownLabel(prediction.label.clone()))?
                .to_string(),
            None => prediction.label.trim().to_string(),
        };

        log::info!(
            "{} model predicted {} ({:.2}) as {}",
            self.backend.name(),
            prediction.label,
            prediction.confidence,
            label
        );
        Ok(IndustryCandidate::from_ml(label, prediction.confidence))
    }
}

/// Probes the backend while the breaker is not closed and feeds the result
/// back, so an idle service can recover without live traffic.
pub async fn ml_health_handler(
    backend: Arc<dyn ModelBackend>,
    breaker: Arc<CircuitBreaker>,
    interval: Duration,
    probe_timeout: Duration,
) {
    log::info!("Started ML health handler for {}", breaker.name());

    loop {
        tokio::time::sleep(interval).await;

        match breaker.state() {
            CircuitState::Closed => {}
            state => {
                let healthy = tokio::time::timeout(probe_timeout, backend.health())
                    .await
                    .unwrap_or(false);
                log::info!(
                    "ML health probe while {:?}: {}",
                    state,
                    match healthy {
                        true => "healthy",
                        false => "unhealthy",
                    }
                );
                breaker.record_health(healthy);
            }
        }
    }
}
