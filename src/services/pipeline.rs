use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{sync::OwnedSemaphorePermit, time::Instant};
use uuid::Uuid;

use super::{
    acquisition::CascadingScraper,
    admission::{Admission, Overloaded},
    circuit_breaker::BreakerSnapshot,
    code_generator,
    consistency::check_consistency,
    ensemble::{EnsembleVoter, ResolveContext},
    industry_detector,
    keyword_extractor::KeywordExtractor,
    ml_client::{MlClassifier, MlError},
    taxonomy_store::TaxonomySource,
};
use crate::domain::{
    business::{BusinessInput, ValidationError},
    classification::{ClassificationResult, PipelineStage},
    content::{alphabetic_ratio, total_chars, ScrapedContent},
    deadline::Deadline,
    industry::IndustryCandidate,
    keyword::KeywordSet,
    taxonomy::Taxonomy,
    thresholds::ClassifierThresholds,
};

/// Result of one pipeline stage. `Degraded` carries usable (possibly
/// empty) data plus the reason, which ends up in the result's warnings.
#[derive(Debug)]
pub enum StageOutcome<T, E> {
    Success(T),
    Degraded { data: T, reason: String },
    Fatal(E),
}

impl<T, E> StageOutcome<T, E> {
    /// Unwraps the data, moving any degradation reason into `warnings`.
    pub fn absorb(self, warnings: &mut Vec<String>) -> Result<T, E> {
        match self {
            StageOutcome::Success(data) => Ok(data),
            StageOutcome::Degraded { data, reason } => {
                warnings.push(reason);
                Ok(data)
            }
            StageOutcome::Fatal(e) => Err(e),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),
    #[error(transparent)]
    Overloaded(#[from] Overloaded),
    #[error("deadline exhausted before classification started")]
    DeadlineExhausted,
}

impl ClassifyError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClassifyError::Overloaded(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub request_timeout: Duration,
    /// Time kept free for the ML call while content is being acquired.
    pub ml_reserve: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            request_timeout: Duration::from_secs(25),
            ml_reserve: Duration::from_secs(3),
        }
    }
}

pub struct PipelineParts {
    pub scraper: Arc<CascadingScraper>,
    pub ml: Option<Arc<MlClassifier>>,
    pub taxonomy: Arc<dyn TaxonomySource>,
    pub thresholds: ClassifierThresholds,
    pub max_content_keywords: usize,
    pub max_concurrent_requests: usize,
    pub max_queued_requests: usize,
}

pub struct Pipeline {
    scraper: Arc<CascadingScraper>,
    ml: Option<Arc<MlClassifier>>,
    taxonomy: Arc<dyn TaxonomySource>,
    thresholds: ClassifierThresholds,
    extractor: KeywordExtractor,
    voter: EnsembleVoter,
    admission: Admission,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(parts: PipelineParts, settings: PipelineSettings) -> Self {
        Pipeline {
            scraper: parts.scraper,
            ml: parts.ml,
            taxonomy: parts.taxonomy,
            extractor: KeywordExtractor::new(parts.max_content_keywords),
            voter: EnsembleVoter::new(parts.thresholds.clone()),
            thresholds: parts.thresholds,
            admission: Admission::new(
                "classification requests",
                parts.max_concurrent_requests,
                parts.max_queued_requests,
            ),
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn ml_breaker_snapshot(&self) -> Option<BreakerSnapshot> {
        self.ml.as_ref().map(|ml| ml.breaker().snapshot())
    }

    /// Validates raw fields, then classifies with an optional per-call timeout.
    pub async fn classify_request(
        &self,
        name: &str,
        description: Option<&str>,
        website_url: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<ClassificationResult, ClassifyError> {
        let input = BusinessInput::new(name, description, website_url)?;
        self.classify(input, timeout.map(Deadline::after)).await
    }

    /// Runs the whole pipeline. Every stage after admission may degrade;
    /// the only errors are being turned away or getting a deadline that
    /// already passed.
    pub async fn classify(
        &self,
        input: BusinessInput,
        deadline: Option<Deadline>,
    ) -> Result<ClassificationResult, ClassifyError> {
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        let deadline = match deadline {
            Some(caller) => caller.earliest(Deadline::after(self.settings.request_timeout)),
            None => Deadline::after(self.settings.request_timeout),
        };
        if deadline.is_expired() {
            return Err(ClassifyError::DeadlineExhausted);
        }

        let mut warnings = Vec::new();
        let _permit = self.admit(deadline).await.absorb(&mut warnings)?;
        let mut stages = vec![PipelineStage::Started];
        log::info!("[{}] Classifying {}", request_id, input.name());

        let taxonomy = self.taxonomy_snapshot().absorb(&mut warnings)?;

        let pages = self
            .acquire_content(&input, deadline)
            .await
            .absorb(&mut warnings)?;
        stages.push(PipelineStage::ContentAcquired);

        let keywords = self
            .extractor
            .extract(input.name(), input.description(), &pages);
        stages.push(PipelineStage::KeywordsExtracted);

        let candidates = self
            .detect_industries(&keywords, taxonomy.as_deref())
            .absorb(&mut warnings)?;
        stages.push(PipelineStage::KeywordClassified);

        let (ml_stage, ml_outcome) = self
            .run_ml(&input, &pages, &candidates, taxonomy.as_deref(), deadline)
            .await;
        let ml_candidate = ml_outcome.absorb(&mut warnings)?;
        stages.push(ml_stage);

        let resolution = self.voter.resolve(
            &candidates,
            ml_candidate.as_ref(),
            &ResolveContext {
                taxonomy: taxonomy.as_deref(),
                content_chars: total_chars(&pages),
                alphabetic_ratio: alphabetic_ratio(&pages),
            },
        );
        warnings.extend(resolution.warnings);
        stages.push(PipelineStage::Resolved);

        let codes = match taxonomy.as_deref() {
            Some(taxonomy) => code_generator::generate(
                &resolution.industry,
                &keywords,
                resolution.confidence,
                taxonomy,
                &self.thresholds,
            ),
            None => Vec::new(),
        };
        stages.push(PipelineStage::CodesGenerated);
        stages.push(PipelineStage::Done);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        log::info!(
            "[{}] Classified {} as {} ({:.2}, ml: {}, {} codes, {} warnings) in {}ms",
            request_id,
            input.name(),
            resolution.industry,
            resolution.confidence,
            resolution.used_ml,
            codes.len(),
            warnings.len(),
            elapsed_ms
        );

        Ok(ClassificationResult {
            request_id,
            industry: resolution.industry,
            confidence: resolution.confidence,
            codes,
            explanation: resolution.explanation,
            used_ml: resolution.used_ml,
            warnings,
            matched_keywords: resolution.matched_keywords,
            pages_scraped: pages.len(),
            stages,
            elapsed_ms,
        })
    }

    async fn admit(
        &self,
        deadline: Deadline,
    ) -> StageOutcome<OwnedSemaphorePermit, ClassifyError> {
        match tokio::time::timeout_at(deadline.instant(), self.admission.acquire()).await {
            Ok(Ok(permit)) => StageOutcome::Success(permit),
            Ok(Err(e)) => StageOutcome::Fatal(e.into()),
            Err(_) => StageOutcome::Fatal(ClassifyError::DeadlineExhausted),
        }
    }

    fn taxonomy_snapshot(&self) -> StageOutcome<Option<Arc<Taxonomy>>, ClassifyError> {
        match self.taxonomy.snapshot() {
            Ok(taxonomy) => StageOutcome::Success(Some(taxonomy)),
            Err(e) => {
                log::error!("Taxonomy unavailable, keyword and code paths disabled. Error: {}", e);
                StageOutcome::Degraded {
                    data: None,
                    reason: format!("Keyword and code lookups disabled: {}", e),
                }
            }
        }
    }

    async fn acquire_content(
        &self,
        input: &BusinessInput,
        deadline: Deadline,
    ) -> StageOutcome<Vec<ScrapedContent>, ClassifyError> {
        let Some(url) = input.website_url() else {
            return StageOutcome::Success(Vec::new());
        };

        let acquisition_deadline = deadline.reserve_up_to(self.settings.ml_reserve);
        match self.scraper.crawl(url, acquisition_deadline).await {
            Ok(pages) => StageOutcome::Success(pages),
            Err(e) => {
                log::warn!("Content acquisition failed for {}. Error: {}", url, e);
                StageOutcome::Degraded {
                    data: Vec::new(),
                    reason: format!("Website content unavailable: {}", e),
                }
            }
        }
    }

    fn detect_industries(
        &self,
        keywords: &KeywordSet,
        taxonomy: Option<&Taxonomy>,
    ) -> StageOutcome<Vec<IndustryCandidate>, ClassifyError> {
        match taxonomy {
            Some(taxonomy) => StageOutcome::Success(industry_detector::detect(
                keywords,
                taxonomy,
                &self.thresholds,
            )),
            // Already reported by the snapshot stage.
            None => StageOutcome::Success(Vec::new()),
        }
    }

    /// Skips the model when the top keyword candidate is confident and
    /// consistent. A failed consistency check always asks the model.
    async fn run_ml(
        &self,
        input: &BusinessInput,
        pages: &[ScrapedContent],
        candidates: &[IndustryCandidate],
        taxonomy: Option<&Taxonomy>,
        deadline: Deadline,
    ) -> (
        PipelineStage,
        StageOutcome<Option<IndustryCandidate>, ClassifyError>,
    ) {
        let skipped = |reason: Option<String>| {
            let outcome = match reason {
                Some(reason) => StageOutcome::Degraded { data: None, reason },
                None => StageOutcome::Success(None),
            };
            (PipelineStage::MlSkipped, outcome)
        };

        if let Some(top) = candidates.first() {
            let consistent = taxonomy.map_or(true, |taxonomy| {
                check_consistency(top.industry(), top.matched_keywords(), taxonomy).passed()
            });
            if consistent && top.confidence() >= self.thresholds.early_termination_confidence {
                log::info!(
                    "Keyword confidence {:.2} for {} is high enough, skipping ML",
                    top.confidence(),
                    top.industry()
                );
                return skipped(None);
            }
            if !consistent {
                log::info!("Keywords do not fit {}, asking ML", top.industry());
            }
        }

        let Some(ml) = &self.ml else {
            return skipped(None);
        };
        if deadline.is_expired() {
            return skipped(Some("Deadline reached before the ML call".to_string()));
        }

        let text = ml_text(input, pages);
        match ml.classify(&text, deadline, taxonomy).await {
            Ok(candidate) => (
                PipelineStage::MlInvoked,
                StageOutcome::Success(Some(candidate)),
            ),
            Err(e @ (MlError::InsufficientContent { .. } | MlError::CircuitOpen)) => {
                log::info!("ML skipped. Reason: {}", e);
                skipped(Some(format!("ML classification skipped: {}", e)))
            }
            Err(e) => {
                log::warn!("ML classification failed. Error: {}", e);
                (
                    PipelineStage::MlInvoked,
                    StageOutcome::Degraded {
                        data: None,
                        reason: format!("ML classification failed: {}", e),
                    },
                )
            }
        }
    }
}

/// Name, description and page text in one blob for the model.
fn ml_text(input: &BusinessInput, pages: &[ScrapedContent]) -> String {
    [input.name()]
        .into_iter()
        .chain(input.description())
        .chain(pages.iter().map(|page| page.text.as_str()))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::{ml_text, ClassifyError, StageOutcome};
    use crate::{domain::business::BusinessInput, services::admission::Overloaded};

    #[test]
    fn degraded_outcome_becomes_warning() {
        let mut warnings = Vec::new();
        let outcome: StageOutcome<Vec<u8>, ClassifyError> = StageOutcome::Degraded {
            data: vec![],
            reason: "site down".to_string(),
        };

        assert_eq!(outcome.absorb(&mut warnings).unwrap(), Vec::<u8>::new());
        assert_eq!(warnings, vec!["site down"]);
    }

    #[test]
    fn fatal_outcome_is_an_error() {
        let mut warnings = Vec::new();
        let outcome: StageOutcome<(), ClassifyError> =
            StageOutcome::Fatal(Overloaded("requests").into());

        let error = outcome.absorb(&mut warnings).unwrap_err();
        assert!(error.is_retryable());
        assert!(warnings.is_empty());
    }

    #[test]
    fn ml_text_joins_sources() {
        let input = BusinessInput::new("Tony's", Some("Pizza place"), None).unwrap();

        assert_eq!(ml_text(&input, &[]), "Tony's\nPizza place");
    }
}
