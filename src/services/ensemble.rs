use itertools::Itertools;

use super::consistency::check_consistency;
use crate::domain::{
    industry::{clamp_confidence, IndustryCandidate, GENERAL_BUSINESS},
    taxonomy::Taxonomy,
    thresholds::ClassifierThresholds,
};

/// What the voter knows about the request besides the candidates.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveContext<'a> {
    /// `None` when the store is unavailable; consistency is then not checked.
    pub taxonomy: Option<&'a Taxonomy>,
    pub content_chars: usize,
    pub alphabetic_ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub industry: String,
    pub confidence: f64,
    pub used_ml: bool,
    pub matched_keywords: Vec<String>,
    pub explanation: String,
    pub warnings: Vec<String>,
    pub consistency_failed: bool,
}

pub struct EnsembleVoter {
    thresholds: ClassifierThresholds,
}

impl EnsembleVoter {
    pub fn new(thresholds: ClassifierThresholds) -> Self {
        EnsembleVoter { thresholds }
    }

    /// Picks the final label out of the ranked keyword candidates and the
    /// optional ML prediction, then calibrates its confidence.
    pub fn resolve(
        &self,
        keyword_candidates: &[IndustryCandidate],
        ml_candidate: Option<&IndustryCandidate>,
        context: &ResolveContext<'_>,
    ) -> Resolution {
        let t = &self.thresholds;
        let mut warnings = Vec::new();

        let ml = match ml_candidate {
            Some(ml) if ml.is_general() || ml.confidence() < t.ml_min_confidence => {
                warnings.push(format!(
                    "Model prediction {} ({:.2}) ignored as too weak",
                    ml.industry(),
                    ml.confidence()
                ));
                None
            }
            other => other,
        };
        let used_ml = ml.is_some();

        let keyword = keyword_candidates.first().filter(|c| !c.is_general());
        let mut keyword_confidence = keyword.map(|c| c.confidence()).unwrap_or(0.0);
        let mut consistency_failed = false;
        if let (Some(candidate), Some(taxonomy)) = (keyword, context.taxonomy) {
            let verdict =
                check_consistency(candidate.industry(), candidate.matched_keywords(), taxonomy);
            if !verdict.passed() {
                consistency_failed = true;
                keyword_confidence *= 1.0 - t.mismatch_penalty;
                warnings.push(format!(
                    "Keywords {} do not fit {}",
                    verdict.conflicting.join(", "),
                    candidate.industry()
                ));
            }
        }

        let (industry, base, agreement, matched, explanation) = match (keyword, ml) {
            (None, None) => {
                warnings.push("No keyword or model signal, using general label".to_string());
                return Resolution {
                    industry: GENERAL_BUSINESS.to_string(),
                    confidence: clamp_confidence(t.confidence_floor),
                    used_ml: false,
                    matched_keywords: Vec::new(),
                    explanation: "Not enough information to name a specific industry."
                        .to_string(),
                    warnings,
                    consistency_failed: false,
                };
            }
            (Some(kw), None) => (
                kw.industry().to_string(),
                keyword_confidence,
                0.0,
                sorted_terms(kw),
                keyword_explanation(kw, consistency_failed),
            ),
            (None, Some(ml)) => (
                ml.industry().to_string(),
                ml.confidence(),
                0.0,
                Vec::new(),
                model_explanation(ml),
            ),
            (Some(kw), Some(ml)) => {
                let agreeing = keyword_candidates
                    .iter()
                    .find(|c| c.industry() == ml.industry());
                match agreeing {
                    Some(agreed) => {
                        let agreed_confidence = match agreed.industry() == kw.industry() {
                            true => keyword_confidence,
                            false => agreed.confidence(),
                        };
                        let explanation = match consistency_failed && agreed == kw {
                            true => generic_explanation(ml.industry()),
                            false => format!(
                                "Classified as {}: keywords ({}) and the model agree.",
                                ml.industry(),
                                agreed.matched_keywords().iter().join(", ")
                            ),
                        };
                        (
                            ml.industry().to_string(),
                            agreed_confidence.max(ml.confidence()),
                            t.agreement_bonus,
                            sorted_terms(agreed),
                            explanation,
                        )
                    }
                    None if ml.confidence() > t.dominance_threshold => {
                        warnings.push(format!(
                            "Model label {} overrides keyword label {}",
                            ml.industry(),
                            kw.industry()
                        ));
                        (
                            ml.industry().to_string(),
                            ml.confidence(),
                            0.0,
                            Vec::new(),
                            model_explanation(ml),
                        )
                    }
                    None => {
                        warnings.push(format!(
                            "Model suggested {} ({:.2}), keeping keyword label {}",
                            ml.industry(),
                            ml.confidence(),
                            kw.industry()
                        ));
                        (
                            kw.industry().to_string(),
                            keyword_confidence,
                            0.0,
                            sorted_terms(kw),
                            keyword_explanation(kw, consistency_failed),
                        )
                    }
                }
            }
        };

        let confidence = self.calibrate(base, agreement, context);
        log::debug!(
            "Resolved {} at {:.3} (base {:.3}, ml: {})",
            industry,
            confidence,
            base,
            used_ml
        );

        Resolution {
            industry,
            confidence,
            used_ml,
            matched_keywords: matched,
            explanation,
            warnings,
            consistency_failed,
        }
    }

    /// `clamp(base * (1 + quality + agreement), floor, 1)`; NaN lands on the floor.
    fn calibrate(&self, base: f64, agreement: f64, context: &ResolveContext<'_>) -> f64 {
        let t = &self.thresholds;
        let coverage = match t.quality_target_chars {
            0 => 1.0,
            target => (context.content_chars as f64 / target as f64).min(1.0),
        };
        let quality = t.max_quality_bonus * coverage * clamp_confidence(context.alphabetic_ratio);

        let floor = clamp_confidence(t.confidence_floor);
        clamp_confidence(base * (1.0 + quality + agreement)).max(floor)
    }
}

fn sorted_terms(candidate: &IndustryCandidate) -> Vec<String> {
    candidate.matched_keywords().iter().cloned().collect()
}

fn keyword_explanation(candidate: &IndustryCandidate, consistency_failed: bool) -> String {
    match consistency_failed {
        true => generic_explanation(candidate.industry()),
        false => format!(
            "Classified as {} from keywords: {}.",
            candidate.industry(),
            candidate.matched_keywords().iter().join(", ")
        ),
    }
}

fn model_explanation(candidate: &IndustryCandidate) -> String {
    format!(
        "Classified as {} by the model ({:.2}).",
        candidate.industry(),
        candidate.confidence()
    )
}

fn generic_explanation(industry: &str) -> String {
    format!("Classified as {} from the overall business profile.", industry)
}
