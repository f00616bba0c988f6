use std::collections::BTreeSet;

use serde::Serialize;

/// Label used when no signal is strong enough to name an industry.
pub const GENERAL_BUSINESS: &str = "General Business";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CandidateSource {
    Keyword,
    Ml,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndustryCandidate {
    industry: String,
    confidence: f64,
    source: CandidateSource,
    matched_keywords: BTreeSet<String>,
}

impl IndustryCandidate {
    pub fn new(
        industry: impl Into<String>,
        confidence: f64,
        source: CandidateSource,
        matched_keywords: BTreeSet<String>,
    ) -> Self {
        IndustryCandidate {
            industry: industry.into(),
            confidence: clamp_confidence(confidence),
            source,
            matched_keywords,
        }
    }

    pub fn from_ml(industry: impl Into<String>, confidence: f64) -> Self {
        Self::new(industry, confidence, CandidateSource::Ml, BTreeSet::new())
    }

    pub fn industry(&self) -> &str {
        &self.industry
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn source(&self) -> CandidateSource {
        self.source
    }

    pub fn matched_keywords(&self) -> &BTreeSet<String> {
        &self.matched_keywords
    }

    pub fn is_general(&self) -> bool {
        self.industry == GENERAL_BUSINESS
    }
}

/// Maps any float into [0, 1]; NaN becomes 0.
pub fn clamp_confidence(value: f64) -> f64 {
    match value.is_nan() {
        true => 0.0,
        false => value.clamp(0.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::{clamp_confidence, IndustryCandidate};

    #[test]
    fn clamp_confidence_bounds() {
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(1.7), 1.0);
        assert_eq!(clamp_confidence(f64::INFINITY), 1.0);
        assert_eq!(clamp_confidence(0.42), 0.42);
    }

    #[test]
    fn ml_candidate_is_clamped() {
        let candidate = IndustryCandidate::from_ml("Retail", 3.0);
        assert_eq!(candidate.confidence(), 1.0);
        assert!(candidate.matched_keywords().is_empty());
    }
}
