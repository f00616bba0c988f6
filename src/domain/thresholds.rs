use serde::Deserialize;

/// Every tunable number the classifier uses when ranking, voting and
/// picking codes. Loaded from the `thresholds` configuration section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClassifierThresholds {
    /// Keyword confidence at which the ML call is skipped.
    pub early_termination_confidence: f64,
    /// ML confidence above which ML wins a disagreement.
    pub dominance_threshold: f64,
    pub confidence_floor: f64,
    pub agreement_bonus: f64,

    pub min_keyword_matches: usize,
    pub min_keyword_confidence: f64,
    /// Score at which keyword strength reaches 1 - 1/e.
    pub keyword_saturation: f64,

    pub ml_min_confidence: f64,
    pub mismatch_penalty: f64,
    pub max_quality_bonus: f64,
    pub quality_target_chars: usize,

    pub industry_code_min_confidence: f64,
    pub keyword_relevance_threshold: f64,
    pub min_mapping_weight: f64,
    pub crosswalk_min_confidence: f64,
    pub crosswalk_discount: f64,
    pub max_codes_per_type: usize,

    pub label_similarity: f64,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        ClassifierThresholds {
            early_termination_confidence: 0.85,
            dominance_threshold: 0.60,
            confidence_floor: 0.35,
            agreement_bonus: 0.15,
            min_keyword_matches: 2,
            min_keyword_confidence: 0.35,
            keyword_saturation: 1.5,
            ml_min_confidence: 0.30,
            mismatch_penalty: 0.25,
            max_quality_bonus: 0.10,
            quality_target_chars: 2000,
            industry_code_min_confidence: 0.4,
            keyword_relevance_threshold: 0.5,
            min_mapping_weight: 0.3,
            crosswalk_min_confidence: 0.5,
            crosswalk_discount: 0.9,
            max_codes_per_type: 3,
            label_similarity: 0.90,
        }
    }
}
