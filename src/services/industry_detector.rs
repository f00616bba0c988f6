use std::collections::{BTreeSet, HashMap};

use crate::domain::{
    industry::{CandidateSource, IndustryCandidate},
    keyword::KeywordSet,
    taxonomy::Taxonomy,
    thresholds::ClassifierThresholds,
};

/// Ranks industries by the weighted keywords that point at them.
///
/// Confidence grows with the absolute score (saturating) and with the
/// industry's share of all matched weight, so a lone weak hit or an even
/// split between industries never looks certain. Candidates below the
/// match-count or confidence thresholds are dropped; an empty result means
/// the keywords alone say nothing.
pub fn detect(
    keywords: &KeywordSet,
    taxonomy: &Taxonomy,
    thresholds: &ClassifierThresholds,
) -> Vec<IndustryCandidate> {
    let mut scores: HashMap<&str, (f64, BTreeSet<String>)> = HashMap::new();

    for term in keywords.terms() {
        for entry in taxonomy.industries_for_keyword(term) {
            let (score, matched) = scores.entry(entry.industry.as_str()).or_default();
            *score += entry.weight;
            matched.insert(term.to_string());
        }
    }

    let total: f64 = scores.values().map(|(score, _)| score).sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let mut ranked: Vec<(&str, f64, BTreeSet<String>)> = scores
        .into_iter()
        .map(|(industry, (score, matched))| (industry, score, matched))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(b.0)));

    ranked
        .into_iter()
        .filter(|(_, _, matched)| matched.len() >= thresholds.min_keyword_matches)
        .map(|(industry, score, matched)| {
            let confidence = keyword_confidence(score, total, thresholds.keyword_saturation);
            IndustryCandidate::new(industry, confidence, CandidateSource::Keyword, matched)
        })
        .filter(|candidate| candidate.confidence() >= thresholds.min_keyword_confidence)
        .collect()
}

fn keyword_confidence(score: f64, total: f64, saturation: f64) -> f64 {
    let strength = 1.0 - (-score / saturation.max(f64::EPSILON)).exp();
    let share = score / total;
    strength * (0.5 + 0.5 * share)
}

#[cfg(test)]
mod tests {
    use super::detect;
    use crate::domain::{
        keyword::{KeywordSet, KeywordSource},
        taxonomy::Taxonomy,
        thresholds::ClassifierThresholds,
    };

    fn taxonomy() -> Taxonomy {
        Taxonomy::builder()
            .keyword("pizza", "Restaurants", 1.0)
            .keyword("pasta", "Restaurants", 0.8)
            .keyword("oven", "Restaurants", 0.3)
            .keyword("oven", "Manufacturing", 0.5)
            .keyword("wine", "Bars & Nightlife", 0.6)
            .keyword("cocktail", "Bars & Nightlife", 0.9)
            .build()
    }

    fn keywords(terms: &[&str]) -> KeywordSet {
        let mut set = KeywordSet::new();
        for term in terms {
            set.insert(term, KeywordSource::Content);
        }
        set
    }

    #[test]
    fn detect_ranks_by_score() {
        let candidates = detect(
            &keywords(&["pizza", "pasta", "oven", "wine", "cocktail"]),
            &taxonomy(),
            &ClassifierThresholds::default(),
        );

        let industries: Vec<&str> = candidates.iter().map(|c| c.industry()).collect();
        assert_eq!(industries, vec!["Restaurants", "Bars & Nightlife"]);
        assert!(candidates[0].confidence() > candidates[1].confidence());
        assert!(candidates[0].matched_keywords().contains("oven"));
    }

    #[test]
    fn detect_requires_min_matches() {
        let candidates = detect(
            &keywords(&["pizza", "oven"]),
            &taxonomy(),
            &ClassifierThresholds::default(),
        );

        // Manufacturing only matched "oven".
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].industry(), "Restaurants");
    }

    #[test]
    fn detect_empty_without_matches() {
        let candidates = detect(
            &keywords(&["plumbing", "roofing"]),
            &taxonomy(),
            &ClassifierThresholds::default(),
        );

        assert!(candidates.is_empty());
    }

    #[test]
    fn detect_drops_low_confidence() {
        let thresholds = ClassifierThresholds {
            min_keyword_confidence: 0.9,
            ..ClassifierThresholds::default()
        };
        let candidates = detect(&keywords(&["pizza", "pasta"]), &taxonomy(), &thresholds);

        assert!(candidates.is_empty());
    }

    #[test]
    fn detect_confidence_saturates_below_one() {
        let mut builder = Taxonomy::builder();
        let mut set = KeywordSet::new();
        for i in 0..20 {
            let term = format!("term{}", i);
            builder = builder.keyword(&term, "Technology", 5.0);
            set.insert(&term, KeywordSource::Name);
        }

        let candidates = detect(&set, &builder.build(), &ClassifierThresholds::default());

        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].confidence() <= 1.0);
        assert!(candidates[0].confidence() > 0.99);
    }
}
