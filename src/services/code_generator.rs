use std::collections::{BTreeSet, HashMap};

use itertools::Itertools;

use crate::domain::{
    code::{CodeOrigin, CodeType, IndustryCode},
    industry::{clamp_confidence, GENERAL_BUSINESS},
    keyword::KeywordSet,
    taxonomy::{CodeRef, Taxonomy},
    thresholds::ClassifierThresholds,
};

/// Produces MCC, NAICS and SIC codes for a resolved label.
///
/// With a general label or a low confidence only strong keyword→code
/// matches are trusted. Otherwise the industry's own mappings come first,
/// keyword matches that point at the same industry are added, and code
/// types still missing are filled from the crosswalk.
pub fn generate(
    industry: &str,
    keywords: &KeywordSet,
    confidence: f64,
    taxonomy: &Taxonomy,
    thresholds: &ClassifierThresholds,
) -> Vec<IndustryCode> {
    let confidence = clamp_confidence(confidence);
    let low_confidence =
        industry == GENERAL_BUSINESS || confidence < thresholds.industry_code_min_confidence;

    let mut codes: Vec<IndustryCode> = Vec::new();

    if low_confidence {
        let scale = confidence.max(thresholds.confidence_floor);
        codes.extend(keyword_codes(keywords, taxonomy, thresholds, scale, |_| true));
        return finalize(codes, thresholds.max_codes_per_type);
    }

    codes.extend(
        taxonomy
            .codes_for_industry(industry)
            .iter()
            .filter(|mapping| mapping.weight >= thresholds.min_mapping_weight)
            .map(|mapping| IndustryCode {
                code_type: mapping.code_type,
                code: mapping.code.clone(),
                description: mapping.description.clone(),
                confidence_within_type: clamp_confidence(mapping.weight * confidence),
                origin: CodeOrigin::IndustryMapping,
            }),
    );
    codes.extend(keyword_codes(
        keywords,
        taxonomy,
        thresholds,
        confidence,
        |keyword| taxonomy.maps_keyword_to(keyword, industry),
    ));

    let present: BTreeSet<CodeType> = codes.iter().map(|c| c.code_type).collect();
    let backfill: Vec<IndustryCode> = codes
        .iter()
        .filter(|source| source.confidence_within_type >= thresholds.crosswalk_min_confidence)
        .flat_map(|source| {
            let from = CodeRef::new(source.code_type, &source.code);
            taxonomy
                .crosswalk_partners(&from)
                .iter()
                .filter(|partner| !present.contains(&partner.code_type))
                .map(|partner| IndustryCode {
                    code_type: partner.code_type,
                    code: partner.code.clone(),
                    description: taxonomy
                        .code_description(partner)
                        .unwrap_or_default()
                        .to_string(),
                    confidence_within_type: clamp_confidence(
                        source.confidence_within_type * thresholds.crosswalk_discount,
                    ),
                    origin: CodeOrigin::Crosswalk,
                })
                .collect::<Vec<_>>()
        })
        .collect();
    if !backfill.is_empty() {
        log::debug!("Crosswalk added {} codes for {}", backfill.len(), industry);
    }
    codes.extend(backfill);

    finalize(codes, thresholds.max_codes_per_type)
}

fn keyword_codes<'a>(
    keywords: &'a KeywordSet,
    taxonomy: &'a Taxonomy,
    thresholds: &'a ClassifierThresholds,
    scale: f64,
    accept: impl Fn(&str) -> bool + 'a,
) -> impl Iterator<Item = IndustryCode> + 'a {
    keywords
        .terms()
        .filter(move |keyword| accept(*keyword))
        .flat_map(move |keyword| taxonomy.codes_for_keyword(keyword))
        .filter(move |code| code.relevance >= thresholds.keyword_relevance_threshold)
        .map(move |code| IndustryCode {
            code_type: code.code_type,
            code: code.code.clone(),
            description: code.description.clone(),
            confidence_within_type: clamp_confidence(code.relevance * scale),
            origin: CodeOrigin::KeywordMatch,
        })
}

/// Dedups by (type, code) keeping the most confident entry, orders
/// MCC, NAICS, SIC then confidence desc then code, and caps each type.
fn finalize(codes: Vec<IndustryCode>, max_per_type: usize) -> Vec<IndustryCode> {
    let mut best: HashMap<(CodeType, String), IndustryCode> = HashMap::new();
    for code in codes {
        let key = (code.code_type, code.code.clone());
        match best.get(&key) {
            Some(existing) if existing.confidence_within_type >= code.confidence_within_type => {}
            _ => {
                best.insert(key, code);
            }
        }
    }

    best.into_values()
        .sorted_by(|a, b| {
            a.code_type
                .cmp(&b.code_type)
                .then(b.confidence_within_type.total_cmp(&a.confidence_within_type))
                .then(a.code.cmp(&b.code))
        })
        .chunk_by(|code| code.code_type)
        .into_iter()
        .flat_map(|(_, group)| group.take(max_per_type).collect::<Vec<_>>())
        .collect()
}
