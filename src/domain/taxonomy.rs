use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Deserialize;
use strsim::jaro_winkler;

use super::code::CodeType;

const BUNDLED_TAXONOMY: &str = include_str!("../../data/taxonomy.json");

#[derive(Debug, Clone, PartialEq)]
pub struct IndustryWeight {
    pub industry: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CodeMapping {
    pub code_type: CodeType,
    pub code: String,
    pub description: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeywordCode {
    pub code_type: CodeType,
    pub code: String,
    pub description: String,
    pub relevance: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodeRef {
    pub code_type: CodeType,
    pub code: String,
}

impl CodeRef {
    pub fn new(code_type: CodeType, code: &str) -> Self {
        CodeRef {
            code_type,
            code: code.to_string(),
        }
    }
}

/// Group of semantically related keywords and the industries they can
/// legitimately point at.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeywordFamily {
    pub name: String,
    pub keywords: Vec<String>,
    pub compatible_industries: BTreeSet<String>,
}

impl KeywordFamily {
    pub fn is_compatible_with(&self, industry: &str) -> bool {
        self.compatible_industries.contains(industry)
    }
}

#[derive(Deserialize)]
struct IndustrySeed {
    name: String,
    #[serde(default)]
    keywords: BTreeMap<String, f64>,
    #[serde(default)]
    codes: Vec<CodeMapping>,
}

#[derive(Deserialize)]
struct KeywordCodeSeed {
    keyword: String,
    #[serde(flatten)]
    code: KeywordCode,
}

#[derive(Deserialize)]
struct CrosswalkSeed {
    mcc: String,
    naics: String,
    sic: String,
}

#[derive(Deserialize)]
struct TaxonomySeed {
    industries: Vec<IndustrySeed>,
    #[serde(default)]
    keyword_codes: Vec<KeywordCodeSeed>,
    #[serde(default)]
    crosswalk: Vec<CrosswalkSeed>,
    #[serde(default)]
    families: Vec<KeywordFamily>,
}

/// Read-only snapshot of everything the classifier looks up: the
/// keyword index, code mappings, the MCC/NAICS/SIC crosswalk and keyword
/// families. Built once, then shared behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    industries: BTreeSet<String>,
    keyword_index: HashMap<String, Vec<IndustryWeight>>,
    industry_codes: HashMap<String, Vec<CodeMapping>>,
    keyword_codes: HashMap<String, Vec<KeywordCode>>,
    crosswalk: HashMap<CodeRef, Vec<CodeRef>>,
    code_descriptions: HashMap<CodeRef, String>,
    families: Vec<KeywordFamily>,
    family_index: HashMap<String, Vec<usize>>,
}

impl Taxonomy {
    pub fn builder() -> TaxonomyBuilder {
        TaxonomyBuilder::default()
    }

    pub fn from_json(raw: &str) -> Result<Taxonomy, serde_json::Error> {
        let seed: TaxonomySeed = serde_json::from_str(raw)?;
        let mut builder = Taxonomy::builder();

        for industry in seed.industries {
            builder = builder.industry(&industry.name);
            for (keyword, weight) in industry.keywords {
                builder = builder.keyword(&keyword, &industry.name, weight);
            }
            for mapping in industry.codes {
                builder = builder.industry_code(
                    &industry.name,
                    mapping.code_type,
                    &mapping.code,
                    &mapping.description,
                    mapping.weight,
                );
            }
        }
        for row in seed.keyword_codes {
            builder = builder.keyword_code(
                &row.keyword,
                row.code.code_type,
                &row.code.code,
                &row.code.description,
                row.code.relevance,
            );
        }
        for row in seed.crosswalk {
            builder = builder.crosswalk(&row.mcc, &row.naics, &row.sic);
        }
        for family in seed.families {
            builder = builder.family(family);
        }

        Ok(builder.build())
    }

    /// Seed shipped with the binary.
    pub fn bundled() -> Result<Taxonomy, serde_json::Error> {
        Taxonomy::from_json(BUNDLED_TAXONOMY)
    }

    pub fn industries(&self) -> impl Iterator<Item = &str> {
        self.industries.iter().map(String::as_str)
    }

    pub fn has_industry(&self, industry: &str) -> bool {
        self.industries.contains(industry)
    }

    pub fn keyword_count(&self) -> usize {
        self.keyword_index.len()
    }

    pub fn industries_for_keyword(&self, keyword: &str) -> &[IndustryWeight] {
        self.keyword_index
            .get(keyword)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn maps_keyword_to(&self, keyword: &str, industry: &str) -> bool {
        self.industries_for_keyword(keyword)
            .iter()
            .any(|w| w.industry == industry)
    }

    pub fn codes_for_industry(&self, industry: &str) -> &[CodeMapping] {
        self.industry_codes
            .get(industry)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn codes_for_keyword(&self, keyword: &str) -> &[KeywordCode] {
        self.keyword_codes
            .get(keyword)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn crosswalk_partners(&self, code: &CodeRef) -> &[CodeRef] {
        self.crosswalk
            .get(code)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn code_description(&self, code: &CodeRef) -> Option<&str> {
        self.code_descriptions.get(code).map(String::as_str)
    }

    pub fn families(&self) -> &[KeywordFamily] {
        &self.families
    }

    pub fn families_for_keyword<'a>(
        &'a self,
        keyword: &str,
    ) -> impl Iterator<Item = &'a KeywordFamily> + 'a {
        self.family_index
            .get(keyword)
            .into_iter()
            .flatten()
            .map(|&i| &self.families[i])
    }

    /// Maps a free-form label (e.g. from the ML service) onto a canonical
    /// industry name: case-insensitive exact match first, then the closest
    /// Jaro-Winkler match scoring at least `min_similarity`.
    pub fn normalize_label(&self, label: &str, min_similarity: f64) -> Option<&str> {
        let wanted = label.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }

        if let Some(exact) = self
            .industries
            .iter()
            .find(|industry| industry.to_lowercase() == wanted)
        {
            return Some(exact.as_str());
        }

        self.industries
            .iter()
            .map(|industry| (industry, jaro_winkler(&industry.to_lowercase(), &wanted)))
            .filter(|(_, score)| *score >= min_similarity)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(industry, _)| industry.as_str())
    }
}

#[derive(Debug, Default)]
pub struct TaxonomyBuilder {
    taxonomy: Taxonomy,
}

impl TaxonomyBuilder {
    pub fn industry(mut self, name: &str) -> Self {
        self.taxonomy.industries.insert(name.to_string());
        self
    }

    pub fn keyword(mut self, keyword: &str, industry: &str, weight: f64) -> Self {
        self.taxonomy.industries.insert(industry.to_string());
        let entries = self
            .taxonomy
            .keyword_index
            .entry(normalize_keyword(keyword))
            .or_default();
        match entries.iter_mut().find(|w| w.industry == industry) {
            Some(existing) => existing.weight = existing.weight.max(weight),
            None => entries.push(IndustryWeight {
                industry: industry.to_string(),
                weight,
            }),
        }
        self
    }

    pub fn industry_code(
        mut self,
        industry: &str,
        code_type: CodeType,
        code: &str,
        description: &str,
        weight: f64,
    ) -> Self {
        self.taxonomy.industries.insert(industry.to_string());
        self.remember_description(code_type, code, description);
        self.taxonomy
            .industry_codes
            .entry(industry.to_string())
            .or_default()
            .push(CodeMapping {
                code_type,
                code: code.to_string(),
                description: description.to_string(),
                weight,
            });
        self
    }

    pub fn keyword_code(
        mut self,
        keyword: &str,
        code_type: CodeType,
        code: &str,
        description: &str,
        relevance: f64,
    ) -> Self {
        self.remember_description(code_type, code, description);
        self.taxonomy
            .keyword_codes
            .entry(normalize_keyword(keyword))
            .or_default()
            .push(KeywordCode {
                code_type,
                code: code.to_string(),
                description: description.to_string(),
                relevance,
            });
        self
    }

    /// One crosswalk row links all three codes to each other.
    pub fn crosswalk(mut self, mcc: &str, naics: &str, sic: &str) -> Self {
        let row = [
            CodeRef::new(CodeType::Mcc, mcc),
            CodeRef::new(CodeType::Naics, naics),
            CodeRef::new(CodeType::Sic, sic),
        ];
        for from in &row {
            let partners = self.taxonomy.crosswalk.entry(from.clone()).or_default();
            for to in row.iter().filter(|to| to.code_type != from.code_type) {
                if !partners.contains(to) {
                    partners.push(to.clone());
                }
            }
        }
        self
    }

    pub fn family(mut self, mut family: KeywordFamily) -> Self {
        family.keywords = family
            .keywords
            .iter()
            .map(|k| normalize_keyword(k))
            .collect();
        let position = self.taxonomy.families.len();
        for keyword in &family.keywords {
            self.taxonomy
                .family_index
                .entry(keyword.clone())
                .or_default()
                .push(position);
        }
        self.taxonomy.families.push(family);
        self
    }

    pub fn build(self) -> Taxonomy {
        self.taxonomy
    }

    fn remember_description(&mut self, code_type: CodeType, code: &str, description: &str) {
        self.taxonomy
            .code_descriptions
            .entry(CodeRef::new(code_type, code))
            .or_insert_with(|| description.to_string());
    }
}

fn normalize_keyword(keyword: &str) -> String {
    keyword.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::{CodeRef, Taxonomy};
    use crate::domain::code::CodeType;

    fn taxonomy() -> Taxonomy {
        Taxonomy::builder()
            .keyword("Pizza", "Restaurants", 1.0)
            .keyword("pizza", "Grocery & Food Retail", 0.3)
            .industry("Real Estate")
            .crosswalk("5812", "722511", "5812")
            .build()
    }

    #[test]
    fn normalize_label_exact_ignores_case() {
        let taxonomy = taxonomy();
        assert_eq!(
            taxonomy.normalize_label("  restaurants ", 0.9),
            Some("Restaurants")
        );
        assert_eq!(
            taxonomy.normalize_label("REAL ESTATE", 0.9),
            Some("Real Estate")
        );
    }

    #[test]
    fn normalize_label_fuzzy_match() {
        let taxonomy = taxonomy();
        assert_eq!(
            taxonomy.normalize_label("Restaurant", 0.9),
            Some("Restaurants")
        );
        assert_eq!(taxonomy.normalize_label("Aerospace", 0.9), None);
        assert_eq!(taxonomy.normalize_label("", 0.9), None);
    }

    #[test]
    fn keyword_index_is_lowercased() {
        let taxonomy = taxonomy();
        assert_eq!(taxonomy.industries_for_keyword("pizza").len(), 2);
        assert!(taxonomy.maps_keyword_to("pizza", "Restaurants"));
        assert!(!taxonomy.maps_keyword_to("pizza", "Real Estate"));
    }

    #[test]
    fn crosswalk_links_every_type() {
        let taxonomy = taxonomy();
        let partners = taxonomy.crosswalk_partners(&CodeRef::new(CodeType::Naics, "722511"));

        assert_eq!(partners.len(), 2);
        assert!(partners.contains(&CodeRef::new(CodeType::Mcc, "5812")));
        assert!(partners.contains(&CodeRef::new(CodeType::Sic, "5812")));
    }

    #[test]
    fn bundled_taxonomy_loads() {
        let taxonomy = Taxonomy::bundled().unwrap();

        assert!(taxonomy.has_industry("Restaurants"));
        assert!(taxonomy.has_industry("Utilities"));
        assert!(!taxonomy.codes_for_industry("Restaurants").is_empty());
        assert!(taxonomy.keyword_count() > 100);
        assert!(taxonomy
            .families_for_keyword("catering")
            .any(|f| f.is_compatible_with("Restaurants")));
    }

    #[test]
    fn bundled_crosswalk_codes_have_descriptions() {
        let taxonomy = Taxonomy::bundled().unwrap();
        let partners = taxonomy.crosswalk_partners(&CodeRef::new(CodeType::Mcc, "5812"));

        assert!(!partners.is_empty());
        for partner in partners {
            assert!(taxonomy.code_description(partner).is_some(), "{:?}", partner);
        }
    }
}
