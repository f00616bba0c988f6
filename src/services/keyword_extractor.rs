use std::collections::HashMap;

use itertools::Itertools;

use crate::domain::{
    content::ScrapedContent,
    keyword::{KeywordSet, KeywordSource},
};

pub const DEFAULT_MAX_CONTENT_KEYWORDS: usize = 300;

/// Common English words that carry no industry signal. "service" and
/// "services" are deliberately absent: "auto services" or "cleaning
/// services" must still reach the detector.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "best", "between",
    "both", "but", "by", "can", "click", "co", "com", "contact", "copyright", "could", "did", "do",
    "does", "doing", "down", "during", "each", "few", "for", "from", "further", "get", "had",
    "has", "have", "having", "he", "her", "here", "hers", "herself", "him", "himself", "his",
    "home", "how", "i", "if", "in", "inc", "into", "is", "it", "its", "itself", "just", "llc",
    "ltd", "me", "more", "most", "my", "myself", "new", "no", "nor", "not", "now", "of", "off",
    "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "page",
    "please", "read", "reserved", "rights", "same", "she", "should", "so", "some", "such", "than",
    "that", "the", "their", "theirs", "them", "themselves", "then", "there", "these", "they",
    "this", "those", "through", "to", "too", "under", "until", "up", "us", "very", "was", "we",
    "welcome", "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will",
    "with", "www", "you", "your", "yours", "yourself", "yourselves",
];

pub struct KeywordExtractor {
    max_content_keywords: usize,
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        KeywordExtractor {
            max_content_keywords: DEFAULT_MAX_CONTENT_KEYWORDS,
        }
    }
}

impl KeywordExtractor {
    pub fn new(max_content_keywords: usize) -> Self {
        KeywordExtractor {
            max_content_keywords,
        }
    }

    /// Builds one keyword set out of the business name, its description and
    /// every scraped page. Name and description terms are always kept;
    /// page terms are capped to the most frequent ones.
    pub fn extract(
        &self,
        name: &str,
        description: Option<&str>,
        contents: &[ScrapedContent],
    ) -> KeywordSet {
        let mut keywords = KeywordSet::new();

        for term in terms(name) {
            keywords.insert(&term, KeywordSource::Name);
        }
        if let Some(description) = description {
            for term in terms(description) {
                keywords.insert(&term, KeywordSource::Description);
            }
        }

        let page_text = contents
            .iter()
            .flat_map(|page| {
                [
                    page.title.as_deref(),
                    page.meta_description.as_deref(),
                    Some(page.text.as_str()),
                ]
            })
            .flatten();

        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        for (position, term) in page_text.flat_map(terms).enumerate() {
            counts.entry(term).or_insert((0, position)).0 += 1;
        }

        counts
            .into_iter()
            .sorted_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
                count_b.cmp(count_a).then(first_a.cmp(first_b))
            })
            .take(self.max_content_keywords)
            .for_each(|(term, _)| {
                keywords.insert(&term, KeywordSource::Content);
            });

        keywords
    }
}

/// Single-word tokens followed by bigrams of adjacent kept tokens.
pub fn terms(text: &str) -> Vec<String> {
    let tokens = tokenize(text);
    let bigrams = tokens
        .iter()
        .tuple_windows()
        .filter(|(first, second)| first.1 + 1 == second.1)
        .map(|(first, second)| format!("{} {}", first.0, second.0));

    tokens
        .iter()
        .map(|(token, _)| token.clone())
        .chain(bigrams)
        .collect()
}

/// Lowercased, punctuation-free tokens with their position in the raw word
/// stream, so bigrams never bridge a removed stop word.
fn tokenize(text: &str) -> Vec<(String, usize)> {
    text.to_lowercase()
        .replace(['\'', '’'], "")
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .enumerate()
        .filter(|(_, word)| is_keyword(word))
        .map(|(position, word)| (word.to_string(), position))
        .collect()
}

fn is_keyword(word: &str) -> bool {
    word.chars().count() >= 2
        && !word.chars().all(|c| c.is_numeric())
        && !STOP_WORDS.contains(&word)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use url::Url;

    use super::{terms, KeywordExtractor, STOP_WORDS};
    use crate::domain::content::{FetchStrategy, ScrapedContent};

    fn page(text: &str) -> ScrapedContent {
        ScrapedContent {
            url: Url::parse("https://example.com/").unwrap(),
            strategy_used: FetchStrategy::PrimaryHttp,
            title: None,
            meta_description: None,
            text: text.to_string(),
            fetched_at: Utc::now(),
            byte_size: text.len(),
            truncated: false,
        }
    }

    #[test]
    fn stop_words_keep_service() {
        assert!(!STOP_WORDS.contains(&"service"));
        assert!(!STOP_WORDS.contains(&"services"));

        let terms = terms("Auto Services & Repair");
        assert!(terms.contains(&"services".to_string()));
        assert!(terms.contains(&"auto services".to_string()));
    }

    #[test]
    fn terms_strip_punctuation_and_numbers() {
        let terms = terms("Tony's Pizza, est. 1987 - the best in N.Y.!");

        assert_eq!(
            terms,
            vec!["tonys", "pizza", "est", "tonys pizza", "pizza est"]
        );
    }

    #[test]
    fn bigrams_do_not_bridge_stop_words() {
        let terms = terms("real estate and property management");

        assert!(terms.contains(&"real estate".to_string()));
        assert!(terms.contains(&"property management".to_string()));
        assert!(!terms.contains(&"estate property".to_string()));
    }

    #[test]
    fn extract_merges_sources() {
        let extractor = KeywordExtractor::default();
        let keywords = extractor.extract(
            "Tony's Pizzeria",
            Some("Pizza and catering"),
            &[page("Best pizza in town. Catering for events.")],
        );

        let pizza = keywords.get("pizza").unwrap();
        assert!(!pizza.provenance.from_name);
        assert!(pizza.provenance.from_description);
        assert!(pizza.provenance.from_content);

        let catering = keywords.get("catering").unwrap();
        assert!(catering.provenance.from_description && catering.provenance.from_content);
        assert!(keywords.get("pizzeria").unwrap().provenance.from_name);
        assert!(!keywords.contains("the"));
    }

    #[test]
    fn content_keywords_capped_by_frequency() {
        let extractor = KeywordExtractor::new(2);
        let keywords = extractor.extract(
            "Acme",
            None,
            &[page("bolts nuts bolts washers bolts nuts")],
        );

        let content: Vec<&str> = keywords
            .iter()
            .filter(|k| k.provenance.from_content)
            .map(|k| k.term.as_str())
            .collect();
        assert_eq!(content, vec!["bolts", "nuts"]);
        assert!(keywords.contains("acme"));
    }
}
