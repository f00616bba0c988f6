use std::collections::HashMap;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordSource {
    Name,
    Description,
    Content,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub from_name: bool,
    pub from_description: bool,
    pub from_content: bool,
}

impl Provenance {
    fn tag(&mut self, source: KeywordSource) {
        match source {
            KeywordSource::Name => self.from_name = true,
            KeywordSource::Description => self.from_description = true,
            KeywordSource::Content => self.from_content = true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Keyword {
    pub term: String,
    pub provenance: Provenance,
}

/// Distinct lowercase terms in first-seen order. A term seen again from
/// another source only gains a provenance tag.
#[derive(Debug, Clone, Default)]
pub struct KeywordSet {
    keywords: Vec<Keyword>,
    index: HashMap<String, usize>,
}

impl KeywordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the term was new.
    pub fn insert(&mut self, term: &str, source: KeywordSource) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return false;
        }

        match self.index.get(&term) {
            Some(&position) => {
                self.keywords[position].provenance.tag(source);
                false
            }
            None => {
                let mut provenance = Provenance::default();
                provenance.tag(source);
                self.index.insert(term.clone(), self.keywords.len());
                self.keywords.push(Keyword { term, provenance });
                true
            }
        }
    }

    pub fn get(&self, term: &str) -> Option<&Keyword> {
        self.index.get(term).map(|&i| &self.keywords[i])
    }

    pub fn contains(&self, term: &str) -> bool {
        self.index.contains_key(term)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keyword> {
        self.keywords.iter()
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().map(|k| k.term.as_str())
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{KeywordSet, KeywordSource};

    #[test]
    fn keyword_set_merges_provenance() {
        let mut set = KeywordSet::new();

        assert!(set.insert("Pizza", KeywordSource::Name));
        assert!(!set.insert("pizza", KeywordSource::Content));
        assert!(set.insert("oven", KeywordSource::Content));

        let pizza = set.get("pizza").unwrap();
        assert!(pizza.provenance.from_name);
        assert!(pizza.provenance.from_content);
        assert!(!pizza.provenance.from_description);
        assert_eq!(set.terms().collect::<Vec<_>>(), vec!["pizza", "oven"]);
    }
}
