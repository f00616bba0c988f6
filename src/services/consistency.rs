use std::collections::{BTreeSet, HashSet};

use crate::domain::{industry::GENERAL_BUSINESS, taxonomy::Taxonomy};

/// How the keywords behind a label line up with that label's meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyVerdict {
    pub industry: String,
    pub supporting: Vec<String>,
    pub conflicting: Vec<String>,
}

impl ConsistencyVerdict {
    /// Fails only when at least one keyword conflicts and conflicts
    /// outnumber supports.
    pub fn passed(&self) -> bool {
        self.conflicting.is_empty() || self.conflicting.len() <= self.supporting.len()
    }
}

/// Checks each matched keyword against the keyword families. A keyword
/// supports `industry` if one of its families is compatible with it, and
/// conflicts if it belongs to families and none of them is. Phrases with
/// no family of their own are judged by their words.
pub fn check_consistency(
    industry: &str,
    matched_keywords: &BTreeSet<String>,
    taxonomy: &Taxonomy,
) -> ConsistencyVerdict {
    let mut verdict = ConsistencyVerdict {
        industry: industry.to_string(),
        supporting: Vec::new(),
        conflicting: Vec::new(),
    };
    if industry == GENERAL_BUSINESS {
        return verdict;
    }

    for keyword in matched_keywords {
        let mut families: HashSet<&str> = taxonomy
            .families_for_keyword(keyword)
            .map(|f| f.name.as_str())
            .collect();
        if families.is_empty() && keyword.contains(' ') {
            families = keyword
                .split(' ')
                .flat_map(|word| taxonomy.families_for_keyword(word))
                .map(|f| f.name.as_str())
                .collect();
        }
        if families.is_empty() {
            continue;
        }

        let compatible = taxonomy
            .families()
            .iter()
            .filter(|f| families.contains(f.name.as_str()))
            .any(|f| f.is_compatible_with(industry));
        match compatible {
            true => verdict.supporting.push(keyword.clone()),
            false => verdict.conflicting.push(keyword.clone()),
        }
    }

    verdict
}
