use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchStrategy {
    PrimaryHttp,
    HeaderSpoofed,
    BrowserRendered,
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchStrategy::PrimaryHttp => "primary-http",
            FetchStrategy::HeaderSpoofed => "header-spoofed",
            FetchStrategy::BrowserRendered => "browser-rendered",
        };
        f.write_str(name)
    }
}

/// Visible text of one fetched page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapedContent {
    pub url: Url,
    pub strategy_used: FetchStrategy,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub text: String,
    pub fetched_at: DateTime<Utc>,
    pub byte_size: usize,
    pub truncated: bool,
}

impl ScrapedContent {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

pub fn total_chars(pages: &[ScrapedContent]) -> usize {
    pages.iter().map(ScrapedContent::char_count).sum()
}

/// Share of non-whitespace characters that are alphabetic, 0.0 for empty input.
pub fn alphabetic_ratio(pages: &[ScrapedContent]) -> f64 {
    let (alphabetic, visible) = pages
        .iter()
        .flat_map(|p| p.text.chars())
        .filter(|c| !c.is_whitespace())
        .fold((0usize, 0usize), |(a, v), c| {
            (a + usize::from(c.is_alphabetic()), v + 1)
        });

    match visible {
        0 => 0.0,
        _ => alphabetic as f64 / visible as f64,
    }
}
