use serde::Serialize;
use uuid::Uuid;

use super::code::IndustryCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineStage {
    Started,
    ContentAcquired,
    KeywordsExtracted,
    KeywordClassified,
    MlSkipped,
    MlInvoked,
    Resolved,
    CodesGenerated,
    Done,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    pub request_id: Uuid,
    pub industry: String,
    pub confidence: f64,
    pub codes: Vec<IndustryCode>,
    pub explanation: String,
    pub used_ml: bool,
    pub warnings: Vec<String>,
    pub matched_keywords: Vec<String>,
    pub pages_scraped: usize,
    pub stages: Vec<PipelineStage>,
    pub elapsed_ms: u64,
}
