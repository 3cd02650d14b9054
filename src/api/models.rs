use serde::{Deserialize, Serialize};

use crate::analysis::CompetitorAnalysis;
use crate::extractor::ExtractedPage;
use crate::history::HistoryEntry;

/// Shortest accepted `/analyze_text` input, in characters.
pub const MIN_TEXT_CHARS: usize = 10;

pub const ALLOWED_IMAGE_TYPES: [&str; 5] = [
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/gif",
    "image/webp",
];

#[derive(Debug, Deserialize)]
pub struct TextAnalysisRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ParseDemoRequest {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ParseDemoResponse {
    pub success: bool,
    pub parsed: Option<ExtractedPage>,
    pub analysis: Option<CompetitorAnalysis>,
    pub error: Option<String>,
}

impl ParseDemoResponse {
    pub fn ok(parsed: ExtractedPage, analysis: CompetitorAnalysis) -> Self {
        Self {
            success: true,
            parsed: Some(parsed),
            analysis: Some(analysis),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            parsed: None,
            analysis: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub items: Vec<HistoryEntry>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearHistoryResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
