use serde::{Deserialize, Serialize};
use axum::Json;

use crate::analysis::{CompetitorAnalysis, ImageAnalysis};

/// `{success, analysis?, error?}` body shared by the analysis endpoints.
///
/// Failures are still sent with a 200 so clients only ever branch on `success`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisResponse<T> {
    pub success: bool,
    pub analysis: Option<T>,
    pub error: Option<String>,
}

pub type TextAnalysisResponse = AnalysisResponse<CompetitorAnalysis>;

pub type ImageAnalysisResponse = AnalysisResponse<ImageAnalysis>;

pub fn success<T: Serialize>(analysis: T) -> Json<AnalysisResponse<T>> {
    Json(AnalysisResponse {
        success: true,
        analysis: Some(analysis),
        error: None,
    })
}

pub fn failure<T>(message: impl Into<String>) -> Json<AnalysisResponse<T>> {
    Json(AnalysisResponse {
        success: false,
        analysis: None,
        error: Some(message.into()),
    })
}
