use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::config::OpenAiConfig;
use crate::error::{AppError, Result};
use crate::llm::{LlmClient, Message};

pub const MAX_VISUAL_STYLE_SCORE: u8 = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorAnalysis {
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub unique_offers: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub insights: Vec<String>,
    /// 0 to 10 inclusive.
    pub visual_style_score: u8,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Produces competitor insights from text or an image.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze_text(&self, text: &str) -> Result<CompetitorAnalysis>;

    async fn analyze_image(&self, image: &[u8], content_type: &str) -> Result<ImageAnalysis>;

    /// Short label for logs.
    fn name(&self) -> &'static str;
}

/// Picks the model-backed analyzer when an API key is configured.
pub fn analyzer_from_config(config: &OpenAiConfig) -> Result<Arc<dyn Analyzer>> {
    let analyzer: Arc<dyn Analyzer> = match &config.api_key {
        Some(key) => {
            let client = LlmClient::new(key.clone(), &config.base_url)
                .map_err(|e| AppError::Config(e.to_string()))?;
            Arc::new(LlmAnalyzer::new(
                client,
                config.model.clone(),
                config.vision_model.clone(),
            ))
        }
        None => Arc::new(CannedAnalyzer),
    };
    Ok(analyzer)
}

/// Returns the same fixed results for every input.
pub struct CannedAnalyzer;

impl CannedAnalyzer {
    pub fn competitor() -> CompetitorAnalysis {
        CompetitorAnalysis {
            strengths: vec![
                "Strong brand".to_string(),
                "Responsive customer support".to_string(),
                "Wide product range".to_string(),
            ],
            weaknesses: vec!["High prices".to_string(), "Slow delivery".to_string()],
            unique_offers: vec!["Exclusive products".to_string()],
            recommendations: vec!["Lower prices".to_string(), "Improve logistics".to_string()],
            summary: "The competitor is strong, but there is room to outperform it.".to_string(),
        }
    }

    pub fn image() -> ImageAnalysis {
        ImageAnalysis {
            description: "Banner with a bright colour palette and a modern typeface.".to_string(),
            insights: vec!["Grabs attention".to_string(), "Well-balanced composition".to_string()],
            visual_style_score: 8,
            recommendations: vec!["Add a call to action".to_string(), "Simplify the layout".to_string()],
        }
    }
}

#[async_trait]
impl Analyzer for CannedAnalyzer {
    async fn analyze_text(&self, _text: &str) -> Result<CompetitorAnalysis> {
        Ok(Self::competitor())
    }

    async fn analyze_image(&self, _image: &[u8], _content_type: &str) -> Result<ImageAnalysis> {
        Ok(Self::image())
    }

    fn name(&self) -> &'static str {
        "canned"
    }
}

const TEXT_INSTRUCTIONS: &str = "You are a competitive intelligence analyst. \
Analyse the competitor material supplied by the user and answer with a single JSON object \
with exactly these keys: \"strengths\", \"weaknesses\", \"unique_offers\", \"recommendations\" \
(each an array of short strings) and \"summary\" (one or two sentences).";

const IMAGE_INSTRUCTIONS: &str = "You are a marketing creative reviewer. \
Analyse the competitor image supplied by the user and answer with a single JSON object \
with exactly these keys: \"description\" (string), \"insights\" (array of strings), \
\"visual_style_score\" (integer from 0 to 10) and \"recommendations\" (array of strings).";

/// Analyzer backed by a chat-completions model.
pub struct LlmAnalyzer {
    client: LlmClient,
    model: String,
    vision_model: String,
}

impl LlmAnalyzer {
    pub fn new(client: LlmClient, model: String, vision_model: String) -> Self {
        Self {
            client,
            model,
            vision_model,
        }
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    async fn analyze_text(&self, text: &str) -> Result<CompetitorAnalysis> {
        let messages = [Message::system(TEXT_INSTRUCTIONS), Message::user(text)];
        let reply = self
            .client
            .complete_json(&self.model, &messages)
            .await
            .map_err(|e| AppError::Analysis(e.to_string()))?;

        parse_competitor_analysis(&reply)
    }

    async fn analyze_image(&self, image: &[u8], content_type: &str) -> Result<ImageAnalysis> {
        let data_url = format!("data:{};base64,{}", content_type, STANDARD.encode(image));
        let messages = [
            Message::system(IMAGE_INSTRUCTIONS),
            Message::user_with_image("Analyse this competitor image.", data_url),
        ];
        let reply = self
            .client
            .complete_json(&self.vision_model, &messages)
            .await
            .map_err(|e| AppError::Analysis(e.to_string()))?;

        parse_image_analysis(&reply)
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

pub fn parse_competitor_analysis(reply: &str) -> Result<CompetitorAnalysis> {
    serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| AppError::Analysis(format!("malformed competitor analysis: {}", e)))
}

pub fn parse_image_analysis(reply: &str) -> Result<ImageAnalysis> {
    let analysis: ImageAnalysis = serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| AppError::Analysis(format!("malformed image analysis: {}", e)))?;

    if analysis.visual_style_score > MAX_VISUAL_STYLE_SCORE {
        return Err(AppError::Analysis(format!(
            "visual_style_score {} is outside 0-{}",
            analysis.visual_style_score, MAX_VISUAL_STYLE_SCORE
        )));
    }

    Ok(analysis)
}

/// Models sometimes wrap JSON in a Markdown code fence even in JSON mode.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
