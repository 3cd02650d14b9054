use axum::{
    routing::{get, post},
    Router,
    extract::{DefaultBodyLimit, Json, Multipart, State, multipart::MultipartRejection, rejection::JsonRejection},
    response::IntoResponse,
};
use tower_http::cors::{CorsLayer, Any};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::api::models::{
    ALLOWED_IMAGE_TYPES, ClearHistoryResponse, HealthResponse, HistoryResponse, MIN_TEXT_CHARS,
    ParseDemoRequest, ParseDemoResponse, TextAnalysisRequest,
};
use crate::api::response::{self, ImageAnalysisResponse, TextAnalysisResponse};
use crate::history::{HistoryEntry, RequestType, SUMMARY_CHARS, truncate_chars};
use crate::AppState;

/// Upload cap for `/analyze_image`.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn create_router(app_state: AppState) -> Router {
    let frontend_dir = app_state.config.frontend_dir.clone();

    Router::new()
        .route_service("/", ServeFile::new(frontend_dir.join("index.html")))
        .nest_service("/static", ServeDir::new(frontend_dir))
        .route("/analyze_text", post(analyze_text_handler))
        .route("/analyze_image", post(analyze_image_handler))
        .route("/parse_demo", post(parse_demo_handler))
        .route("/history", get(get_history_handler).delete(clear_history_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

pub fn validate_text(text: &str) -> Result<()> {
    if text.chars().count() < MIN_TEXT_CHARS {
        return Err(AppError::Validation(format!(
            "Text is too short: at least {} characters are required",
            MIN_TEXT_CHARS
        )));
    }
    Ok(())
}

pub fn validate_image_type(content_type: Option<&str>) -> Result<&str> {
    match content_type {
        Some(ct) if ALLOWED_IMAGE_TYPES.contains(&ct) => Ok(ct),
        _ => Err(AppError::Validation(format!(
            "Unsupported image format: {}",
            content_type.unwrap_or("unknown")
        ))),
    }
}

fn invalid_body(rejection: JsonRejection) -> AppError {
    AppError::Validation(format!("Invalid request body: {}", rejection.body_text()))
}

async fn analyze_text_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<TextAnalysisRequest>, JsonRejection>,
) -> Json<TextAnalysisResponse> {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            let err = invalid_body(rejection);
            warn!(error = %err, "text analysis request rejected");
            record(&state, RequestType::Text, "invalid request".to_string(), &err.to_string()).await;
            return response::failure(err.to_string());
        }
    };
    let request_summary = truncate_chars(&req.text, SUMMARY_CHARS);

    let result = match validate_text(&req.text) {
        Ok(()) => state.analyzer.analyze_text(&req.text).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(analysis) => {
            record(&state, RequestType::Text, request_summary, &analysis.summary).await;
            response::success(analysis)
        }
        Err(err) => {
            warn!(error = %err, "text analysis failed");
            record(&state, RequestType::Text, request_summary, &err.to_string()).await;
            response::failure(err.to_string())
        }
    }
}

struct Upload {
    file_name: Option<String>,
    content_type: String,
    bytes: Vec<u8>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = validate_image_type(field.content_type())?.to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {}", e)))?;

        return Ok(Upload {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    Err(AppError::Validation("No file uploaded".to_string()))
}

async fn analyze_image_handler(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Json<ImageAnalysisResponse> {
    let upload = match multipart {
        Ok(multipart) => read_upload(multipart).await,
        Err(rejection) => Err(AppError::Validation(rejection.body_text())),
    };

    let upload = match upload {
        Ok(upload) => upload,
        Err(err) => {
            warn!(error = %err, "image upload rejected");
            record(&state, RequestType::Image, "upload".to_string(), &err.to_string()).await;
            return response::failure(err.to_string());
        }
    };

    let request_summary = upload.file_name.clone().unwrap_or_else(|| "upload".to_string());
    info!(file = %request_summary, content_type = %upload.content_type, size = upload.bytes.len(), "analyzing image");

    match state.analyzer.analyze_image(&upload.bytes, &upload.content_type).await {
        Ok(analysis) => {
            record(&state, RequestType::Image, request_summary, &analysis.description).await;
            response::success(analysis)
        }
        Err(err) => {
            warn!(error = %err, "image analysis failed");
            record(&state, RequestType::Image, request_summary, &err.to_string()).await;
            response::failure(err.to_string())
        }
    }
}

async fn parse_demo_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<ParseDemoRequest>, JsonRejection>,
) -> Json<ParseDemoResponse> {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            let err = invalid_body(rejection);
            warn!(error = %err, "parse request rejected");
            record(&state, RequestType::Parse, "invalid request".to_string(), &err.to_string()).await;
            return Json(ParseDemoResponse::failed(err.to_string()));
        }
    };
    info!("Processing request for URL: {}", req.url);

    match process_parse_request(&state, &req).await {
        Ok(response) => Json(response),
        Err(err) => {
            record(&state, RequestType::Parse, req.url.clone(), &err.to_string()).await;
            Json(ParseDemoResponse::failed(err.to_string()))
        }
    }
}

async fn process_parse_request(state: &AppState, req: &ParseDemoRequest) -> Result<ParseDemoResponse> {
    if req.url.trim().is_empty() {
        return Err(AppError::Validation("URL is required".to_string()));
    }

    let parsed = state.extractor.extract(&req.url).await;
    if let Some(error) = &parsed.error {
        return Err(AppError::Extraction(error.clone()));
    }

    let analysis = state.analyzer.analyze_text(&parsed.analysis_input()).await?;
    record(state, RequestType::Parse, req.url.clone(), &analysis.summary).await;

    Ok(ParseDemoResponse::ok(parsed, analysis))
}

async fn get_history_handler(State(state): State<AppState>) -> Json<HistoryResponse> {
    let items = state.history.list().await;
    Json(HistoryResponse {
        total: items.len(),
        items,
    })
}

async fn clear_history_handler(State(state): State<AppState>) -> Result<Json<ClearHistoryResponse>> {
    state.history.clear().await?;
    info!("history cleared");
    Ok(Json(ClearHistoryResponse {
        success: true,
        message: "History cleared".to_string(),
    }))
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// A failed history write never fails the request it describes.
async fn record(state: &AppState, request_type: RequestType, request_summary: String, response_summary: &str) {
    let entry = HistoryEntry::new(request_type, request_summary, response_summary);
    if let Err(err) = state.history.append(entry).await {
        warn!(error = %err, "failed to record history entry");
    }
}
