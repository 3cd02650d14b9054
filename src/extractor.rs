use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

/// Shortest paragraph, in characters, that counts as the page's first paragraph.
pub const MIN_PARAGRAPH_CHARS: usize = 50;

// Create static selectors to avoid recompiling them each time
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("title").expect("Failed to parse title selector")
});

static HEADING_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("h1").expect("Failed to parse h1 selector")
});

static PARAGRAPH_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("p").expect("Failed to parse p selector")
});

/// The three text fields pulled out of a rendered page.
///
/// On failure every text field is empty and `error` carries the reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub title: String,
    #[serde(rename = "h1")]
    pub heading: String,
    pub first_paragraph: String,
    pub error: Option<String>,
}

impl ExtractedPage {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Text handed to the analyzer for a scraped page.
    pub fn analysis_input(&self) -> String {
        format!("{} {} {}", self.title, self.heading, self.first_paragraph)
    }
}

/// Markup of a page after client-side rendering.
#[derive(Debug, Clone, Default)]
pub struct RenderedPage {
    /// `document.title` as reported by the browser, when it has one.
    pub title: Option<String>,
    pub html: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("page extraction timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("failed to read page content: {0}")]
    Dom(String),
}

/// Something that can load a URL and hand back its rendered markup.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn render(&self, url: &str) -> Result<RenderedPage, ExtractError>;
}

/// Prefixes `https://` to URLs that carry no scheme.
///
/// A scheme only counts when it leads the URL and is followed by `//`, so
/// `host:8080` or a `://` inside the query string still get the prefix.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let has_scheme = match Url::parse(url) {
        Ok(parsed) => url
            .get(parsed.scheme().len()..)
            .is_some_and(|rest| rest.starts_with("://")),
        Err(_) => false,
    };

    if has_scheme {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// Applies the extraction rules to rendered markup.
pub fn extract_fields(html: &str, document_title: Option<&str>) -> ExtractedPage {
    let document = Html::parse_document(html);

    let title = match document_title {
        Some(title) => collapse_whitespace(title),
        None => document
            .select(&TITLE_SELECTOR)
            .next()
            .map(element_text)
            .unwrap_or_default(),
    };

    let heading = document
        .select(&HEADING_SELECTOR)
        .next()
        .map(element_text)
        .unwrap_or_default();

    let first_paragraph = document
        .select(&PARAGRAPH_SELECTOR)
        .map(element_text)
        .find(|text| text.chars().count() >= MIN_PARAGRAPH_CHARS)
        .unwrap_or_default();

    ExtractedPage {
        title,
        heading,
        first_paragraph,
        error: None,
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

// Rendered text collapses runs of whitespace and drops it at the edges.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Page Extractor: one render per call, bounded by an overall timeout.
pub struct PageExtractor {
    source: Arc<dyn PageSource>,
    timeout: Duration,
}

impl PageExtractor {
    pub fn new(source: Arc<dyn PageSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// Never fails: launch, navigation, timeout and DOM errors end up in
    /// [`ExtractedPage::error`].
    pub async fn extract(&self, url: &str) -> ExtractedPage {
        let url = normalize_url(url);
        let start_time = Instant::now();

        let result = tokio::time::timeout(self.timeout, self.source.render(&url))
            .await
            .unwrap_or_else(|_| Err(ExtractError::Timeout(self.timeout)));

        match result {
            Ok(rendered) => {
                let page = extract_fields(&rendered.html, rendered.title.as_deref());
                info!(
                    url = %url,
                    elapsed = ?start_time.elapsed(),
                    has_heading = !page.heading.is_empty(),
                    has_paragraph = !page.first_paragraph.is_empty(),
                    "page extracted"
                );
                page
            }
            Err(err) => {
                warn!(url = %url, elapsed = ?start_time.elapsed(), error = %err, "page extraction failed");
                ExtractedPage::failed(err.to_string())
            }
        }
    }
}
