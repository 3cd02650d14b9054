pub mod analysis;
pub mod api;
pub mod browser;
pub mod config;
pub mod error;
pub mod extractor;
pub mod history;
pub mod llm;
pub mod logging;

use std::sync::Arc;
use analysis::Analyzer;
use browser::ChromiumSource;
use config::Config;
use extractor::PageExtractor;
use history::HistoryStore;

/// Application state that will be shared across handlers.
///
/// Every component is built once at start-up and injected here.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub extractor: Arc<PageExtractor>,
    pub analyzer: Arc<dyn Analyzer>,
    pub history: Arc<HistoryStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        extractor: PageExtractor,
        analyzer: Arc<dyn Analyzer>,
        history: HistoryStore,
    ) -> Self {
        Self {
            config: Arc::new(config),
            extractor: Arc::new(extractor),
            analyzer,
            history: Arc::new(history),
        }
    }

    /// Production wiring: headless Chromium, analyzer chosen by API key,
    /// history at the configured path.
    pub fn from_config(config: Config) -> error::Result<Self> {
        let source = Arc::new(ChromiumSource::new(&config.extractor));
        let extractor = PageExtractor::new(source, config.extractor.page_timeout);
        let analyzer = analysis::analyzer_from_config(&config.openai)?;
        let history = HistoryStore::new(config.history_path.clone());

        Ok(Self::new(config, extractor, analyzer, history))
    }
}
