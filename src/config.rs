use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use crate::error::{AppError, Result};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub openai: OpenAiConfig,
    pub history_path: PathBuf,
    pub frontend_dir: PathBuf,
    pub extractor: ExtractorConfig,
}

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// `None` when no key is configured; the canned analyzer is used then.
    pub api_key: Option<String>,
    pub model: String,
    pub vision_model: String,
    pub base_url: String,
}

#[derive(Clone, Debug)]
pub struct ExtractorConfig {
    pub chromium_path: Option<PathBuf>,
    /// Upper bound on waiting for the rendered DOM to settle.
    pub settle_timeout: Duration,
    /// Upper bound on a whole extraction, browser launch included.
    pub page_timeout: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            chromium_path: None,
            settle_timeout: Duration::from_secs(10),
            page_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let api_key = lookup("OPENAI_API_KEY")
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        let host = var("API_HOST", "0.0.0.0");
        let port = var("API_PORT", "8000");
        let port = port.parse::<u16>().map_err(|e| AppError::Config(format!("Invalid port: {}", e)))?;
        let ip = IpAddr::from_str(&host).map_err(|e| AppError::Config(format!("Invalid host address: {}", e)))?;

        let settle_timeout = parse_secs("PAGE_SETTLE_TIMEOUT_SECS", &var("PAGE_SETTLE_TIMEOUT_SECS", "10"))?;
        let page_timeout = parse_secs("PAGE_TIMEOUT_SECS", &var("PAGE_TIMEOUT_SECS", "30"))?;

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            openai: OpenAiConfig {
                api_key,
                model: var("OPENAI_MODEL", "gpt-4o"),
                vision_model: var("OPENAI_VISION_MODEL", "gpt-4o"),
                base_url: var("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            },
            history_path: PathBuf::from(var("HISTORY_FILE", "history.json")),
            frontend_dir: PathBuf::from(var("FRONTEND_DIR", "frontend")),
            extractor: ExtractorConfig {
                chromium_path: lookup("CHROMIUM_PATH").map(PathBuf::from),
                settle_timeout,
                page_timeout,
            },
        })
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    let secs = value
        .parse::<u64>()
        .map_err(|e| AppError::Config(format!("Invalid {}: {}", key, e)))?;
    if secs == 0 {
        return Err(AppError::Config(format!("{} must be greater than zero", key)));
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.server_addr, "0.0.0.0:8000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.openai.api_key, None);
        assert_eq!(config.openai.model, "gpt-4o");
        assert_eq!(config.openai.vision_model, "gpt-4o");
        assert_eq!(config.openai.base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(config.history_path, PathBuf::from("history.json"));
        assert_eq!(config.extractor.page_timeout, Duration::from_secs(30));
        assert_eq!(config.extractor.settle_timeout, Duration::from_secs(10));
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let config = config_from(&[("OPENAI_API_KEY", "   ")]).unwrap();
        assert!(config.openai.api_key.is_none());

        let config = config_from(&[("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert_eq!(config.openai.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn bind_address_is_read_from_host_and_port() {
        let config = config_from(&[("API_HOST", "127.0.0.1"), ("API_PORT", "9090")]).unwrap();
        assert_eq!(config.server_addr, "127.0.0.1:9090".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn invalid_values_are_config_errors() {
        assert!(matches!(config_from(&[("API_PORT", "eighty")]), Err(AppError::Config(_))));
        assert!(matches!(config_from(&[("API_HOST", "localhost:80")]), Err(AppError::Config(_))));
        assert!(matches!(config_from(&[("PAGE_TIMEOUT_SECS", "0")]), Err(AppError::Config(_))));
    }
}
