//! Configuration management for the earnings agent.
//!
//! Configuration is loaded from environment variables:
//! - `OPENROUTER_API_KEY` - Required. API key for the chat LLM.
//! - `AGENT_MODEL` - Optional. Chat model identifier. Defaults to `anthropic/claude-sonnet-4.5`.
//! - `STOCKANALYSIS_USERNAME` / `STOCKANALYSIS_PASSWORD` - Required. Financial-site login.
//! - `GEMINI_API_KEY` - Required. Vision extraction.
//! - `PERPLEXITY_API_KEY` - Required. Web-search cross-referencing.
//! - `STORAGE_URL` / `STORAGE_SERVICE_KEY` - Required. Object store base URL and service credential.
//! - `WEBHOOK_SECRET` - Required. Shared bearer secret for ingress and callbacks.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `MAX_ITERATIONS` - Optional. Per-file agent loop budget. Defaults to `15`.
//! - `TICKER_TIMEOUT_SECS` - Optional. Wall-clock budget per ticker run. Defaults to `1800`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the chat LLM (OpenRouter format)
    pub llm_api_key: String,

    /// Chat model identifier
    pub model: String,

    /// Financial-site login email
    pub site_username: String,

    /// Financial-site login password
    pub site_password: String,

    /// Vision model API key
    pub vision_api_key: String,

    /// Web-search API key
    pub search_api_key: String,

    /// Object store base URL
    pub storage_url: String,

    /// Object store service credential
    pub storage_service_key: String,

    /// Shared bearer secret for the ingress endpoint and outbound callbacks
    pub webhook_secret: String,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Maximum tool-loop iterations per file
    pub max_iterations: usize,

    /// Wall-clock budget for a single ticker run, in seconds
    pub ticker_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` for any absent required secret.
    pub fn from_env() -> Result<Self, ConfigError> {
        let llm_api_key = required("OPENROUTER_API_KEY")?;

        let model = std::env::var("AGENT_MODEL")
            .unwrap_or_else(|_| "anthropic/claude-sonnet-4.5".to_string());

        let site_username = required("STOCKANALYSIS_USERNAME")?;
        let site_password = required("STOCKANALYSIS_PASSWORD")?;
        let vision_api_key = required("GEMINI_API_KEY")?;
        let search_api_key = required("PERPLEXITY_API_KEY")?;
        let storage_url = required("STORAGE_URL")?;
        let storage_service_key = required("STORAGE_SERVICE_KEY")?;
        let webhook_secret = required("WEBHOOK_SECRET")?;

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), format!("{}", e)))?;

        let max_iterations = std::env::var("MAX_ITERATIONS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("MAX_ITERATIONS".to_string(), format!("{}", e)))?;

        let ticker_timeout_secs = std::env::var("TICKER_TIMEOUT_SECS")
            .unwrap_or_else(|_| "1800".to_string())
            .parse()
            .map_err(|e| {
                ConfigError::InvalidValue("TICKER_TIMEOUT_SECS".to_string(), format!("{}", e))
            })?;

        Ok(Self {
            llm_api_key,
            model,
            site_username,
            site_password,
            vision_api_key,
            search_api_key,
            storage_url,
            storage_service_key,
            webhook_secret,
            host,
            port,
            max_iterations,
            ticker_timeout_secs,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn for_tests() -> Self {
        Self {
            llm_api_key: "test-key".to_string(),
            model: "test/model".to_string(),
            site_username: "user@example.com".to_string(),
            site_password: "password".to_string(),
            vision_api_key: "vision-key".to_string(),
            search_api_key: "search-key".to_string(),
            storage_url: "http://127.0.0.1:9999".to_string(),
            storage_service_key: "service-key".to_string(),
            webhook_secret: "webhook-secret".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3000,
            max_iterations: 15,
            ticker_timeout_secs: 1800,
        }
    }
}
