//! Engine configuration.
//!
//! One explicit settings object handed to the pieces that need it. There are
//! no environment lookups here; embedding applications decide where values
//! come from and construct the config themselves.

use std::time::Duration;

use thiserror::Error;

use crate::llm::OllamaClient;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Engine-wide settings.
///
/// [`EngineConfig::default`] targets a plain local Ollama instance. All
/// fields are public; the `with_*` methods exist for chained construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the Ollama API.
    pub base_url: String,

    /// Bearer token for proxied deployments. Plain Ollama needs none.
    pub api_key: Option<String>,

    /// Model agents select at initialization.
    pub default_model: String,

    /// Hard cap on generated tokens per call; `None` lets the model decide.
    pub max_tokens: Option<u32>,

    /// Timeout for a single HTTP request to the backend.
    pub http_timeout: Duration,

    /// How many finished task results each agent retains.
    pub max_task_history: usize,

    /// Time-to-live for cached completions.
    pub cache_ttl: Duration,

    /// Log raw wire traffic at TRACE level.
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: OllamaClient::DEFAULT_BASE_URL.to_string(),
            api_key: None,
            default_model: "llama3:8b".to_string(),
            max_tokens: None,
            http_timeout: Duration::from_secs(120),
            max_task_history: 50,
            cache_ttl: Duration::from_secs(3600),
            verbose: false,
        }
    }
}

impl EngineConfig {
    /// Defaults with a specific default model.
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            default_model: default_model.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_http_timeout(mut self, http_timeout: Duration) -> Self {
        self.http_timeout = http_timeout;
        self
    }

    pub fn with_max_task_history(mut self, max_task_history: usize) -> Self {
        self.max_task_history = max_task_history;
        self
    }

    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Check the configuration for values the engine cannot work with.
    ///
    /// # Errors
    /// [`ConfigError::InvalidValue`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "base_url",
                reason: format!("'{}' must start with http:// or https://", self.base_url),
            });
        }
        if self.default_model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "default_model",
                reason: "must not be empty".to_string(),
            });
        }
        if self.max_task_history == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_task_history",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.cache_ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "cache_ttl",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.http_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "http_timeout",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.max_tokens == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "max_tokens",
                reason: "must be at least 1 when set".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.max_task_history, 50);
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_chained_construction() {
        let config = EngineConfig::new("codellama:7b")
            .with_base_url("http://models.internal:11434")
            .with_api_key("secret")
            .with_max_tokens(512)
            .with_max_task_history(10);

        assert!(config.validate().is_ok());
        assert_eq!(config.default_model, "codellama:7b");
        assert_eq!(config.max_tokens, Some(512));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_rejects_empty_base_url() {
        let config = EngineConfig::default().with_base_url("  ");
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { field: "base_url", .. }
        ));
    }

    #[test]
    fn test_rejects_unschemed_base_url() {
        let config = EngineConfig::default().with_base_url("localhost:11434");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_history_and_zero_ttl() {
        let config = EngineConfig::default().with_max_task_history(0);
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::InvalidValue { field: "max_task_history", .. }
        ));

        let config = EngineConfig::default().with_cache_ttl(Duration::ZERO);
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::InvalidValue { field: "cache_ttl", .. }
        ));
    }
}
