//! Provider configuration.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::{LlmError, Result};

/// Configuration for a remote, OpenAI-compatible provider.
#[derive(Debug, Clone)]
pub struct RemoteClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub organization: Option<String>,
}

impl RemoteClientConfig {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            timeout: Duration::from_secs(120),
            organization: None,
        }
    }

    /// Read the API key from an environment variable.
    pub fn from_env(
        env_var: &str,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let api_key = std::env::var(env_var)
            .map_err(|_| LlmError::Configuration(format!("{} is not set", env_var)))?;
        Ok(Self::new(api_key, base_url, model))
    }

    /// Build from a `client` node's configuration map:
    ///
    /// ```json
    /// {"provider": "openai", "api_key": "sk-…", "model": "gpt-4o-mini",
    ///  "base_url": "https://api.openai.com/v1"}
    /// ```
    pub fn from_node_config(config: &Map<String, Value>) -> Result<Self> {
        let api_key = config
            .get("api_key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| LlmError::Configuration("missing api_key".to_string()))?;
        let base_url = config
            .get("base_url")
            .and_then(Value::as_str)
            .unwrap_or("https://api.openai.com/v1")
            .to_string();
        let model = config
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or("gpt-4o-mini")
            .to_string();
        let mut built = Self::new(api_key, base_url, model);
        if let Some(timeout_ms) = config.get("timeout_ms").and_then(Value::as_u64) {
            built.timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(org) = config.get("organization").and_then(Value::as_str) {
            built.organization = Some(org.to_string());
        }
        Ok(built)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
