//! Configuration for the backend and the story flow.

use crate::backend::OpenAiBackend;
use crate::error::{StoryError, StoryResult};
use openai::{Client, Provider};
use std::fmt;
use std::time::Duration;

/// Where and how to reach the model.
#[derive(Clone)]
pub struct BackendConfig {
    pub provider: Provider,

    /// API key. Required before a backend can be built.
    pub api_key: Option<String>,

    /// Overrides the provider's base URL.
    pub base_url: Option<String>,

    /// Overrides the provider's default model.
    pub model: Option<String>,

    /// Maximum tokens per reply.
    pub max_tokens: usize,

    pub temperature: Option<f32>,

    /// Total time allowed for one HTTP request.
    pub timeout: Duration,

    pub connect_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            api_key: None,
            base_url: None,
            model: None,
            max_tokens: 2048,
            temperature: Some(0.8),
            timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl BackendConfig {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            ..Self::default()
        }
    }

    /// Read `STORY_API_KEY` (falling back to `OPENAI_API_KEY`),
    /// `STORY_PROVIDER`, `STORY_BASE_URL` and `STORY_MODEL`.
    pub fn from_env() -> StoryResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StoryResult<Self> {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match read("STORY_PROVIDER") {
            Some(name) => name
                .parse::<Provider>()
                .map_err(|e| StoryError::Config(e.to_string()))?,
            None => Provider::default(),
        };

        Ok(Self {
            provider,
            api_key: read("STORY_API_KEY").or_else(|| read("OPENAI_API_KEY")),
            base_url: read("STORY_BASE_URL"),
            model: read("STORY_MODEL"),
            ..Self::default()
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the total request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// The model requests will use.
    pub fn effective_model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Build the HTTP backend this configuration describes.
    pub fn build_backend(&self) -> StoryResult<OpenAiBackend> {
        let api_key = self.api_key.clone().ok_or(openai::Error::NoApiKey)?;

        let mut client = Client::with_timeouts(api_key, self.timeout, self.connect_timeout)?
            .with_provider(self.provider);
        if let Some(base_url) = &self.base_url {
            client = client.with_base_url(base_url);
        }
        if let Some(model) = &self.model {
            client = client.with_model(model);
        }

        let mut backend = OpenAiBackend::new(client).with_max_tokens(self.max_tokens);
        if let Some(temperature) = self.temperature {
            backend = backend.with_temperature(temperature);
        }
        Ok(backend)
    }
}

/// Knobs for the story flow itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowConfig {
    /// How many characters from the world's roster to elaborate, protagonist
    /// first. Never fewer than two.
    pub roster_limit: usize,

    /// Send only this many recent turns of an agent's history.
    pub history_window: Option<usize>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            roster_limit: 2,
            history_window: None,
        }
    }
}

impl FlowConfig {
    pub fn with_roster_limit(mut self, roster_limit: usize) -> Self {
        self.roster_limit = roster_limit;
        self
    }

    pub fn with_history_window(mut self, turns: usize) -> Self {
        self.history_window = Some(turns);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_prefers_story_key() {
        let config = BackendConfig::from_lookup(lookup(&[
            ("STORY_API_KEY", "story-key"),
            ("OPENAI_API_KEY", "openai-key"),
            ("STORY_PROVIDER", "deepseek"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("story-key"));
        assert_eq!(config.provider, Provider::DeepSeek);
        assert_eq!(config.effective_model(), "deepseek-chat");
    }

    #[test]
    fn test_from_lookup_fallbacks() {
        let config = BackendConfig::from_lookup(lookup(&[
            ("STORY_API_KEY", "  "),
            ("OPENAI_API_KEY", "openai-key"),
            ("STORY_MODEL", "gpt-4o"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("openai-key"));
        assert_eq!(config.provider, Provider::OpenAi);
        assert_eq!(config.effective_model(), "gpt-4o");

        assert!(matches!(
            BackendConfig::from_lookup(lookup(&[("STORY_PROVIDER", "nope")])),
            Err(StoryError::Config(_))
        ));
    }

    #[test]
    fn test_build_backend_requires_key() {
        let err = BackendConfig::default().build_backend().unwrap_err();
        assert!(matches!(err, StoryError::Backend(openai::Error::NoApiKey)));

        let backend = BackendConfig::new(Provider::DashScope)
            .with_api_key("key")
            .with_base_url("http://localhost:8080/v1/")
            .build_backend()
            .unwrap();
        assert_eq!(backend.client().base_url(), "http://localhost:8080/v1");
        assert_eq!(backend.client().model(), "deepseek-r1");
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = BackendConfig::default().with_api_key("sk-secret");
        assert!(!format!("{config:?}").contains("sk-secret"));
    }
}
