//! Provider endpoints and model defaults.

use std::time::Duration;

use pathforge_core::AiProvider;

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";

pub const OPENROUTER_DEFAULT_MODEL: &str = "mistralai/mistral-7b-instruct:free";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEEPSEEK_DEFAULT_MODEL: &str = "deepseek-chat";

/// One OpenAI-compatible chat endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub api_key: Option<String>,
    pub default_model: String,
}

impl ProviderEndpoint {
    pub fn new(base_url: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            default_model: default_model.into(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Full URL of the chat completions route.
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Everything the generator needs to reach the AI providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Used when a request does not name a provider.
    pub default_provider: AiProvider,
    pub openrouter: ProviderEndpoint,
    pub openai: ProviderEndpoint,
    pub deepseek: ProviderEndpoint,
    /// Answer from a canned stub instead of calling any provider.
    pub dev_mode: bool,
    /// Per-HTTP-request timeout.
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            default_provider: AiProvider::OpenRouter,
            openrouter: ProviderEndpoint::new(OPENROUTER_BASE_URL, OPENROUTER_DEFAULT_MODEL),
            openai: ProviderEndpoint::new(OPENAI_BASE_URL, OPENAI_DEFAULT_MODEL),
            deepseek: ProviderEndpoint::new(DEEPSEEK_BASE_URL, DEEPSEEK_DEFAULT_MODEL),
            dev_mode: false,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl ProviderConfig {
    pub fn dev() -> Self {
        Self {
            dev_mode: true,
            ..Self::default()
        }
    }

    pub fn endpoint(&self, provider: AiProvider) -> &ProviderEndpoint {
        match provider {
            AiProvider::OpenRouter => &self.openrouter,
            AiProvider::OpenAi => &self.openai,
            AiProvider::DeepSeek => &self.deepseek,
        }
    }

    pub fn endpoint_mut(&mut self, provider: AiProvider) -> &mut ProviderEndpoint {
        match provider {
            AiProvider::OpenRouter => &mut self.openrouter,
            AiProvider::OpenAi => &mut self.openai,
            AiProvider::DeepSeek => &mut self.deepseek,
        }
    }

    /// Provider and model for one request: explicit choice first, configured defaults after.
    pub fn resolve(&self, provider: Option<AiProvider>, model: Option<&str>) -> (AiProvider, String) {
        let provider = provider.unwrap_or(self.default_provider);
        let model = model
            .map(str::to_string)
            .unwrap_or_else(|| self.endpoint(provider).default_model.clone());
        (provider, model)
    }
}
