//! OpenAI-compatible chat client with automatic retry for transient errors.

use std::time::Duration;

use async_trait::async_trait;
use pathforge_core::AiProvider;
use reqwest::Client;
use serde::Deserialize;

use super::{ChatRequest, ChatResponse, LlmClient, LlmError, RetryConfig};
use crate::provider::ProviderEndpoint;

/// Chat client for one provider endpoint (OpenRouter, OpenAI, DeepSeek).
pub struct OpenAiCompatClient {
    client: Client,
    provider: AiProvider,
    url: String,
    api_key: Option<String>,
    retry_config: RetryConfig,
}

impl OpenAiCompatClient {
    pub fn new(client: Client, provider: AiProvider, endpoint: &ProviderEndpoint) -> Self {
        Self {
            client,
            provider,
            url: endpoint.chat_completions_url(),
            api_key: endpoint.api_key.clone().filter(|k| !k.trim().is_empty()),
            retry_config: RetryConfig::default(),
        }
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Execute a single request without retry.
    async fn execute_request(&self, api_key: &str, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let mut builder = self.client.post(&self.url).bearer_auth(api_key).json(request);
        if self.provider == AiProvider::OpenRouter {
            builder = builder
                .header("HTTP-Referer", "https://github.com/pathforge")
                .header("X-Title", "PathForge");
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Network(format!("request timeout: {e}"))
            } else if e.is_connect() {
                LlmError::Network(format!("connection failed: {e}"))
            } else {
                LlmError::Network(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        let retry_after = Self::parse_retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Network(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(LlmError::from_status(status.as_u16(), &body, retry_after));
        }

        let parsed: CompletionResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Parse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::Parse("response contained no message content".to_string()))?;

        Ok(ChatResponse {
            content,
            model: parsed.model,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(LlmError::MissingApiKey(self.provider))?;

        let mut attempt = 0;
        loop {
            match self.execute_request(api_key, request).await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(provider = %self.provider, retries = attempt, "provider request succeeded after retries");
                    }
                    return Ok(response);
                }
                Err(error) if error.is_retryable() && attempt < self.retry_config.max_retries => {
                    let delay = self.retry_config.delay_for(attempt, &error);
                    tracing::warn!(
                        provider = %self.provider,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "provider request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    tracing::error!(provider = %self.provider, retries = attempt, error = %error, "provider request failed");
                    return Err(error);
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves `/v1/chat/completions`, failing with 503 for the first `failures` calls.
    async fn spawn_provider(failures: usize) -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |Json(body): Json<serde_json::Value>| {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < failures {
                        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "busy" })));
                    }
                    (
                        StatusCode::OK,
                        Json(json!({
                            "model": body["model"],
                            "choices": [{ "message": { "role": "assistant", "content": "{\"title\":\"ok\"}" } }]
                        })),
                    )
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/v1"), calls)
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "test-model".to_string(),
            messages: vec![ChatMessage::user("hi")],
            temperature: None,
            max_tokens: None,
        }
    }

    fn fast_retries() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let (base_url, calls) = spawn_provider(2).await;
        let endpoint = ProviderEndpoint::new(base_url, "test-model").with_api_key("k");
        let client = OpenAiCompatClient::new(Client::new(), AiProvider::OpenAi, &endpoint)
            .with_retry_config(fast_retries());

        let response = client.chat_completion(&request()).await.unwrap();
        assert_eq!(response.content, "{\"title\":\"ok\"}");
        assert_eq!(response.model.as_deref(), Some("test-model"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let (base_url, calls) = spawn_provider(10).await;
        let endpoint = ProviderEndpoint::new(base_url, "test-model").with_api_key("k");
        let client = OpenAiCompatClient::new(Client::new(), AiProvider::DeepSeek, &endpoint)
            .with_retry_config(fast_retries());

        let err = client.chat_completion(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Server { status: 503, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn missing_api_key_fails_without_a_request() {
        let (base_url, calls) = spawn_provider(0).await;
        let endpoint = ProviderEndpoint::new(base_url, "test-model").with_api_key("  ");
        let client = OpenAiCompatClient::new(Client::new(), AiProvider::OpenAi, &endpoint);

        let err = client.chat_completion(&request()).await.unwrap_err();
        assert_eq!(err, LlmError::MissingApiKey(AiProvider::OpenAi));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
