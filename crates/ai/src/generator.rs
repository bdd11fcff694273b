//! The production task executor.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pathforge_core::{AiProvider, GenerationParams};
use tracing::{info, warn};

use crate::executor::TaskExecutor;
use crate::llm::{ChatRequest, LlmClient, LlmError, OpenAiCompatClient, StubLlmClient};
use crate::prompt::{build_messages, extract_json_object};
use crate::provider::ProviderConfig;
use crate::result::{ExecutionError, LearningPath};

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 4096;

/// Generates learning paths through the configured AI providers.
pub struct LearningPathGenerator {
    config: ProviderConfig,
    backend: Backend,
}

enum Backend {
    /// Dev mode: a stub client built from each request's parameters.
    Stub,
    Clients(HashMap<AiProvider, Arc<dyn LlmClient>>),
}

impl LearningPathGenerator {
    /// Build one HTTP client per provider, or the offline stub in dev mode.
    pub fn new(config: ProviderConfig) -> Result<Self, LlmError> {
        if config.dev_mode {
            info!("dev mode enabled, AI providers are stubbed");
            return Ok(Self {
                config,
                backend: Backend::Stub,
            });
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LlmError::Network(format!("failed to build HTTP client: {e}")))?;

        let clients = AiProvider::ALL
            .into_iter()
            .map(|provider| {
                let client = OpenAiCompatClient::new(http.clone(), provider, config.endpoint(provider));
                (provider, Arc::new(client) as Arc<dyn LlmClient>)
            })
            .collect();

        Ok(Self {
            config,
            backend: Backend::Clients(clients),
        })
    }

    /// Route every provider through `client`.
    pub fn with_client(config: ProviderConfig, client: Arc<dyn LlmClient>) -> Self {
        let clients = AiProvider::ALL
            .into_iter()
            .map(|provider| (provider, client.clone()))
            .collect();
        Self {
            config,
            backend: Backend::Clients(clients),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub async fn generate(&self, params: &GenerationParams) -> Result<LearningPath, ExecutionError> {
        let (provider, model) = self
            .config
            .resolve(params.ai_provider, params.ai_model.as_deref());
        let client: Arc<dyn LlmClient> = match &self.backend {
            Backend::Stub => Arc::new(StubLlmClient::for_params(params)),
            Backend::Clients(clients) => clients.get(&provider).cloned().ok_or_else(|| {
                ExecutionError::Internal(format!("no client registered for provider '{provider}'"))
            })?,
        };

        info!(provider = %provider, model = %model, topic = %params.topic, "generating learning path");

        let request = ChatRequest {
            model,
            messages: build_messages(params),
            temperature: Some(TEMPERATURE),
            max_tokens: Some(MAX_TOKENS),
        };
        let response = client.chat_completion(&request).await?;

        let path = parse_learning_path(&response.content)?;
        let path = finalize(path, params)?;

        info!(
            provider = %provider,
            model = response.model.as_deref().unwrap_or(&request.model),
            milestones = path.milestones.len(),
            "learning path generated"
        );
        Ok(path)
    }
}

#[async_trait]
impl TaskExecutor for LearningPathGenerator {
    async fn execute(&self, params: &GenerationParams) -> Result<LearningPath, ExecutionError> {
        self.generate(params).await
    }
}

fn parse_learning_path(reply: &str) -> Result<LearningPath, ExecutionError> {
    let raw = extract_json_object(reply).ok_or_else(|| {
        warn!(reply_len = reply.len(), "model reply contained no JSON object");
        ExecutionError::InvalidOutput("model reply contained no JSON object".to_string())
    })?;
    serde_json::from_str(raw)
        .map_err(|e| ExecutionError::InvalidOutput(format!("learning path did not match the expected shape: {e}")))
}

/// Pin the request fields, clamp weeks into range and fill derived values.
fn finalize(mut path: LearningPath, params: &GenerationParams) -> Result<LearningPath, ExecutionError> {
    if path.milestones.is_empty() {
        return Err(ExecutionError::InvalidOutput(
            "model returned a learning path without milestones".to_string(),
        ));
    }

    let weeks = params.duration_weeks.max(1);
    path.topic = params.topic.clone();
    path.expertise_level = params.expertise_level.clone();
    path.duration_weeks = weeks;
    path.time_commitment = params.time_commitment.clone();
    path.goals = params.goals.clone().unwrap_or_default();

    if path.title.trim().is_empty() {
        path.title = format!("{} learning path", params.topic);
    }

    for (index, milestone) in path.milestones.iter_mut().enumerate() {
        if milestone.week == 0 {
            milestone.week = u32::try_from(index + 1).unwrap_or(weeks);
        }
        milestone.week = milestone.week.clamp(1, weeks);
    }
    path.milestones.sort_by_key(|m| m.week);

    if path.total_hours <= 0.0 {
        path.total_hours = path.milestones.iter().map(|m| m.estimated_hours).sum();
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    use crate::llm::ChatResponse;

    /// Replies with a fixed string and records the requests it saw.
    struct ScriptedClient {
        reply: String,
        seen: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedClient {
        fn new(reply: impl Into<String>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.into(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(ChatResponse {
                content: self.reply.clone(),
                model: None,
            })
        }
    }

    struct FailingClient;

    #[async_trait]
    impl LlmClient for FailingClient {
        async fn chat_completion(&self, _request: &ChatRequest) -> Result<ChatResponse, LlmError> {
            Err(LlmError::from_status(503, "upstream down", None))
        }
    }

    fn params(extra: serde_json::Value) -> GenerationParams {
        let mut body = json!({
            "topic": "Python",
            "expertise_level": "Beginner",
            "duration_weeks": 3,
            "time_commitment": "5 hrs/week",
        });
        if let (Some(obj), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            obj.extend(extra.clone());
        }
        GenerationParams::from_json(&body).unwrap()
    }

    #[tokio::test]
    async fn dev_mode_generates_a_path_for_the_requested_topic() {
        let generator = LearningPathGenerator::new(ProviderConfig::dev()).unwrap();
        let path = generator.execute(&params(json!({}))).await.unwrap();

        assert_eq!(path.topic, "Python");
        assert_eq!(path.duration_weeks, 3);
        assert_eq!(path.milestones.len(), 3);
        assert!(path.milestones.iter().all(|m| (1..=3).contains(&m.week)));
        assert_eq!(path.total_hours, 15.0);
    }

    #[tokio::test]
    async fn dev_mode_uses_the_request_not_the_prompt_text() {
        let generator = LearningPathGenerator::new(ProviderConfig::dev()).unwrap();
        let path = generator
            .execute(&params(json!({ "topic": "Rust\nasync runtimes", "duration_weeks": 2 })))
            .await
            .unwrap();

        assert_eq!(path.title, "Rust\nasync runtimes in 2 weeks");
        assert_eq!(path.milestones.len(), 2);
        assert_eq!(path.milestones[0].title, "Rust\nasync runtimes: week 1");
    }

    #[tokio::test]
    async fn request_fields_override_model_output_and_weeks_are_clamped() {
        let client = ScriptedClient::new(
            r#"Here you go: {"title": "", "topic": "Snakes", "milestones": [
                {"title": "late", "week": 9, "estimated_hours": 2},
                {"title": "unnumbered", "estimated_hours": 3}
            ]}"#,
        );
        let generator = LearningPathGenerator::with_client(ProviderConfig::default(), client.clone());

        let path = generator
            .execute(&params(json!({ "goals": "automate reports" })))
            .await
            .unwrap();

        assert_eq!(path.topic, "Python");
        assert_eq!(path.title, "Python learning path");
        assert_eq!(path.goals, vec!["automate reports".to_string()]);
        let weeks: Vec<u32> = path.milestones.iter().map(|m| m.week).collect();
        assert_eq!(weeks, vec![2, 3]);
        assert_eq!(path.total_hours, 5.0);
    }

    #[tokio::test]
    async fn resolves_requested_provider_and_model() {
        let client = ScriptedClient::new(r#"{"milestones": [{"title": "a", "week": 1}]}"#);
        let generator = LearningPathGenerator::with_client(ProviderConfig::default(), client.clone());

        generator
            .execute(&params(json!({ "ai_provider": "deepseek" })))
            .await
            .unwrap();
        generator
            .execute(&params(json!({ "ai_provider": "openai", "ai_model": "gpt-4o" })))
            .await
            .unwrap();

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].model, crate::provider::DEEPSEEK_DEFAULT_MODEL);
        assert_eq!(seen[1].model, "gpt-4o");
    }

    #[tokio::test]
    async fn path_without_milestones_is_rejected() {
        let client = ScriptedClient::new(r#"{"title": "empty", "milestones": []}"#);
        let generator = LearningPathGenerator::with_client(ProviderConfig::default(), client);

        let err = generator.execute(&params(json!({}))).await.unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidOutput(_)));
    }

    #[tokio::test]
    async fn non_json_reply_is_invalid_output() {
        let client = ScriptedClient::new("I cannot help with that.");
        let generator = LearningPathGenerator::with_client(ProviderConfig::default(), client);

        let err = generator.execute(&params(json!({}))).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid model output: model reply contained no JSON object"
        );
    }

    #[tokio::test]
    async fn provider_failures_become_execution_errors() {
        let generator = LearningPathGenerator::with_client(ProviderConfig::default(), Arc::new(FailingClient));

        let err = generator.execute(&params(json!({}))).await.unwrap_err();
        assert_eq!(err, ExecutionError::Provider("provider returned 503: upstream down".to_string()));
    }

    #[tokio::test]
    async fn missing_key_outside_dev_mode_fails_at_execution_time() {
        let generator = LearningPathGenerator::new(ProviderConfig::default()).unwrap();

        let err = generator.execute(&params(json!({}))).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "AI provider error: no API key configured for provider 'openrouter'"
        );
    }
}
