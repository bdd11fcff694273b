use async_trait::async_trait;
use serde_json::json;

use pathforge_core::GenerationParams;
use pathforge_core::params::MAX_DURATION_WEEKS;

use super::{ChatRequest, ChatResponse, LlmClient, LlmError};

/// Offline client used in dev mode: answers with a canned curriculum for the
/// request it was built for, without touching the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubLlmClient {
    topic: String,
    weeks: u32,
}

impl StubLlmClient {
    pub fn for_params(params: &GenerationParams) -> Self {
        Self {
            topic: params.topic.clone(),
            weeks: params.duration_weeks.clamp(1, MAX_DURATION_WEEKS),
        }
    }

    fn canned_path(&self) -> serde_json::Value {
        let (topic, weeks) = (&self.topic, self.weeks);
        let milestones: Vec<_> = (1..=weeks)
            .map(|week| {
                json!({
                    "title": format!("{topic}: week {week}"),
                    "description": format!("Study block {week} of {weeks} for {topic}."),
                    "week": week,
                    "estimated_hours": 5,
                    "skills": [format!("{topic} fundamentals {week}")],
                    "resources": [{
                        "title": format!("{topic} reading list, part {week}"),
                        "kind": "article"
                    }]
                })
            })
            .collect();

        json!({
            "title": format!("{topic} in {weeks} weeks"),
            "description": format!("A development-mode learning path for {topic}."),
            "milestones": milestones,
        })
    }
}

#[async_trait]
impl LlmClient for StubLlmClient {
    async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        tracing::debug!(model = %request.model, topic = %self.topic, weeks = self.weeks, "answering from stub client");

        Ok(ChatResponse {
            content: format!("```json\n{}\n```", self.canned_path()),
            model: Some("dev-stub".to_string()),
        })
    }
}
