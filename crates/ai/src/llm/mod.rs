//! Chat-completion transport.
//!
//! Every supported provider speaks the OpenAI `/chat/completions` dialect, so a
//! single client implementation covers them; the trait exists so dev mode and
//! tests can answer without a network.

mod openai_compat;
mod stub;

pub use openai_compat::OpenAiCompatClient;
pub use stub::StubLlmClient;

use std::time::Duration;

use async_trait::async_trait;
use pathforge_core::AiProvider;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One chat completion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    /// Model that actually answered, when the provider reports it.
    pub model: Option<String>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by provider: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("provider returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("provider rejected the request with {status}: {body}")]
    Client { status: u16, body: String },

    #[error("could not parse provider response: {0}")]
    Parse(String),

    #[error("no API key configured for provider '{0}'")]
    MissingApiKey(AiProvider),
}

impl LlmError {
    /// Build the error for a non-success HTTP status.
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let body = truncate(body, 500);
        match status {
            429 => LlmError::RateLimited {
                message: body,
                retry_after,
            },
            500..=599 => LlmError::Server { status, body },
            _ => LlmError::Client { status, body },
        }
    }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::Network(_) | LlmError::RateLimited { .. } | LlmError::Server { .. }
        )
    }
}

fn truncate(body: &str, max_chars: usize) -> String {
    let mut chars = body.chars();
    let mut out: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        out.push_str("...");
    }
    out
}

/// Retry schedule for transient provider failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based): exponential, capped, and
    /// never shorter than a provider-supplied `Retry-After`.
    pub fn delay_for(&self, attempt: u32, error: &LlmError) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        match error {
            LlmError::RateLimited {
                retry_after: Some(after),
                ..
            } => (*after).max(exp).min(self.max_delay),
            _ => exp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_classified() {
        assert!(matches!(
            LlmError::from_status(429, "slow down", None),
            LlmError::RateLimited { .. }
        ));
        assert!(matches!(
            LlmError::from_status(503, "", None),
            LlmError::Server { status: 503, .. }
        ));
        assert!(matches!(
            LlmError::from_status(401, "bad key", None),
            LlmError::Client { status: 401, .. }
        ));
        assert!(LlmError::from_status(502, "", None).is_retryable());
        assert!(!LlmError::from_status(400, "", None).is_retryable());
        assert!(!LlmError::MissingApiKey(AiProvider::OpenAi).is_retryable());
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(800);
        match LlmError::from_status(500, &body, None) {
            LlmError::Server { body, .. } => assert_eq!(body.len(), 503),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let retry = RetryConfig {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        let err = LlmError::Network("reset".into());
        assert_eq!(retry.delay_for(0, &err), Duration::from_millis(100));
        assert_eq!(retry.delay_for(1, &err), Duration::from_millis(200));
        assert_eq!(retry.delay_for(2, &err), Duration::from_millis(350));

        let limited = LlmError::RateLimited {
            message: String::new(),
            retry_after: Some(Duration::from_millis(300)),
        };
        assert_eq!(retry.delay_for(0, &limited), Duration::from_millis(300));
    }
}
