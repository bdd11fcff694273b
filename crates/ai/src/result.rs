use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::llm::LlmError;

/// A generated curriculum.
///
/// This is what a finished task's `result` holds. Fields the model tends to
/// get loosely typed (numbers as strings, a goal as a bare string) are
/// deserialized leniently; the generator then overwrites the request fields
/// with the caller's values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPath {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub expertise_level: String,
    #[serde(default, deserialize_with = "lenient::whole")]
    pub duration_weeks: u32,
    #[serde(default)]
    pub time_commitment: String,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub goals: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub total_hours: f64,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
}

/// One step of a learning path, anchored to a week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "lenient::whole")]
    pub week: u32,
    #[serde(default, deserialize_with = "lenient::decimal")]
    pub estimated_hours: f64,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub skills: Vec<String>,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_resource_kind", alias = "type")]
    pub kind: String,
}

fn default_resource_kind() -> String {
    "article".to_string()
}

/// Executor failure. The `Display` text is what ends up in a failed task's `error`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("AI provider error: {0}")]
    Provider(String),

    #[error("invalid model output: {0}")]
    InvalidOutput(String),

    #[error("execution timed out after {}s", .0.as_secs_f64())]
    TimedOut(Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<LlmError> for ExecutionError {
    fn from(err: LlmError) -> Self {
        ExecutionError::Provider(err.to_string())
    }
}

mod lenient {
    use super::*;

    fn number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s
                .trim()
                .split(|c: char| !(c.is_ascii_digit() || c == '.'))
                .find(|part| !part.is_empty())
                .and_then(|part| part.parse::<f64>().ok()),
            _ => None,
        }
    }

    pub fn whole<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(number(&value)
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map(|n| n.round().min(f64::from(u32::MAX)) as u32)
            .unwrap_or_default())
    }

    pub fn decimal<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(number(&value)
            .filter(|n| n.is_finite() && *n >= 0.0)
            .unwrap_or_default())
    }

    pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(match value {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect(),
            Value::String(s) if !s.trim().is_empty() => vec![s],
            _ => Vec::new(),
        })
    }
}
