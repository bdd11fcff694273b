//! Generation parameters: the validated input of a learning-path task.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DomainError, DomainResult};

/// Required request fields, in the order they are checked.
pub const REQUIRED_FIELDS: [&str; 4] = ["topic", "expertise_level", "duration_weeks", "time_commitment"];

/// Upper bound for `duration_weeks`.
pub const MAX_DURATION_WEEKS: u32 = 52;

/// AI provider a task should be generated with.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    #[default]
    OpenRouter,
    OpenAi,
    DeepSeek,
}

impl AiProvider {
    pub const ALL: [AiProvider; 3] = [AiProvider::OpenRouter, AiProvider::OpenAi, AiProvider::DeepSeek];

    pub fn as_str(&self) -> &'static str {
        match self {
            AiProvider::OpenRouter => "openrouter",
            AiProvider::OpenAi => "openai",
            AiProvider::DeepSeek => "deepseek",
        }
    }
}

impl core::fmt::Display for AiProvider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AiProvider {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openrouter" => Ok(AiProvider::OpenRouter),
            "openai" => Ok(AiProvider::OpenAi),
            "deepseek" => Ok(AiProvider::DeepSeek),
            other => Err(DomainError::validation(format!(
                "unknown ai_provider '{other}' (expected one of: openrouter, openai, deepseek)"
            ))),
        }
    }
}

/// Validated input of the task executor.
///
/// Construct through [`GenerationParams::from_json`] so every instance has
/// passed request validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub topic: String,
    pub expertise_level: String,
    pub duration_weeks: u32,
    pub time_commitment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<Vec<String>>,
    /// `None` means "use the configured default provider".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_provider: Option<AiProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_model: Option<String>,
}

impl GenerationParams {
    /// Validate a raw JSON request body.
    ///
    /// Missing required fields are reported first (in [`REQUIRED_FIELDS`]
    /// order); type and range problems after that.
    pub fn from_json(body: &Value) -> DomainResult<Self> {
        let obj = body
            .as_object()
            .ok_or_else(|| DomainError::validation("request body must be a JSON object"))?;

        for field in REQUIRED_FIELDS {
            if obj.get(field).is_none_or(Value::is_null) {
                return Err(DomainError::MissingField(field));
            }
        }

        Ok(Self {
            topic: required_text(obj, "topic")?,
            expertise_level: required_text(obj, "expertise_level")?,
            duration_weeks: parse_duration_weeks(&obj["duration_weeks"])?,
            time_commitment: required_text(obj, "time_commitment")?,
            goals: normalize_goals(obj.get("goals")),
            ai_provider: optional_text(obj, "ai_provider")?
                .map(|p| p.parse::<AiProvider>())
                .transpose()?,
            ai_model: optional_text(obj, "ai_model")?,
        })
    }
}

fn required_text(obj: &Map<String, Value>, field: &'static str) -> DomainResult<String> {
    match obj.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) => Err(DomainError::validation(format!("{field} must not be empty"))),
        Some(Value::Null) | None => Err(DomainError::MissingField(field)),
        Some(_) => Err(DomainError::validation(format!("{field} must be a string"))),
    }
}

fn optional_text(obj: &Map<String, Value>, field: &'static str) -> DomainResult<Option<String>> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(DomainError::validation(format!("{field} must be a string"))),
    }
}

/// Accepts a whole JSON number or a numeric string.
fn parse_duration_weeks(raw: &Value) -> DomainResult<u32> {
    let weeks = match raw {
        Value::Number(n) => match (n.as_u64(), n.as_f64()) {
            (Some(w), _) => Some(w),
            (None, Some(f)) if f.fract() == 0.0 && f >= 0.0 => Some(f as u64),
            _ => None,
        },
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
    .ok_or_else(|| DomainError::validation("duration_weeks must be a whole number of weeks"))?;

    if weeks == 0 || weeks > u64::from(MAX_DURATION_WEEKS) {
        return Err(DomainError::validation(format!(
            "duration_weeks must be between 1 and {MAX_DURATION_WEEKS}"
        )));
    }
    Ok(weeks as u32)
}

/// Normalize the free-form `goals` field.
///
/// - array → trimmed, non-empty entries (non-string items keep their JSON text)
/// - non-empty string → one-element list
/// - anything else, or nothing left after trimming → `None`
pub fn normalize_goals(raw: Option<&Value>) -> Option<Vec<String>> {
    match raw? {
        Value::Array(items) => {
            let goals: Vec<String> = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .filter(|g| !g.is_empty())
                .collect();
            (!goals.is_empty()).then_some(goals)
        }
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| vec![s.to_string()])
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn valid_body() -> Value {
        json!({
            "topic": "Python",
            "expertise_level": "Beginner",
            "duration_weeks": 4,
            "time_commitment": "5 hrs/week",
        })
    }

    #[test]
    fn accepts_minimal_valid_request() {
        let params = GenerationParams::from_json(&valid_body()).unwrap();
        assert_eq!(params.topic, "Python");
        assert_eq!(params.expertise_level, "Beginner");
        assert_eq!(params.duration_weeks, 4);
        assert_eq!(params.time_commitment, "5 hrs/week");
        assert_eq!(params.goals, None);
        assert_eq!(params.ai_provider, None);
        assert_eq!(params.ai_model, None);
    }

    #[test]
    fn reports_first_missing_field_in_order() {
        let err = GenerationParams::from_json(&json!({ "time_commitment": "1h" })).unwrap_err();
        assert_eq!(err, DomainError::MissingField("topic"));

        let mut body = valid_body();
        body.as_object_mut().unwrap().remove("duration_weeks");
        let err = GenerationParams::from_json(&body).unwrap_err();
        assert_eq!(err.to_string(), "Missing required field: duration_weeks");
    }

    #[test]
    fn null_counts_as_missing() {
        let mut body = valid_body();
        body["expertise_level"] = Value::Null;
        assert_eq!(
            GenerationParams::from_json(&body).unwrap_err(),
            DomainError::MissingField("expertise_level")
        );
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert!(matches!(
            GenerationParams::from_json(&json!(["topic"])),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn duration_accepts_numeric_strings_and_rejects_out_of_range() {
        let mut body = valid_body();
        body["duration_weeks"] = json!(" 6 ");
        assert_eq!(GenerationParams::from_json(&body).unwrap().duration_weeks, 6);

        body["duration_weeks"] = json!(8.0);
        assert_eq!(GenerationParams::from_json(&body).unwrap().duration_weeks, 8);

        for bad in [json!(0), json!(53), json!(2.5), json!("four"), json!(-1), json!(true)] {
            body["duration_weeks"] = bad.clone();
            assert!(
                matches!(GenerationParams::from_json(&body), Err(DomainError::Validation(_))),
                "expected validation error for {bad}"
            );
        }
    }

    #[test]
    fn blank_required_text_is_a_validation_error() {
        let mut body = valid_body();
        body["topic"] = json!("   ");
        assert!(matches!(
            GenerationParams::from_json(&body),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn provider_is_parsed_case_insensitively() {
        let mut body = valid_body();
        body["ai_provider"] = json!("OpenAI");
        body["ai_model"] = json!("gpt-4o-mini");
        let params = GenerationParams::from_json(&body).unwrap();
        assert_eq!(params.ai_provider, Some(AiProvider::OpenAi));
        assert_eq!(params.ai_model.as_deref(), Some("gpt-4o-mini"));

        body["ai_provider"] = json!("skynet");
        assert!(matches!(
            GenerationParams::from_json(&body),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn goals_are_normalized() {
        assert_eq!(normalize_goals(None), None);
        assert_eq!(normalize_goals(Some(&Value::Null)), None);
        assert_eq!(normalize_goals(Some(&json!("  "))), None);
        assert_eq!(normalize_goals(Some(&json!([]))), None);
        assert_eq!(normalize_goals(Some(&json!(42))), None);
        assert_eq!(
            normalize_goals(Some(&json!("  get a job "))),
            Some(vec!["get a job".to_string()])
        );
        assert_eq!(
            normalize_goals(Some(&json!(["build apps", "", null, 3]))),
            Some(vec!["build apps".to_string(), "3".to_string()])
        );
    }

    #[test]
    fn params_survive_a_json_round_trip() {
        let mut body = valid_body();
        body["goals"] = json!(["ship a CLI"]);
        body["ai_provider"] = json!("deepseek");
        let params = GenerationParams::from_json(&body).unwrap();

        let encoded = serde_json::to_value(&params).unwrap();
        assert_eq!(encoded["ai_provider"], json!("deepseek"));
        let decoded: GenerationParams = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, params);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Normalized goal lists never contain blank entries and are never empty.
        #[test]
        fn normalized_goals_have_no_blanks(goals in prop::collection::vec("[ a-z]{0,12}", 0..8)) {
            let raw = json!(goals);
            if let Some(list) = normalize_goals(Some(&raw)) {
                prop_assert!(!list.is_empty());
                prop_assert!(list.iter().all(|g| !g.trim().is_empty() && g.trim() == g));
            } else {
                prop_assert!(goals.iter().all(|g| g.trim().is_empty()));
            }
        }

        /// Every week count in range is accepted, both as number and string.
        #[test]
        fn in_range_durations_are_accepted(weeks in 1u32..=MAX_DURATION_WEEKS) {
            let mut body = json!({
                "topic": "Rust",
                "expertise_level": "Advanced",
                "duration_weeks": weeks,
                "time_commitment": "10 hrs/week",
            });
            prop_assert_eq!(GenerationParams::from_json(&body).unwrap().duration_weeks, weeks);
            body["duration_weeks"] = json!(weeks.to_string());
            prop_assert_eq!(GenerationParams::from_json(&body).unwrap().duration_weeks, weeks);
        }
    }
}
