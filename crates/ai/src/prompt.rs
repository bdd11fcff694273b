//! Prompt construction and model-output extraction.

use pathforge_core::GenerationParams;

use crate::llm::ChatMessage;

const SYSTEM_PROMPT: &str = "You are an expert curriculum designer. \
You build practical, week-by-week learning paths. \
Answer with a single JSON object and nothing else: no markdown, no commentary.";

const RESPONSE_SHAPE: &str = r#"{
  "title": string,
  "description": string,
  "total_hours": number,
  "milestones": [
    {
      "title": string,
      "description": string,
      "week": number,
      "estimated_hours": number,
      "skills": [string],
      "resources": [{ "title": string, "url": string, "kind": "article" | "video" | "course" | "book" | "exercise" }]
    }
  ]
}"#;

/// System + user messages for one generation request.
pub fn build_messages(params: &GenerationParams) -> Vec<ChatMessage> {
    let mut user = String::new();
    user.push_str("Create a personalized learning path.\n\n");
    user.push_str(&format!("Topic: {}\n", params.topic));
    user.push_str(&format!("Expertise level: {}\n", params.expertise_level));
    user.push_str(&format!("Duration (weeks): {}\n", params.duration_weeks));
    user.push_str(&format!("Weekly time commitment: {}\n", params.time_commitment));
    match params.goals.as_deref() {
        Some(goals) if !goals.is_empty() => {
            user.push_str("Learner goals:\n");
            for goal in goals {
                user.push_str(&format!("- {goal}\n"));
            }
        }
        _ => user.push_str("Learner goals: none stated, pick sensible outcomes for the level.\n"),
    }
    user.push_str(&format!(
        "\nPlan one or more milestones per week, with weeks numbered 1 to {}. \
Keep the weekly hours consistent with the time commitment.\n\nRespond with JSON shaped like:\n{RESPONSE_SHAPE}\n",
        params.duration_weeks
    ));

    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
}

/// First balanced JSON object in `text`.
///
/// Models wrap their answer in markdown fences or prose often enough that the
/// reply cannot be parsed as-is. Braces inside string literals are ignored.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
