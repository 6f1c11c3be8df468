//! Page content generation for claimed prediction jobs.

use crate::error::{Error, Result};
use crate::llm::{ContentGenerator, parse_json_response};
use crate::model::activity::UserContext;
use crate::model::pattern::PatternCandidate;
use crate::telemetry::genai;
use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use tracing::{Instrument, warn};

const SYSTEM_PROMPT: &str = "You are a content generator for an ambient intelligence \
dashboard. Given a predicted user need, you produce the page content the user would want \
already waiting for them when the need arrives. You respond with JSON only, no prose \
before or after.";

/// Content generator backed by an Anthropic completion agent.
pub struct AnthropicGenerator {
    agent: rig::agent::Agent<rig::providers::anthropic::completion::CompletionModel>,
    model: String,
}

impl AnthropicGenerator {
    pub fn new(client: &rig::providers::anthropic::Client, model: &str) -> Self {
        let agent = client
            .agent(model)
            .preamble(SYSTEM_PROMPT)
            .temperature(0.7)
            .max_tokens(2000)
            .build();
        Self {
            agent,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl ContentGenerator for AnthropicGenerator {
    async fn generate(
        &self,
        user_id: &str,
        predicted_need: &str,
        candidate: &PatternCandidate,
        context: &UserContext,
    ) -> Result<Option<serde_json::Value>> {
        let span = genai::start_chat_span(&self.model, "anthropic");
        let prompt = generation_prompt(predicted_need, candidate, context)?;
        let raw = async { self.agent.prompt(prompt).await }
            .instrument(span)
            .await
            .map_err(|e| Error::Inference(format!("content generation failed: {e}")))?;

        let value = parse_json_response(&raw)?;
        Ok(extract_components(value, user_id))
    }
}

fn generation_prompt(
    predicted_need: &str,
    candidate: &PatternCandidate,
    context: &UserContext,
) -> Result<String> {
    Ok(format!(
        r#"USER CONTEXT:
{}

DETECTED PATTERN:
{}

PREDICTED NEED: {predicted_need}

Generate the content components for a page satisfying this need right now.

Respond with a JSON object:
{{
  "components": [
    {{"type": "header", "title": "...", "subtitle": "..."}},
    {{"type": "card", "title": "...", "body": "...", "action": "..."}}
  ]
}}

Rules:
- Each component needs a "type" field; use header, card, list, or status.
- Content must be concrete and immediately useful, not placeholders.
- Return ONLY valid JSON."#,
        serde_json::to_string_pretty(context)?,
        serde_json::to_string_pretty(candidate)?,
    ))
}

/// Take the components array out of a parsed response. An empty or
/// missing array means the model produced nothing cacheable.
fn extract_components(mut value: serde_json::Value, user_id: &str) -> Option<serde_json::Value> {
    match value.get_mut("components").map(serde_json::Value::take) {
        Some(serde_json::Value::Array(items)) if !items.is_empty() => {
            Some(serde_json::Value::Array(items))
        }
        _ => {
            warn!(user_id, "generation response had no usable components");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_nonempty_components() {
        let value = json!({"components": [{"type": "card", "title": "Departures"}]});
        let components = extract_components(value, "user-1").unwrap();
        assert_eq!(components[0]["type"], json!("card"));
    }

    #[test]
    fn empty_components_yield_none() {
        assert!(extract_components(json!({"components": []}), "user-1").is_none());
    }

    #[test]
    fn missing_or_mistyped_components_yield_none() {
        assert!(extract_components(json!({}), "user-1").is_none());
        assert!(extract_components(json!({"components": "card"}), "user-1").is_none());
    }

    #[test]
    fn prompt_embeds_need_and_pattern() {
        let candidate: PatternCandidate = serde_json::from_value(json!({
            "confidence": 0.8,
            "predicted_action": "check departures"
        }))
        .unwrap();
        let prompt =
            generation_prompt("train departures", &candidate, &UserContext::default()).unwrap();
        assert!(prompt.contains("PREDICTED NEED: train departures"));
        assert!(prompt.contains("check departures"));
    }
}
