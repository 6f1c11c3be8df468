//! Pattern detection over summarized user activity.

use crate::error::{Error, Result};
use crate::llm::{PatternDetector, parse_json_response};
use crate::model::activity::ActivitySummary;
use crate::model::pattern::PatternCandidate;
use crate::telemetry::genai;
use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use tracing::{Instrument, debug, warn};

/// Candidates below this confidence never leave the detector.
pub const MIN_CONFIDENCE: f64 = 0.6;

const SYSTEM_PROMPT: &str = "You are a pattern detection assistant for a speculative \
pre-generation service. You study summaries of a user's recent activity and identify \
repeating behavior worth preparing content for ahead of time. You respond with JSON only, \
no prose before or after.";

/// Pattern detector backed by an Anthropic completion agent.
pub struct AnthropicDetector {
    agent: rig::agent::Agent<rig::providers::anthropic::completion::CompletionModel>,
    model: String,
}

impl AnthropicDetector {
    pub fn new(client: &rig::providers::anthropic::Client, model: &str) -> Self {
        let agent = client
            .agent(model)
            .preamble(SYSTEM_PROMPT)
            .temperature(0.3)
            .max_tokens(1000)
            .build();
        Self {
            agent,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl PatternDetector for AnthropicDetector {
    async fn detect(
        &self,
        user_id: &str,
        summary: &ActivitySummary,
    ) -> Result<Vec<PatternCandidate>> {
        let span = genai::start_chat_span(&self.model, "anthropic");
        let prompt = detection_prompt(summary);
        let raw = async { self.agent.prompt(prompt).await }
            .instrument(span)
            .await
            .map_err(|e| Error::Inference(format!("pattern detection failed: {e}")))?;

        let value = parse_json_response(&raw)?;
        Ok(collect_candidates(&value, user_id))
    }
}

fn detection_prompt(summary: &ActivitySummary) -> String {
    format!(
        r#"USER ACTIVITY SUMMARY:
{}

YOUR TASK:
Identify up to 5 behavioral patterns in this activity that predict what the user
will need soon. Consider recurring queries, time-of-day habits, and day-of-week
habits.

Respond with a JSON object:
{{
  "patterns": [
    {{
      "pattern_type": "recurring_query",
      "confidence": 0.85,
      "predicted_action": "check train schedule",
      "predicted_query": "next train to Boston",
      "trigger_time": "2024-01-15T17:00:00Z",
      "reasoning": "Checks schedules most weekday evenings"
    }}
  ]
}}

Rules:
- confidence is your probability between 0 and 1 that the prediction is useful.
- trigger_time is when the user will likely need the content, ISO 8601 UTC.
- Omit trigger_time if you cannot estimate one.
- Return {{"patterns": []}} when nothing repeats."#,
        summary.render()
    )
}

/// Pull candidates out of a parsed response, dropping anything malformed
/// or under the confidence floor.
fn collect_candidates(value: &serde_json::Value, user_id: &str) -> Vec<PatternCandidate> {
    let Some(items) = value.get("patterns").and_then(|p| p.as_array()) else {
        warn!(user_id, "detection response had no patterns array");
        return Vec::new();
    };

    let mut candidates = Vec::new();
    for item in items {
        match serde_json::from_value::<PatternCandidate>(item.clone()) {
            Ok(candidate) if candidate.confidence >= MIN_CONFIDENCE => candidates.push(candidate),
            Ok(candidate) => {
                debug!(
                    user_id,
                    confidence = candidate.confidence,
                    "dropping low-confidence pattern"
                );
            }
            Err(e) => {
                warn!(user_id, error = %e, "skipping malformed pattern");
            }
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collects_confident_candidates() {
        let value = json!({
            "patterns": [
                {"confidence": 0.9, "predicted_action": "check weather"},
                {"confidence": 0.61, "predicted_action": "open calendar"},
            ]
        });
        let candidates = collect_candidates(&value, "user-1");
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].predicted_action, "check weather");
    }

    #[test]
    fn drops_low_confidence_candidates() {
        let value = json!({
            "patterns": [
                {"confidence": 0.59, "predicted_action": "check weather"},
            ]
        });
        assert!(collect_candidates(&value, "user-1").is_empty());
    }

    #[test]
    fn skips_malformed_items_without_failing() {
        let value = json!({
            "patterns": [
                {"predicted_action": "missing confidence"},
                {"confidence": "not a number", "predicted_action": "bad type"},
                {"confidence": 0.8, "predicted_action": "good one"},
            ]
        });
        let candidates = collect_candidates(&value, "user-1");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].predicted_action, "good one");
    }

    #[test]
    fn handles_missing_patterns_key() {
        assert!(collect_candidates(&json!({}), "user-1").is_empty());
        assert!(collect_candidates(&json!({"patterns": "oops"}), "user-1").is_empty());
    }
}
