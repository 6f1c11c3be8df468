//! Ambient event detection from a context snapshot.

use crate::error::{Error, Result};
use crate::llm::{EventSentinel, parse_json_response};
use crate::model::event::{ContextSnapshot, EventDraft};
use crate::telemetry::genai;
use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use tracing::{Instrument, warn};

const SYSTEM_PROMPT: &str = "You are an ambient event detector for a personal assistant. \
You watch a user's current context and decide whether anything happening right now \
deserves a notification, live activity, or dynamic island presence on their device. You \
are conservative: most moments deserve no events. You respond with JSON only, no prose \
before or after.";

/// Event sentinel backed by an Anthropic completion agent.
pub struct AnthropicSentinel {
    agent: rig::agent::Agent<rig::providers::anthropic::completion::CompletionModel>,
    model: String,
}

impl AnthropicSentinel {
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
impl EventSentinel for AnthropicSentinel {
    async fn detect_events(
        &self,
        user_id: &str,
        snapshot: &ContextSnapshot,
    ) -> Result<Vec<EventDraft>> {
        let span = genai::start_chat_span(&self.model, "anthropic");
        let prompt = sentinel_prompt(snapshot)?;
        let raw = async { self.agent.prompt(prompt).await }
            .instrument(span)
            .await
            .map_err(|e| Error::Inference(format!("event detection failed: {e}")))?;

        let value = parse_json_response(&raw)?;
        Ok(collect_drafts(&value, user_id))
    }
}

fn sentinel_prompt(snapshot: &ContextSnapshot) -> Result<String> {
    Ok(format!(
        r##"CURRENT CONTEXT:
{}

YOUR TASK:
Decide whether anything in this context deserves an ambient event on the user's
device right now. Do not re-propose anything already listed in active_events.

Respond with a JSON object:
{{
  "events": [
    {{
      "event_type": "live_activity",
      "priority": "high",
      "title": "Train 190 departs soon",
      "subtitle": "Track 7",
      "body": "Board at South Station by 5:10pm",
      "data": {{"train": "190"}},
      "icon": "tram.fill",
      "color": "#FF5733",
      "start_time": "2024-01-15T15:00:00Z",
      "end_time": "2024-01-15T15:45:00Z",
      "confidence_score": 0.9
    }}
  ]
}}

Rules:
- event_type is one of notification, live_activity, dynamic_island.
- priority is one of critical, high, medium, low.
- start_time and end_time are ISO 8601 UTC, both optional.
- Return {{"events": []}} when nothing warrants an event."##,
        serde_json::to_string_pretty(snapshot)?,
    ))
}

/// Pull event drafts out of a parsed response, dropping malformed items.
fn collect_drafts(value: &serde_json::Value, user_id: &str) -> Vec<EventDraft> {
    let Some(items) = value.get("events").and_then(|e| e.as_array()) else {
        warn!(user_id, "sentinel response had no events array");
        return Vec::new();
    };

    let mut drafts = Vec::new();
    for item in items {
        match serde_json::from_value::<EventDraft>(item.clone()) {
            Ok(draft) => drafts.push(draft),
            Err(e) => {
                warn!(user_id, error = %e, "skipping malformed event draft");
            }
        }
    }
    drafts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::event::{EventKind, EventPriority};
    use serde_json::json;

    #[test]
    fn collects_valid_drafts() {
        let value = json!({
            "events": [
                {"event_type": "notification", "priority": "low", "title": "Heads up"},
                {"event_type": "later_invented_kind", "title": "Falls back"},
            ]
        });
        let drafts = collect_drafts(&value, "user-1");
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].priority, EventPriority::Low);
        assert_eq!(drafts[1].event_type, EventKind::Notification);
    }

    #[test]
    fn skips_malformed_drafts() {
        let value = json!({
            "events": [
                {"title": "fine"},
                {"title": 42},
            ]
        });
        let drafts = collect_drafts(&value, "user-1");
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "fine");
    }

    #[test]
    fn empty_or_missing_events_yield_nothing() {
        assert!(collect_drafts(&json!({"events": []}), "user-1").is_empty());
        assert!(collect_drafts(&json!({}), "user-1").is_empty());
    }
}
