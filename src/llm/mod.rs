//! LLM capabilities via rig-core.
//!
//! Each inference concern is a trait so workers can be driven by stub
//! implementations in tests. The production implementations all talk to
//! Anthropic through rig-core agents:
//!
//! - [`PatternDetector`]: activity summary in, pattern candidates out
//! - [`ContentGenerator`]: predicted need in, page components out
//! - [`EventSentinel`]: context snapshot in, event drafts out
//!
//! [`PatternDetector`]: crate::llm::PatternDetector
//! [`ContentGenerator`]: crate::llm::ContentGenerator
//! [`EventSentinel`]: crate::llm::EventSentinel

pub mod detect;
pub mod generate;
pub mod sentinel;

use crate::error::{Error, Result};
use crate::model::activity::{ActivitySummary, UserContext};
use crate::model::event::{ContextSnapshot, EventDraft};
use crate::model::pattern::PatternCandidate;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

/// Create an Anthropic client from a secret API key.
///
/// The returned client builds completion agents via rig-core's
/// [`CompletionClient`] trait.
///
/// # Errors
/// Returns an error if the underlying HTTP client cannot be constructed.
///
/// [`CompletionClient`]: rig::client::CompletionClient
pub fn anthropic_client(api_key: &SecretString) -> Result<rig::providers::anthropic::Client> {
    rig::providers::anthropic::Client::new(api_key.expose_secret())
        .map_err(|e| Error::Inference(format!("failed to create Anthropic client: {e}")))
}

/// Detects patterns in a user's summarized activity.
#[async_trait]
pub trait PatternDetector: Send + Sync {
    async fn detect(
        &self,
        user_id: &str,
        summary: &ActivitySummary,
    ) -> Result<Vec<PatternCandidate>>;
}

/// Generates page content for a predicted need.
///
/// Returns `Ok(None)` when the model produced nothing usable; callers
/// treat that as a failed attempt.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        user_id: &str,
        predicted_need: &str,
        candidate: &PatternCandidate,
        context: &UserContext,
    ) -> Result<Option<serde_json::Value>>;
}

/// Proposes ambient events from a moment-in-time context snapshot.
#[async_trait]
pub trait EventSentinel: Send + Sync {
    async fn detect_events(
        &self,
        user_id: &str,
        snapshot: &ContextSnapshot,
    ) -> Result<Vec<EventDraft>>;
}

/// Parse a model response as JSON, tolerating markdown code fences.
///
/// Models regularly wrap output in ```json fences despite instructions.
pub(crate) fn parse_json_response(raw: &str) -> Result<serde_json::Value> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.strip_suffix("```").unwrap_or(rest))
        .unwrap_or(trimmed)
        .trim();
    Ok(serde_json::from_str(body)?)
}

#[cfg(test)]
mod tests {
    use super::parse_json_response;
    use serde_json::json;

    #[test]
    fn parses_bare_json() {
        let value = parse_json_response(r#"{"patterns": []}"#).unwrap();
        assert_eq!(value, json!({"patterns": []}));
    }

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n{\"patterns\": [{\"confidence\": 0.9}]}\n```";
        let value = parse_json_response(raw).unwrap();
        assert_eq!(value["patterns"][0]["confidence"], json!(0.9));
    }

    #[test]
    fn strips_anonymous_fence() {
        let raw = "```\n{\"events\": []}\n```";
        let value = parse_json_response(raw).unwrap();
        assert_eq!(value, json!({"events": []}));
    }

    #[test]
    fn rejects_prose() {
        assert!(parse_json_response("I could not find any patterns.").is_err());
    }
}
