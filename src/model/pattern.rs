//! Pattern candidate payloads.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A behavioral pattern detected from a user's activity history.
///
/// Transient: produced by the detector, gated by admission, and stored
/// verbatim as the queued job's `context_data`. Confidence and the predicted
/// action are required; everything else the detector emits is optional, and
/// unrecognized fields survive the round trip through `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternCandidate {
    /// Detector's classification, e.g. "time_based", "query_based".
    #[serde(default)]
    pub pattern_type: String,

    /// Detector confidence in [0.0, 1.0].
    pub confidence: f64,

    /// What the user will likely do, in words. Queue-level dedup target.
    pub predicted_action: String,

    /// The query the user would have typed. Names the cache slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_query: Option<String>,

    /// When the need is expected, as stated by the detector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Any additional detector fields, preserved as-is.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PatternCandidate {
    /// The stated trigger instant, if present and parseable.
    pub fn trigger_instant(&self) -> Option<DateTime<Utc>> {
        self.trigger_time.as_deref().and_then(parse_instant)
    }

    /// The query text naming this prediction's cache slot. Falls back to the
    /// predicted action when the detector gave no usable query.
    pub fn cache_query(&self) -> &str {
        match self.predicted_query.as_deref() {
            Some(q) if !q.trim().is_empty() => q,
            _ => &self.predicted_action,
        }
    }
}

/// Parse a model-provided timestamp leniently: RFC 3339 (with `Z` or an
/// offset) first, then a bare `YYYY-MM-DDTHH:MM:SS[.f]` read as UTC.
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn deserializes_full_candidate() {
        let candidate: PatternCandidate = serde_json::from_value(json!({
            "pattern_type": "time_based",
            "confidence": 0.85,
            "predicted_action": "User will ask about movies",
            "predicted_query": "what movies should i watch",
            "trigger_time": "2024-01-15T20:00:00",
            "reasoning": "User asks about movies every Friday evening"
        }))
        .unwrap();

        assert_eq!(candidate.pattern_type, "time_based");
        assert_eq!(candidate.confidence, 0.85);
        assert_eq!(candidate.cache_query(), "what movies should i watch");
        assert!(candidate.extra.is_empty());
    }

    #[test]
    fn minimal_shape_is_enough() {
        let candidate: PatternCandidate = serde_json::from_value(json!({
            "confidence": 0.7,
            "predicted_action": "check the weather"
        }))
        .unwrap();

        assert!(candidate.predicted_query.is_none());
        assert!(candidate.trigger_instant().is_none());
        assert_eq!(candidate.cache_query(), "check the weather");
    }

    #[test]
    fn missing_confidence_is_rejected() {
        let result: Result<PatternCandidate, _> = serde_json::from_value(json!({
            "predicted_action": "check the weather"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn extra_fields_round_trip() {
        let input = json!({
            "confidence": 0.9,
            "predicted_action": "order lunch",
            "cuisine_hint": "thai",
            "weekday_only": true
        });
        let candidate: PatternCandidate = serde_json::from_value(input).unwrap();
        assert_eq!(candidate.extra["cuisine_hint"], json!("thai"));

        let back = serde_json::to_value(&candidate).unwrap();
        assert_eq!(back["cuisine_hint"], json!("thai"));
        assert_eq!(back["weekday_only"], json!(true));
    }

    #[test]
    fn empty_query_falls_back_to_action() {
        let candidate: PatternCandidate = serde_json::from_value(json!({
            "confidence": 0.8,
            "predicted_action": "ask about trains",
            "predicted_query": "   "
        }))
        .unwrap();
        assert_eq!(candidate.cache_query(), "ask about trains");
    }

    #[test]
    fn parses_rfc3339_with_zulu() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 20, 0, 0).unwrap();
        assert_eq!(parse_instant("2024-01-15T20:00:00Z"), Some(expected));
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 19, 0, 0).unwrap();
        assert_eq!(parse_instant("2024-01-15T20:00:00+01:00"), Some(expected));
    }

    #[test]
    fn parses_naive_timestamp_as_utc() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 20, 0, 0).unwrap();
        assert_eq!(parse_instant("2024-01-15T20:00:00"), Some(expected));
        assert_eq!(parse_instant("2024-01-15T20:00:00.500"), Some(expected + chrono::Duration::milliseconds(500)));
    }

    #[test]
    fn garbage_trigger_is_none() {
        assert_eq!(parse_instant("friday evening"), None);
        assert_eq!(parse_instant(""), None);
    }
}
