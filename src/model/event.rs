//! Ambient event types.
//!
//! Events are the no-queue variant of the pipeline: the sentinel proposes
//! drafts from a context snapshot and they are stored directly, pending
//! delivery by a downstream layer this service does not implement.

use crate::model::activity::{ActivityRecord, time_of_day_bucket};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Delivery surface an event targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    LiveActivity,
    DynamicIsland,
    /// Also the fallback for anything the sentinel invents.
    #[default]
    #[serde(other)]
    Notification,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::LiveActivity => "live_activity",
            EventKind::DynamicIsland => "dynamic_island",
            EventKind::Notification => "notification",
        }
    }

    /// Read a stored value back, defaulting unknown strings the same way
    /// deserialization does.
    pub fn from_db(s: &str) -> Self {
        match s {
            "live_activity" => EventKind::LiveActivity,
            "dynamic_island" => EventKind::DynamicIsland,
            _ => EventKind::Notification,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Urgency of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    Critical,
    High,
    Low,
    #[default]
    #[serde(other)]
    Medium,
}

impl EventPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            EventPriority::Critical => "critical",
            EventPriority::High => "high",
            EventPriority::Medium => "medium",
            EventPriority::Low => "low",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "critical" => EventPriority::Critical,
            "high" => EventPriority::High,
            "low" => EventPriority::Low,
            _ => EventPriority::Medium,
        }
    }
}

impl std::fmt::Display for EventPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An event as proposed by the sentinel, before storage.
///
/// Everything but the title is optional; timestamps arrive as strings and
/// are parsed leniently at storage time, dropped when unparseable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDraft {
    #[serde(default)]
    pub event_type: EventKind,
    #[serde(default)]
    pub priority: EventPriority,
    #[serde(default)]
    pub title: String,
    pub subtitle: Option<String>,
    pub body: Option<String>,
    /// Free-form payload; the sentinel may put any fields here.
    #[serde(default = "empty_object")]
    pub data: serde_json::Value,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn default_confidence() -> f64 {
    0.7
}

/// A stored ambient event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmbientEvent {
    pub id: Uuid,
    pub user_id: String,
    pub event_type: EventKind,
    pub priority: EventPriority,
    pub title: String,
    pub subtitle: Option<String>,
    pub body: Option<String>,
    pub data: serde_json::Value,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    /// Events past this instant are invisible to context reads.
    pub valid_until: DateTime<Utc>,
    /// "pending" on insert; the delivery layer owns later states.
    pub status: String,
    pub confidence_score: f64,
    /// Which component generated the event.
    pub generation_source: String,
    pub created_at: DateTime<Utc>,
}

/// Parameters for storing a detected event.
#[derive(Debug, Clone)]
pub struct NewAmbientEvent {
    pub user_id: String,
    pub event_type: EventKind,
    pub priority: EventPriority,
    pub title: String,
    pub subtitle: Option<String>,
    pub body: Option<String>,
    pub data: serde_json::Value,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub valid_until: DateTime<Utc>,
    pub confidence_score: f64,
    pub generation_source: String,
}

/// Moment-in-time context handed to the event sentinel.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSnapshot {
    pub current_time: DateTime<Utc>,
    /// Weekday name, e.g. "Friday".
    pub day_of_week: String,
    pub time_of_day: String,
    pub recent_queries: Vec<TimedQuery>,
    pub time_patterns: BTreeMap<String, u32>,
    pub active_events: Vec<ActiveEventBrief>,
    pub total_recent_activities: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimedQuery {
    pub query: String,
    pub timestamp: DateTime<Utc>,
}

/// The slice of an active event the sentinel sees, to avoid re-proposing it.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveEventBrief {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub title: String,
    pub data: serde_json::Value,
}

impl ContextSnapshot {
    /// Assemble a snapshot from newest-first activity rows and the user's
    /// currently active events.
    pub fn assemble(
        now: DateTime<Utc>,
        records: &[ActivityRecord],
        active: &[AmbientEvent],
    ) -> Self {
        let mut recent_queries = Vec::new();
        let mut time_patterns = BTreeMap::new();

        for record in records {
            if let Some(query) = &record.query
                && recent_queries.len() < 10
            {
                recent_queries.push(TimedQuery {
                    query: query.clone(),
                    timestamp: record.occurred_at,
                });
            }
            if let Some(tod) = &record.time_of_day {
                *time_patterns.entry(tod.clone()).or_insert(0) += 1;
            }
        }

        Self {
            current_time: now,
            day_of_week: now.format("%A").to_string(),
            time_of_day: time_of_day_bucket(now).to_string(),
            recent_queries,
            time_patterns,
            active_events: active
                .iter()
                .map(|event| ActiveEventBrief {
                    id: event.id,
                    kind: event.event_type,
                    title: event.title.clone(),
                    data: event.data.clone(),
                })
                .collect(),
            total_recent_activities: records.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn event_kind_falls_back_to_notification() {
        let kind: EventKind = serde_json::from_value(json!("live_activity")).unwrap();
        assert_eq!(kind, EventKind::LiveActivity);

        let kind: EventKind = serde_json::from_value(json!("hologram")).unwrap();
        assert_eq!(kind, EventKind::Notification);

        assert_eq!(EventKind::from_db("dynamic_island"), EventKind::DynamicIsland);
        assert_eq!(EventKind::from_db("whatever"), EventKind::Notification);
    }

    #[test]
    fn event_priority_falls_back_to_medium() {
        let priority: EventPriority = serde_json::from_value(json!("critical")).unwrap();
        assert_eq!(priority, EventPriority::Critical);

        let priority: EventPriority = serde_json::from_value(json!("urgent-ish")).unwrap();
        assert_eq!(priority, EventPriority::Medium);

        assert_eq!(EventPriority::from_db("low"), EventPriority::Low);
        assert_eq!(EventPriority::from_db(""), EventPriority::Medium);
    }

    #[test]
    fn draft_defaults_apply() {
        let draft: EventDraft = serde_json::from_value(json!({
            "title": "Train departing soon"
        }))
        .unwrap();

        assert_eq!(draft.event_type, EventKind::Notification);
        assert_eq!(draft.priority, EventPriority::Medium);
        assert_eq!(draft.confidence_score, 0.7);
        assert!(draft.data.is_object());
        assert!(draft.start_time.is_none());
    }

    #[test]
    fn draft_with_all_fields() {
        let draft: EventDraft = serde_json::from_value(json!({
            "event_type": "live_activity",
            "priority": "high",
            "title": "Northeast Regional 190",
            "subtitle": "Track 7",
            "body": "Departs in 45 minutes",
            "data": {"train": "190", "platform": "Track 7"},
            "icon": "tram.fill",
            "color": "#FF5733",
            "start_time": "2024-01-15T15:00:00Z",
            "end_time": "2024-01-15T15:45:00Z",
            "confidence_score": 0.92
        }))
        .unwrap();

        assert_eq!(draft.event_type, EventKind::LiveActivity);
        assert_eq!(draft.priority, EventPriority::High);
        assert_eq!(draft.data["train"], json!("190"));
        assert_eq!(draft.confidence_score, 0.92);
    }

    #[test]
    fn snapshot_folds_queries_events_and_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 1, 19, 18, 30, 0).unwrap(); // a Friday evening
        let records = vec![
            ActivityRecord {
                action_type: "search".to_string(),
                query: Some("train schedule".to_string()),
                time_of_day: Some("evening".to_string()),
                day_of_week: Some("Friday".to_string()),
                occurred_at: now - chrono::Duration::hours(1),
            },
            ActivityRecord {
                action_type: "view".to_string(),
                query: None,
                time_of_day: Some("morning".to_string()),
                day_of_week: Some("Friday".to_string()),
                occurred_at: now - chrono::Duration::hours(10),
            },
        ];
        let active = vec![AmbientEvent {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            event_type: EventKind::LiveActivity,
            priority: EventPriority::High,
            title: "Package arriving".to_string(),
            subtitle: None,
            body: None,
            data: json!({"carrier": "UPS"}),
            icon: None,
            color: None,
            starts_at: None,
            ends_at: None,
            valid_until: now + chrono::Duration::hours(1),
            status: "active".to_string(),
            confidence_score: 0.8,
            generation_source: "anthropic".to_string(),
            created_at: now - chrono::Duration::minutes(5),
        }];

        let snapshot = ContextSnapshot::assemble(now, &records, &active);
        assert_eq!(snapshot.day_of_week, "Friday");
        assert_eq!(snapshot.time_of_day, "evening");
        assert_eq!(snapshot.recent_queries.len(), 1);
        assert_eq!(snapshot.recent_queries[0].query, "train schedule");
        assert_eq!(snapshot.time_patterns["evening"], 1);
        assert_eq!(snapshot.active_events.len(), 1);
        assert_eq!(snapshot.active_events[0].title, "Package arriving");
        assert_eq!(snapshot.total_recent_activities, 2);
    }
}
