//! Ambient pass: snapshot each user's moment, detect events, store drafts.

use crate::clock::Clock;
use crate::db::Db;
use crate::error::Result;
use crate::llm::EventSentinel;
use crate::model::event::{ContextSnapshot, EventDraft, NewAmbientEvent};
use crate::model::pattern::parse_instant;
use crate::telemetry::metrics;
use chrono::{DateTime, Duration, Utc};
use opentelemetry::KeyValue;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Users with no activity in this window are not worth a snapshot.
const ACTIVE_USER_HOURS: i64 = 24;

/// Per-pass user cap, most recently active first.
pub const MAX_USERS_PER_RUN: i64 = 50;

/// How far back the snapshot's activity slice looks.
const CONTEXT_WINDOW_DAYS: i64 = 7;

/// How many activity rows feed one snapshot.
const CONTEXT_ROW_CAP: i64 = 50;

/// How many active events the sentinel sees.
const ACTIVE_EVENT_CAP: i64 = 10;

/// Validity granted to events with no end time.
const DEFAULT_VALIDITY_HOURS: i64 = 1;

/// Grace past an event's end time before it goes invisible.
const END_GRACE_MINUTES: i64 = 15;

const GENERATION_SOURCE: &str = "anthropic";

/// Counters for one full ambient pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AmbientReport {
    pub users_processed: usize,
    pub events_generated: usize,
    pub errors: usize,
}

/// The ambient worker. Snapshots recently active users and stores
/// whatever events the sentinel proposes.
pub struct AmbientDetector {
    db: Arc<Db>,
    sentinel: Arc<dyn EventSentinel>,
    clock: Arc<dyn Clock>,
}

impl AmbientDetector {
    pub fn new(db: Arc<Db>, sentinel: Arc<dyn EventSentinel>, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            sentinel,
            clock,
        }
    }

    /// Run one pass over the most recently active users.
    pub async fn run_once(&self) -> Result<AmbientReport> {
        let started = std::time::Instant::now();
        metrics::worker_runs().add(1, &[KeyValue::new("worker", "ambient")]);

        let now = self.clock.now();
        let users = self
            .db
            .recently_active_users(now - Duration::hours(ACTIVE_USER_HOURS), MAX_USERS_PER_RUN)
            .await?;
        info!(users = users.len(), "ambient pass started");

        let mut report = AmbientReport::default();
        for user_id in &users {
            match self.process_user(user_id).await {
                Ok(stored) => {
                    report.users_processed += 1;
                    report.events_generated += stored;
                }
                Err(e) => {
                    warn!(user_id, error = %e, "ambient pass failed for user");
                    report.errors += 1;
                }
            }
        }

        metrics::run_duration_ms().record(
            started.elapsed().as_millis() as f64,
            &[KeyValue::new("worker", "ambient")],
        );
        info!(?report, "ambient pass complete");
        Ok(report)
    }

    async fn process_user(&self, user_id: &str) -> Result<usize> {
        let now = self.clock.now();
        let records = self
            .db
            .recent_activity(
                user_id,
                now - Duration::days(CONTEXT_WINDOW_DAYS),
                CONTEXT_ROW_CAP,
            )
            .await?;
        let active = self.db.active_events(user_id, now, ACTIVE_EVENT_CAP).await?;
        let snapshot = ContextSnapshot::assemble(now, &records, &active);

        // A sentinel failure means zero events this pass, not an error.
        let drafts = match tokio::time::timeout(
            super::CAPABILITY_TIMEOUT,
            self.sentinel.detect_events(user_id, &snapshot),
        )
        .await
        {
            Ok(Ok(drafts)) => drafts,
            Ok(Err(e)) => {
                warn!(user_id, error = %e, "event detection failed");
                return Ok(0);
            }
            Err(_) => {
                warn!(user_id, "event detection timed out");
                return Ok(0);
            }
        };

        let mut stored = 0;
        for draft in drafts {
            let event = event_from_draft(user_id, draft, now);
            let kind = event.event_type;
            match self.db.insert_event(event, now).await {
                Ok(id) => {
                    metrics::events_stored()
                        .add(1, &[KeyValue::new("event_type", kind.as_str())]);
                    debug!(user_id, event_id = %id, event_type = kind.as_str(), "stored event");
                    stored += 1;
                }
                Err(e) => {
                    warn!(user_id, error = %e, "failed to store event");
                }
            }
        }
        Ok(stored)
    }
}

/// Resolve a draft into storable form. Unparseable timestamps are
/// dropped rather than failing the event.
fn event_from_draft(user_id: &str, draft: EventDraft, now: DateTime<Utc>) -> NewAmbientEvent {
    let starts_at = draft.start_time.as_deref().and_then(parse_instant);
    let ends_at = draft.end_time.as_deref().and_then(parse_instant);
    let valid_until = match ends_at {
        Some(end) => end + Duration::minutes(END_GRACE_MINUTES),
        None => now + Duration::hours(DEFAULT_VALIDITY_HOURS),
    };

    NewAmbientEvent {
        user_id: user_id.to_string(),
        event_type: draft.event_type,
        priority: draft.priority,
        title: draft.title,
        subtitle: draft.subtitle,
        body: draft.body,
        data: draft.data,
        icon: draft.icon,
        color: draft.color,
        starts_at,
        ends_at,
        valid_until,
        confidence_score: draft.confidence_score,
        generation_source: GENERATION_SOURCE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn draft(value: serde_json::Value) -> EventDraft {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn end_time_grants_grace_window() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let event = event_from_draft(
            "user-1",
            draft(json!({
                "title": "Train departs",
                "end_time": "2024-01-15T15:45:00Z"
            })),
            now,
        );
        let end = Utc.with_ymd_and_hms(2024, 1, 15, 15, 45, 0).unwrap();
        assert_eq!(event.ends_at, Some(end));
        assert_eq!(event.valid_until, end + Duration::minutes(END_GRACE_MINUTES));
    }

    #[test]
    fn missing_end_time_defaults_validity() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let event = event_from_draft("user-1", draft(json!({"title": "Heads up"})), now);
        assert!(event.ends_at.is_none());
        assert_eq!(event.valid_until, now + Duration::hours(DEFAULT_VALIDITY_HOURS));
    }

    #[test]
    fn unparseable_timestamps_are_dropped() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let event = event_from_draft(
            "user-1",
            draft(json!({
                "title": "Fuzzy times",
                "start_time": "sometime this afternoon",
                "end_time": "later"
            })),
            now,
        );
        assert!(event.starts_at.is_none());
        assert!(event.ends_at.is_none());
        assert_eq!(event.valid_until, now + Duration::hours(DEFAULT_VALIDITY_HOURS));
    }

    #[test]
    fn draft_fields_carry_through() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let event = event_from_draft(
            "user-7",
            draft(json!({
                "event_type": "dynamic_island",
                "priority": "critical",
                "title": "Gate change",
                "data": {"gate": "B12"},
                "confidence_score": 0.95
            })),
            now,
        );
        assert_eq!(event.user_id, "user-7");
        assert_eq!(event.title, "Gate change");
        assert_eq!(event.data["gate"], json!("B12"));
        assert_eq!(event.confidence_score, 0.95);
        assert_eq!(event.generation_source, "anthropic");
    }
}
