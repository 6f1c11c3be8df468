//! Activity history types and context folding.
//!
//! The activity stream is written by the user-facing backend; this service
//! only reads it and folds windows of it into the shapes the inference
//! capabilities take as input.

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// One row of the user activity stream.
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub action_type: String,
    pub query: Option<String>,
    pub time_of_day: Option<String>,
    pub day_of_week: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// How many free-text queries a folded context carries.
const RECENT_QUERY_CAP: usize = 10;

/// Folded activity history, rendered into the pattern detector's prompt.
///
/// BTreeMaps keep rendering deterministic for identical inputs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivitySummary {
    pub total_activities: usize,
    pub action_counts: BTreeMap<String, u32>,
    pub time_of_day_counts: BTreeMap<String, u32>,
    pub day_of_week_counts: BTreeMap<String, u32>,
    pub recent_queries: Vec<String>,
}

impl ActivitySummary {
    /// Fold newest-first activity rows into the summary shape.
    pub fn from_records(records: &[ActivityRecord]) -> Self {
        let mut summary = Self {
            total_activities: records.len(),
            ..Self::default()
        };

        for record in records {
            *summary
                .action_counts
                .entry(record.action_type.clone())
                .or_insert(0) += 1;

            if let Some(tod) = &record.time_of_day {
                *summary.time_of_day_counts.entry(tod.clone()).or_insert(0) += 1;
            }
            if let Some(dow) = &record.day_of_week {
                *summary.day_of_week_counts.entry(dow.clone()).or_insert(0) += 1;
            }
            if let Some(query) = &record.query
                && summary.recent_queries.len() < RECENT_QUERY_CAP
            {
                summary.recent_queries.push(query.clone());
            }
        }

        summary
    }

    pub fn is_empty(&self) -> bool {
        self.total_activities == 0
    }

    /// Render the summary as the block of text the detector prompt embeds.
    pub fn render(&self) -> String {
        format!(
            "Total Activities: {}\n\n\
             Action Type Distribution:\n{}\n\n\
             Time of Day Distribution:\n{}\n\n\
             Day of Week Distribution:\n{}\n\n\
             Recent Queries (last {}):\n{}",
            self.total_activities,
            render_counts(&self.action_counts),
            render_counts(&self.time_of_day_counts),
            render_counts(&self.day_of_week_counts),
            RECENT_QUERY_CAP,
            serde_json::to_string_pretty(&self.recent_queries).unwrap_or_default(),
        )
    }
}

fn render_counts(counts: &BTreeMap<String, u32>) -> String {
    serde_json::to_string_pretty(counts).unwrap_or_default()
}

/// Short-window context handed to the content generator alongside a job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserContext {
    pub recent_queries: Vec<String>,
    pub time_patterns: BTreeMap<String, u32>,
    pub total_activities: usize,
}

impl UserContext {
    /// Fold newest-first activity rows into generation context.
    pub fn from_records(records: &[ActivityRecord]) -> Self {
        let mut context = Self {
            total_activities: records.len(),
            ..Self::default()
        };

        for record in records {
            if let Some(query) = &record.query
                && context.recent_queries.len() < RECENT_QUERY_CAP
            {
                context.recent_queries.push(query.clone());
            }
            if let Some(tod) = &record.time_of_day {
                *context.time_patterns.entry(tod.clone()).or_insert(0) += 1;
            }
        }

        context
    }
}

/// Bucket an instant into the time-of-day vocabulary the activity stream
/// uses: morning 05:00-11:59, afternoon 12:00-16:59, evening 17:00-20:59,
/// night otherwise.
pub fn time_of_day_bucket(at: DateTime<Utc>) -> &'static str {
    match at.hour() {
        5..=11 => "morning",
        12..=16 => "afternoon",
        17..=20 => "evening",
        _ => "night",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(action: &str, query: Option<&str>, tod: Option<&str>, dow: Option<&str>) -> ActivityRecord {
        ActivityRecord {
            action_type: action.to_string(),
            query: query.map(str::to_string),
            time_of_day: tod.map(str::to_string),
            day_of_week: dow.map(str::to_string),
            occurred_at: Utc.with_ymd_and_hms(2024, 1, 15, 20, 0, 0).unwrap(),
        }
    }

    #[test]
    fn summary_counts_actions_and_patterns() {
        let records = vec![
            record("search", Some("movies tonight"), Some("evening"), Some("Friday")),
            record("search", Some("weather"), Some("morning"), Some("Friday")),
            record("view", None, Some("evening"), Some("Saturday")),
        ];

        let summary = ActivitySummary::from_records(&records);
        assert_eq!(summary.total_activities, 3);
        assert_eq!(summary.action_counts["search"], 2);
        assert_eq!(summary.action_counts["view"], 1);
        assert_eq!(summary.time_of_day_counts["evening"], 2);
        assert_eq!(summary.day_of_week_counts["Friday"], 2);
        assert_eq!(summary.recent_queries, vec!["movies tonight", "weather"]);
    }

    #[test]
    fn summary_caps_recent_queries() {
        let records: Vec<ActivityRecord> = (0..30)
            .map(|i| record("search", Some(&format!("query {i}")), None, None))
            .collect();

        let summary = ActivitySummary::from_records(&records);
        assert_eq!(summary.recent_queries.len(), 10);
        // Newest-first input order is preserved.
        assert_eq!(summary.recent_queries[0], "query 0");
    }

    #[test]
    fn empty_records_fold_to_empty_summary() {
        let summary = ActivitySummary::from_records(&[]);
        assert!(summary.is_empty());
        assert!(summary.action_counts.is_empty());
    }

    #[test]
    fn render_is_deterministic() {
        let records = vec![
            record("search", Some("movies"), Some("evening"), Some("Friday")),
            record("view", None, Some("morning"), Some("Monday")),
        ];
        let a = ActivitySummary::from_records(&records).render();
        let b = ActivitySummary::from_records(&records).render();
        assert_eq!(a, b);
        assert!(a.contains("Total Activities: 2"));
        assert!(a.contains("movies"));
    }

    #[test]
    fn user_context_folds_queries_and_time_patterns() {
        let records = vec![
            record("search", Some("movies"), Some("evening"), None),
            record("search", None, Some("evening"), None),
            record("view", Some("news"), Some("morning"), None),
        ];

        let context = UserContext::from_records(&records);
        assert_eq!(context.total_activities, 3);
        assert_eq!(context.recent_queries, vec!["movies", "news"]);
        assert_eq!(context.time_patterns["evening"], 2);
        assert_eq!(context.time_patterns["morning"], 1);
    }

    #[test]
    fn time_of_day_buckets() {
        let at = |h| Utc.with_ymd_and_hms(2024, 1, 15, h, 0, 0).unwrap();
        assert_eq!(time_of_day_bucket(at(5)), "morning");
        assert_eq!(time_of_day_bucket(at(11)), "morning");
        assert_eq!(time_of_day_bucket(at(12)), "afternoon");
        assert_eq!(time_of_day_bucket(at(16)), "afternoon");
        assert_eq!(time_of_day_bucket(at(17)), "evening");
        assert_eq!(time_of_day_bucket(at(20)), "evening");
        assert_eq!(time_of_day_bucket(at(21)), "night");
        assert_eq!(time_of_day_bucket(at(3)), "night");
    }
}
