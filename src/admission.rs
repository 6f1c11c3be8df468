//! Admission control: decides which pattern candidates become queued jobs.
//!
//! Rejects low-confidence candidates, then checks two dedup layers
//! before enqueuing: a still-pending queued job for the same predicted
//! need, and a live cache entry for the same predicted query. Candidates
//! are admitted independently; one failure never blocks the rest.

use crate::clock::Clock;
use crate::db::Db;
use crate::db::queue::NewJob;
use crate::error::Result;
use crate::fingerprint;
use crate::model::pattern::PatternCandidate;
use crate::telemetry::metrics;
use chrono::Duration;
use opentelemetry::KeyValue;
use std::sync::Arc;
use tracing::{info, warn};

/// Candidates below this confidence are not worth the generation spend.
pub const QUEUE_CONFIDENCE: f64 = 0.7;

/// Lead time assumed when a candidate has no usable trigger time.
const DEFAULT_TRIGGER_LEAD_MINUTES: i64 = 30;

/// How long past its schedule a queued job stays worth doing.
const VALIDITY_HOURS: i64 = 1;

/// Outcome counts for one admission pass over a user's candidates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionSummary {
    pub queued: usize,
    pub below_threshold: usize,
    pub duplicate_queued: usize,
    pub duplicate_cached: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Queued,
    BelowThreshold,
    DuplicateQueued,
    DuplicateCached,
}

impl Verdict {
    fn as_str(self) -> &'static str {
        match self {
            Verdict::Queued => "queued",
            Verdict::BelowThreshold => "below_threshold",
            Verdict::DuplicateQueued => "duplicate_queued",
            Verdict::DuplicateCached => "duplicate_cached",
        }
    }
}

/// The admission controller.
pub struct Admission {
    db: Arc<Db>,
    clock: Arc<dyn Clock>,
}

impl Admission {
    pub fn new(db: Arc<Db>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Run every candidate through admission, tallying outcomes.
    pub async fn admit(
        &self,
        user_id: &str,
        candidates: &[PatternCandidate],
    ) -> AdmissionSummary {
        let mut summary = AdmissionSummary::default();
        for candidate in candidates {
            match self.admit_one(user_id, candidate).await {
                Ok(verdict) => {
                    metrics::admission_verdicts()
                        .add(1, &[KeyValue::new("verdict", verdict.as_str())]);
                    match verdict {
                        Verdict::Queued => summary.queued += 1,
                        Verdict::BelowThreshold => summary.below_threshold += 1,
                        Verdict::DuplicateQueued => summary.duplicate_queued += 1,
                        Verdict::DuplicateCached => summary.duplicate_cached += 1,
                    }
                }
                Err(e) => {
                    warn!(
                        user_id,
                        action = %candidate.predicted_action,
                        error = %e,
                        "admission failed for candidate"
                    );
                    metrics::admission_verdicts().add(1, &[KeyValue::new("verdict", "error")]);
                    summary.errors += 1;
                }
            }
        }
        summary
    }

    async fn admit_one(&self, user_id: &str, candidate: &PatternCandidate) -> Result<Verdict> {
        if candidate.confidence < QUEUE_CONFIDENCE {
            return Ok(Verdict::BelowThreshold);
        }

        let now = self.clock.now();
        let scheduled_for = candidate
            .trigger_instant()
            .unwrap_or_else(|| now + Duration::minutes(DEFAULT_TRIGGER_LEAD_MINUTES));

        if self
            .db
            .queued_need_exists(user_id, &candidate.predicted_action, now)
            .await?
        {
            return Ok(Verdict::DuplicateQueued);
        }

        // Cache dedup only applies when there is a query to fingerprint.
        if let Some(query) = candidate
            .predicted_query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
        {
            let key = fingerprint::cache_key(user_id, query);
            if self.db.live_entry(user_id, &key, now).await?.is_some() {
                return Ok(Verdict::DuplicateCached);
            }
        }

        let job = self
            .db
            .enqueue_job(
                NewJob {
                    user_id: user_id.to_string(),
                    priority: priority_for(candidate.confidence),
                    predicted_need: candidate.predicted_action.clone(),
                    context_data: serde_json::to_value(candidate)?,
                    scheduled_for,
                    valid_until: scheduled_for + Duration::hours(VALIDITY_HOURS),
                },
                now,
            )
            .await?;

        info!(
            user_id,
            job_id = %job.id,
            priority = job.priority,
            scheduled_for = %job.scheduled_for,
            need = %job.predicted_need,
            "queued prediction job"
        );
        Ok(Verdict::Queued)
    }
}

/// Map confidence to queue priority. Higher confidence processes first.
fn priority_for(confidence: f64) -> i32 {
    (confidence * 100.0).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_scales_and_rounds() {
        assert_eq!(priority_for(0.85), 85);
        assert_eq!(priority_for(0.7), 70);
        assert_eq!(priority_for(0.699), 70);
        assert_eq!(priority_for(1.0), 100);
    }

    #[test]
    fn verdict_labels_are_stable() {
        assert_eq!(Verdict::Queued.as_str(), "queued");
        assert_eq!(Verdict::DuplicateCached.as_str(), "duplicate_cached");
    }
}
