//! Producer pass: summarize activity, detect patterns, admit candidates.

use crate::admission::{Admission, AdmissionSummary};
use crate::clock::Clock;
use crate::db::Db;
use crate::error::Result;
use crate::llm::PatternDetector;
use crate::model::activity::ActivitySummary;
use crate::telemetry::metrics;
use chrono::Duration;
use opentelemetry::KeyValue;
use std::sync::Arc;
use tracing::{info, warn};

/// Users with no activity in this window are skipped entirely.
const ACTIVE_USER_DAYS: i64 = 7;

/// How far back the activity summary looks.
const ACTIVITY_WINDOW_DAYS: i64 = 30;

/// How many rows feed one summary.
const ACTIVITY_ROW_CAP: i64 = 100;

/// Counters for one full predictor pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PredictReport {
    pub active_users: usize,
    pub patterns_detected: usize,
    pub jobs_queued: usize,
    pub errors: usize,
}

/// The producer worker. Walks active users, detects patterns in their
/// activity, and hands candidates to admission.
pub struct Predictor {
    db: Arc<Db>,
    detector: Arc<dyn PatternDetector>,
    clock: Arc<dyn Clock>,
    admission: Admission,
}

impl Predictor {
    pub fn new(db: Arc<Db>, detector: Arc<dyn PatternDetector>, clock: Arc<dyn Clock>) -> Self {
        let admission = Admission::new(Arc::clone(&db), Arc::clone(&clock));
        Self {
            db,
            detector,
            clock,
            admission,
        }
    }

    /// Run one pass over every recently active user.
    ///
    /// Per-user failures are counted, logged, and skipped; only failing
    /// to enumerate users aborts the pass.
    pub async fn run_once(&self) -> Result<PredictReport> {
        let started = std::time::Instant::now();
        metrics::worker_runs().add(1, &[KeyValue::new("worker", "predictor")]);

        let now = self.clock.now();
        let users = self
            .db
            .active_users(now - Duration::days(ACTIVE_USER_DAYS))
            .await?;
        info!(users = users.len(), "predictor pass started");

        let mut report = PredictReport {
            active_users: users.len(),
            ..Default::default()
        };
        for user_id in &users {
            match self.process_user(user_id).await {
                Ok((patterns, admitted)) => {
                    report.patterns_detected += patterns;
                    report.jobs_queued += admitted.queued;
                    report.errors += admitted.errors;
                }
                Err(e) => {
                    warn!(user_id, error = %e, "predictor failed for user");
                    report.errors += 1;
                }
            }
        }

        metrics::run_duration_ms().record(
            started.elapsed().as_millis() as f64,
            &[KeyValue::new("worker", "predictor")],
        );
        info!(?report, "predictor pass complete");
        Ok(report)
    }

    async fn process_user(&self, user_id: &str) -> Result<(usize, AdmissionSummary)> {
        let now = self.clock.now();
        let records = self
            .db
            .recent_activity(
                user_id,
                now - Duration::days(ACTIVITY_WINDOW_DAYS),
                ACTIVITY_ROW_CAP,
            )
            .await?;
        if records.is_empty() {
            return Ok((0, AdmissionSummary::default()));
        }

        let summary = ActivitySummary::from_records(&records);

        // A detection failure costs this user one pass, nothing more.
        let candidates = match tokio::time::timeout(
            super::CAPABILITY_TIMEOUT,
            self.detector.detect(user_id, &summary),
        )
        .await
        {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(e)) => {
                warn!(user_id, error = %e, "pattern detection failed");
                return Ok((0, AdmissionSummary::default()));
            }
            Err(_) => {
                warn!(user_id, "pattern detection timed out");
                return Ok((0, AdmissionSummary::default()));
            }
        };

        if candidates.is_empty() {
            return Ok((0, AdmissionSummary::default()));
        }

        let admitted = self.admission.admit(user_id, &candidates).await;
        Ok((candidates.len(), admitted))
    }
}
