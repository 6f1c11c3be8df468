//! Consumer pass: claim due jobs, generate content, reconcile the cache.

use crate::clock::Clock;
use crate::db::Db;
use crate::db::queue::RetryDisposition;
use crate::error::{Error, Result};
use crate::fingerprint;
use crate::llm::ContentGenerator;
use crate::model::activity::UserContext;
use crate::model::cache::NewCacheEntry;
use crate::model::job::PredictionJob;
use crate::model::pattern::PatternCandidate;
use crate::telemetry::job::{record_status_change, start_job_span};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, warn};

/// Claim batch size for one pass.
pub const MAX_JOBS_PER_RUN: i64 = 10;

/// How far back the generation context looks.
const CONTEXT_WINDOW_DAYS: i64 = 14;

/// How many activity rows feed one generation context.
const CONTEXT_ROW_CAP: i64 = 50;

/// Freshness window stamped on generated cache entries.
const CACHE_VALIDITY_MINUTES: i64 = 30;

/// Counters for one full generator pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GenerateReport {
    /// Jobs this pass attempted (lost claims excluded).
    pub processed: usize,
    pub generated: usize,
    pub errors: usize,
}

enum JobOutcome {
    Generated,
    LostClaim,
    Failed,
}

/// The consumer worker. Claims due jobs and turns them into cache entries.
pub struct Generator {
    db: Arc<Db>,
    generator: Arc<dyn ContentGenerator>,
    clock: Arc<dyn Clock>,
}

impl Generator {
    pub fn new(db: Arc<Db>, generator: Arc<dyn ContentGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            generator,
            clock,
        }
    }

    /// Run one pass over the due jobs.
    pub async fn run_once(&self) -> Result<GenerateReport> {
        let started = std::time::Instant::now();
        metrics::worker_runs().add(1, &[KeyValue::new("worker", "generator")]);

        let now = self.clock.now();
        let due = self.db.due_jobs(now, MAX_JOBS_PER_RUN).await?;
        info!(due = due.len(), "generator pass started");

        let mut report = GenerateReport::default();
        for job in due {
            match self.process_job(&job).await {
                Ok(JobOutcome::Generated) => {
                    report.processed += 1;
                    report.generated += 1;
                }
                Ok(JobOutcome::Failed) => {
                    report.processed += 1;
                    report.errors += 1;
                }
                Ok(JobOutcome::LostClaim) => {}
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "job processing error");
                    report.processed += 1;
                    report.errors += 1;
                }
            }
        }

        metrics::run_duration_ms().record(
            started.elapsed().as_millis() as f64,
            &[KeyValue::new("worker", "generator")],
        );
        info!(?report, "generator pass complete");
        Ok(report)
    }

    /// Claim and process a single job inside its own span.
    async fn process_job(&self, job: &PredictionJob) -> Result<JobOutcome> {
        let span = start_job_span("generator", &job.id);
        async {
            if !self.db.begin_job(job.id, self.clock.now()).await? {
                // Another pass got there first.
                debug!(job_id = %job.id, "lost claim, skipping");
                return Ok(JobOutcome::LostClaim);
            }
            record_status_change(&span, "queued", "processing");

            match self.generate_for(job).await {
                Ok(cache_key) => {
                    self.db
                        .complete_job(job.id, &cache_key, self.clock.now())
                        .await?;
                    record_status_change(&span, "processing", "completed");
                    info!(job_id = %job.id, cache_key, "job completed");
                    Ok(JobOutcome::Generated)
                }
                Err(e) => {
                    let disposition = self
                        .db
                        .fail_job(job.id, &e.to_string(), self.clock.now())
                        .await?;
                    match disposition {
                        RetryDisposition::Requeued { attempts } => {
                            record_status_change(&span, "processing", "queued");
                            warn!(job_id = %job.id, attempts, error = %e, "job failed, requeued");
                        }
                        RetryDisposition::Abandoned { attempts } => {
                            record_status_change(&span, "processing", "failed");
                            error!(job_id = %job.id, attempts, error = %e, "job failed permanently");
                        }
                    }
                    Ok(JobOutcome::Failed)
                }
            }
        }
        .instrument(span.clone())
        .await
    }

    /// Generate content for a claimed job and upsert it into the cache.
    /// Returns the cache key the job's result landed under.
    async fn generate_for(&self, job: &PredictionJob) -> Result<String> {
        let candidate: PatternCandidate = serde_json::from_value(job.context_data.clone())?;

        let now = self.clock.now();
        let records = self
            .db
            .recent_activity(
                &job.user_id,
                now - chrono::Duration::days(CONTEXT_WINDOW_DAYS),
                CONTEXT_ROW_CAP,
            )
            .await?;
        let context = UserContext::from_records(&records);

        let components = match tokio::time::timeout(
            super::CAPABILITY_TIMEOUT,
            self.generator
                .generate(&job.user_id, &job.predicted_need, &candidate, &context),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(Error::Inference("generation timed out".to_string())),
        };
        let components =
            components.ok_or_else(|| Error::Inference("empty generation result".to_string()))?;

        let cache_key = fingerprint::cache_key(&job.user_id, candidate.cache_query());
        self.db
            .upsert_page(
                NewCacheEntry {
                    user_id: job.user_id.clone(),
                    cache_key,
                    query: candidate.cache_query().to_string(),
                    components,
                    relevance_score: candidate.confidence,
                    valid_until: now + chrono::Duration::minutes(CACHE_VALIDITY_MINUTES),
                },
                now,
            )
            .await
    }
}
