//! Prediction job operations: enqueue, claim, and status transitions.
//!
//! Claiming is a two-step protocol: a SELECT finds due jobs, then a
//! conditional UPDATE per job decides the winner. Losing a claim is
//! normal under concurrency and is not an error. There is no lease or
//! reclaim; a worker that dies mid-job leaves the row in `processing`.

use crate::error::{Error, Result};
use crate::model::job::{JobStatus, MAX_ATTEMPTS, PredictionJob};
use crate::telemetry::metrics;
use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use uuid::Uuid;

/// Stored error messages are capped to this many characters.
const MAX_ERROR_CHARS: usize = 500;

const JOB_COLUMNS: &str = "id, user_id, job_type, priority, predicted_need, context_data, \
     scheduled_for, valid_until, status, attempts, result_cache_key, error_message, \
     created_at, started_at, completed_at";

/// Parameters for enqueuing a prediction job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub user_id: String,
    pub priority: i32,
    pub predicted_need: String,
    pub context_data: serde_json::Value,
    pub scheduled_for: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

/// What happened to a job whose attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    /// Returned to the queue for another attempt within its window.
    Requeued { attempts: i32 },
    /// No attempts left; the job is terminal.
    Abandoned { attempts: i32 },
}

/// Validate a status transition, returning an error if disallowed.
fn validate_transition(from: JobStatus, to: JobStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

fn truncate_error(error: &str) -> String {
    error.chars().take(MAX_ERROR_CHARS).collect()
}

impl super::Db {
    /// Insert a new job in `queued` status.
    ///
    /// Dedup against already-queued work happens in admission, before
    /// this is called.
    pub async fn enqueue_job(&self, new: NewJob, now: DateTime<Utc>) -> Result<PredictionJob> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO generation_queue (id, user_id, job_type, priority, predicted_need, context_data, scheduled_for, valid_until, status, attempts, created_at)
             VALUES ($1, $2, 'prediction', $3, $4, $5, $6, $7, 'queued', 0, $8)",
        )
        .bind(id)
        .bind(&new.user_id)
        .bind(new.priority)
        .bind(&new.predicted_need)
        .bind(&new.context_data)
        .bind(new.scheduled_for)
        .bind(new.valid_until)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_job(id).await
    }

    /// Whether a queued job for the same predicted need is still pending
    /// (scheduled in the future) for this user.
    pub async fn queued_need_exists(
        &self,
        user_id: &str,
        predicted_need: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM generation_queue
             WHERE user_id = $1 AND predicted_need = $2
               AND status = 'queued' AND scheduled_for > $3
             LIMIT 1",
        )
        .bind(user_id)
        .bind(predicted_need)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Jobs eligible for processing at `now`: queued, due, unexpired, and
    /// with attempts remaining. Highest priority first, earliest schedule
    /// breaking ties.
    pub async fn due_jobs(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<PredictionJob>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM generation_queue
             WHERE status = 'queued' AND scheduled_for <= $1 AND valid_until > $1
               AND attempts < $2
             ORDER BY priority DESC, scheduled_for ASC
             LIMIT $3",
        ))
        .bind(now)
        .bind(MAX_ATTEMPTS)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(JobRow::try_into_job).collect()
    }

    /// Claim a job: queued -> processing, conditional on current status.
    ///
    /// Returns false when the guard matched no row, meaning another
    /// worker won the claim (or the job moved on). The caller skips it.
    pub async fn begin_job(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        validate_transition(JobStatus::Queued, JobStatus::Processing)?;

        let rows_affected = sqlx::query(
            "UPDATE generation_queue SET status = 'processing', started_at = $2
             WHERE id = $1 AND status = 'queued'",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Ok(false);
        }

        metrics::queue_transitions().add(
            1,
            &[
                KeyValue::new("from", "queued"),
                KeyValue::new("to", "processing"),
            ],
        );
        Ok(true)
    }

    /// Complete a job: processing -> completed, recording the cache key
    /// its output landed under.
    pub async fn complete_job(
        &self,
        id: Uuid,
        result_cache_key: &str,
        now: DateTime<Utc>,
    ) -> Result<PredictionJob> {
        validate_transition(JobStatus::Processing, JobStatus::Completed)?;

        let rows_affected = sqlx::query(
            "UPDATE generation_queue SET status = 'completed', result_cache_key = $2, completed_at = $3
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(result_cache_key)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(Error::InvalidTransition {
                from: JobStatus::Processing.to_string(),
                to: JobStatus::Completed.to_string(),
            });
        }

        metrics::queue_transitions().add(
            1,
            &[
                KeyValue::new("from", "processing"),
                KeyValue::new("to", "completed"),
            ],
        );

        self.get_job(id).await
    }

    /// Record a failed attempt. Requeues the job while attempts remain,
    /// otherwise marks it failed with the (truncated) error message.
    ///
    /// Only the claim holder calls this while the job is processing, so
    /// reading attempts before the conditional update is race-free.
    pub async fn fail_job(
        &self,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<RetryDisposition> {
        let job = self.get_job(id).await?;
        let attempts = job.attempts + 1;

        let (disposition, to) = if attempts >= MAX_ATTEMPTS {
            (RetryDisposition::Abandoned { attempts }, JobStatus::Failed)
        } else {
            (RetryDisposition::Requeued { attempts }, JobStatus::Queued)
        };
        validate_transition(JobStatus::Processing, to)?;

        let rows_affected = match disposition {
            RetryDisposition::Abandoned { .. } => {
                sqlx::query(
                    "UPDATE generation_queue SET status = 'failed', attempts = $2, error_message = $3, completed_at = $4
                     WHERE id = $1 AND status = 'processing'",
                )
                .bind(id)
                .bind(attempts)
                .bind(truncate_error(error))
                .bind(now)
                .execute(&self.pool)
                .await?
                .rows_affected()
            }
            // Scheduling window stays as admitted; a retry does not earn
            // more time.
            RetryDisposition::Requeued { .. } => {
                sqlx::query(
                    "UPDATE generation_queue SET status = 'queued', attempts = $2
                     WHERE id = $1 AND status = 'processing'",
                )
                .bind(id)
                .bind(attempts)
                .execute(&self.pool)
                .await?
                .rows_affected()
            }
        };

        if rows_affected == 0 {
            return Err(Error::InvalidTransition {
                from: JobStatus::Processing.to_string(),
                to: to.to_string(),
            });
        }

        metrics::queue_transitions().add(
            1,
            &[
                KeyValue::new("from", "processing"),
                KeyValue::new("to", to.to_string()),
            ],
        );

        Ok(disposition)
    }

    /// Get a job by ID.
    pub async fn get_job(&self, id: Uuid) -> Result<PredictionJob> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM generation_queue WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or_else(|| Error::NotFound(format!("job {id}")))?
            .try_into_job()
    }

    /// List jobs, newest first, optionally filtered by status and user.
    pub async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        user_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<PredictionJob>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM generation_queue
             WHERE ($1::text IS NULL OR status = $1)
               AND ($2::text IS NULL OR user_id = $2)
             ORDER BY created_at DESC
             LIMIT $3",
        ))
        .bind(status.map(|s| s.to_string()))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(JobRow::try_into_job).collect()
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    user_id: String,
    job_type: String,
    priority: i32,
    predicted_need: String,
    context_data: serde_json::Value,
    scheduled_for: chrono::DateTime<chrono::Utc>,
    valid_until: chrono::DateTime<chrono::Utc>,
    status: String,
    attempts: i32,
    result_cache_key: Option<String>,
    error_message: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl JobRow {
    fn try_into_job(self) -> Result<PredictionJob> {
        Ok(PredictionJob {
            id: self.id,
            user_id: self.user_id,
            job_type: self.job_type,
            priority: self.priority,
            predicted_need: self.predicted_need,
            context_data: self.context_data,
            scheduled_for: self.scheduled_for,
            valid_until: self.valid_until,
            status: self.status.parse()?,
            attempts: self.attempts,
            result_cache_key: self.result_cache_key,
            error_message: self.error_message,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_truncate_by_characters_not_bytes() {
        let long = "x".repeat(700);
        assert_eq!(truncate_error(&long).len(), MAX_ERROR_CHARS);

        let multibyte = "é".repeat(700);
        let truncated = truncate_error(&multibyte);
        assert_eq!(truncated.chars().count(), MAX_ERROR_CHARS);
        assert!(truncated.is_char_boundary(truncated.len()));
    }

    #[test]
    fn short_errors_pass_through() {
        assert_eq!(truncate_error("boom"), "boom");
    }

    #[test]
    fn transition_guard_rejects_terminal_exits() {
        assert!(validate_transition(JobStatus::Queued, JobStatus::Processing).is_ok());
        assert!(validate_transition(JobStatus::Processing, JobStatus::Queued).is_ok());
        assert!(validate_transition(JobStatus::Completed, JobStatus::Queued).is_err());
        assert!(validate_transition(JobStatus::Queued, JobStatus::Completed).is_err());
    }
}
