//! Generation queue job types.
//!
//! A job is one unit of speculative work: generate content for a predicted
//! need before the user asks. Jobs live in the `generation_queue` table and
//! move through a small status machine; the queue claims them in priority
//! order once their scheduling window opens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing attempts allowed before a job is abandoned.
pub const MAX_ATTEMPTS: i32 = 3;

/// A unit of speculative generation work tracked in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionJob {
    /// Unique identifier, assigned at admission, immutable.
    pub id: Uuid,

    /// User the prediction is for.
    pub user_id: String,

    /// Job family. Always "prediction" in this pipeline.
    pub job_type: String,

    /// Higher is claimed first. Derived from prediction confidence.
    pub priority: i32,

    /// The predicted action. Also the queue-level dedup target: at most one
    /// queued forecast per (user, predicted_need).
    pub predicted_need: String,

    /// The full pattern candidate, stored verbatim at admission and passed
    /// unexamined to the generator.
    pub context_data: serde_json::Value,

    /// Not claimable before this instant.
    pub scheduled_for: DateTime<Utc>,

    /// Not claimable at or after this instant, even if never attempted.
    pub valid_until: DateTime<Utc>,

    pub status: JobStatus,

    /// Processing attempts so far. Incremented when an attempt fails, not
    /// when the job is claimed.
    pub attempts: i32,

    /// Fingerprint of the cache entry holding the result. Set on completion.
    pub result_cache_key: Option<String>,

    /// Last failure reason, truncated for storage.
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Lifecycle status of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its window. Claimable once scheduled_for passes, as long
    /// as valid_until has not and attempts remain.
    Queued,
    /// Claimed by a run. There is no lease: a run that dies here leaves the
    /// job parked in processing permanently.
    Processing,
    /// Done; result_cache_key points at the cache entry. Terminal.
    Completed,
    /// Attempts exhausted. Terminal.
    Failed,
}

impl JobStatus {
    /// Can a job move from self to `to`?
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Queued, Processing)
                | (Processing, Completed)
                | (Processing, Queued) // retry, window unchanged
                | (Processing, Failed) // attempts exhausted
        )
    }

    /// Is this a terminal status?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(crate::error::Error::Other(format!(
                "unknown job status: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_the_machine() {
        use JobStatus::*;
        assert!(Queued.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Queued));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Queued.can_transition_to(Completed));
        assert!(!Queued.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Queued));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Queued));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Processing.can_transition_to(Processing));
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn display_and_parse_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            let parsed: JobStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("stalled".parse::<JobStatus>().is_err());
    }
}
