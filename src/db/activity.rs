//! Activity log reads. This service never writes activity; the capture
//! path lives upstream.

use crate::error::Result;
use crate::model::activity::ActivityRecord;
use chrono::{DateTime, Utc};

impl super::Db {
    /// Distinct users with any activity since the cutoff.
    pub async fn active_users(&self, since: DateTime<Utc>) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT user_id FROM activity_log WHERE occurred_at >= $1",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(user_id,)| user_id).collect())
    }

    /// Users active since the cutoff, most recently active first.
    pub async fn recently_active_users(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT user_id FROM activity_log
             WHERE occurred_at >= $1
             GROUP BY user_id
             ORDER BY MAX(occurred_at) DESC
             LIMIT $2",
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(user_id,)| user_id).collect())
    }

    /// A user's activity since the cutoff, newest first, capped at `limit`.
    pub async fn recent_activity(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ActivityRecord>> {
        let rows: Vec<ActivityRow> = sqlx::query_as(
            "SELECT action_type, query, time_of_day, day_of_week, occurred_at
             FROM activity_log
             WHERE user_id = $1 AND occurred_at >= $2
             ORDER BY occurred_at DESC
             LIMIT $3",
        )
        .bind(user_id)
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ActivityRecord::from).collect())
    }
}

#[derive(sqlx::FromRow)]
struct ActivityRow {
    action_type: String,
    query: Option<String>,
    time_of_day: Option<String>,
    day_of_week: Option<String>,
    occurred_at: chrono::DateTime<chrono::Utc>,
}

impl From<ActivityRow> for ActivityRecord {
    fn from(row: ActivityRow) -> Self {
        ActivityRecord {
            action_type: row.action_type,
            query: row.query,
            time_of_day: row.time_of_day,
            day_of_week: row.day_of_week,
            occurred_at: row.occurred_at,
        }
    }
}
