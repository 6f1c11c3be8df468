//! Ambient event storage and active-event reads.

use crate::error::Result;
use crate::model::event::{AmbientEvent, EventKind, EventPriority, NewAmbientEvent};
use chrono::{DateTime, Utc};
use uuid::Uuid;

impl super::Db {
    /// Store a detected event in `pending` status.
    pub async fn insert_event(&self, new: NewAmbientEvent, now: DateTime<Utc>) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO ambient_events (id, user_id, event_type, priority, title, subtitle, body, data, icon, color, starts_at, ends_at, valid_until, status, confidence_score, generation_source, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 'pending', $14, $15, $16)",
        )
        .bind(id)
        .bind(&new.user_id)
        .bind(new.event_type.as_str())
        .bind(new.priority.as_str())
        .bind(&new.title)
        .bind(&new.subtitle)
        .bind(&new.body)
        .bind(&new.data)
        .bind(&new.icon)
        .bind(&new.color)
        .bind(new.starts_at)
        .bind(new.ends_at)
        .bind(new.valid_until)
        .bind(new.confidence_score)
        .bind(&new.generation_source)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// A user's active, unexpired events, newest first.
    pub async fn active_events(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<AmbientEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT id, user_id, event_type, priority, title, subtitle, body, data, icon, color, starts_at, ends_at, valid_until, status, confidence_score, generation_source, created_at
             FROM ambient_events
             WHERE user_id = $1 AND status = 'active' AND valid_until > $2
             ORDER BY created_at DESC
             LIMIT $3",
        )
        .bind(user_id)
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AmbientEvent::from).collect())
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    user_id: String,
    event_type: String,
    priority: String,
    title: String,
    subtitle: Option<String>,
    body: Option<String>,
    data: serde_json::Value,
    icon: Option<String>,
    color: Option<String>,
    starts_at: Option<chrono::DateTime<chrono::Utc>>,
    ends_at: Option<chrono::DateTime<chrono::Utc>>,
    valid_until: chrono::DateTime<chrono::Utc>,
    status: String,
    confidence_score: f64,
    generation_source: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<EventRow> for AmbientEvent {
    fn from(row: EventRow) -> Self {
        AmbientEvent {
            id: row.id,
            user_id: row.user_id,
            event_type: EventKind::from_db(&row.event_type),
            priority: EventPriority::from_db(&row.priority),
            title: row.title,
            subtitle: row.subtitle,
            body: row.body,
            data: row.data,
            icon: row.icon,
            color: row.color,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            valid_until: row.valid_until,
            status: row.status,
            confidence_score: row.confidence_score,
            generation_source: row.generation_source,
            created_at: row.created_at,
        }
    }
}
