//! Page cache operations: upsert on (user, key) and windowed lookup.

use crate::error::Result;
use crate::model::cache::{CacheEntry, NewCacheEntry};
use crate::telemetry::metrics;
use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use uuid::Uuid;

impl super::Db {
    /// Insert or refresh the cache entry for (user, key).
    ///
    /// On conflict the row keeps its identity and original query text;
    /// content, score, and window are replaced wholesale. Returns the
    /// cache key the content is reachable under.
    pub async fn upsert_page(&self, new: NewCacheEntry, now: DateTime<Utc>) -> Result<String> {
        sqlx::query(
            "INSERT INTO page_cache (id, user_id, cache_key, cache_type, query, components, relevance_score, valid_until, created_at)
             VALUES ($1, $2, $3, 'prediction', $4, $5, $6, $7, $8)
             ON CONFLICT (user_id, cache_key) DO UPDATE SET
                 components = EXCLUDED.components,
                 relevance_score = EXCLUDED.relevance_score,
                 valid_until = EXCLUDED.valid_until,
                 created_at = EXCLUDED.created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&new.user_id)
        .bind(&new.cache_key)
        .bind(&new.query)
        .bind(&new.components)
        .bind(new.relevance_score)
        .bind(new.valid_until)
        .bind(now)
        .execute(&self.pool)
        .await?;

        metrics::cache_operations().add(1, &[KeyValue::new("operation", "upsert")]);
        Ok(new.cache_key)
    }

    /// Look up a live entry for (user, key). Entries at or past their
    /// valid_until are invisible, not deleted.
    pub async fn live_entry(
        &self,
        user_id: &str,
        cache_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CacheEntry>> {
        let row: Option<CacheRow> = sqlx::query_as(
            "SELECT id, user_id, cache_key, cache_type, query, components, relevance_score, valid_until, created_at
             FROM page_cache
             WHERE user_id = $1 AND cache_key = $2 AND valid_until > $3",
        )
        .bind(user_id)
        .bind(cache_key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        metrics::cache_operations().add(
            1,
            &[
                KeyValue::new("operation", "lookup"),
                KeyValue::new("hit", row.is_some()),
            ],
        );
        Ok(row.map(CacheEntry::from))
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct CacheRow {
    id: Uuid,
    user_id: String,
    cache_key: String,
    cache_type: String,
    query: String,
    components: serde_json::Value,
    relevance_score: f64,
    valid_until: chrono::DateTime<chrono::Utc>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<CacheRow> for CacheEntry {
    fn from(row: CacheRow) -> Self {
        CacheEntry {
            id: row.id,
            user_id: row.user_id,
            cache_key: row.cache_key,
            cache_type: row.cache_type,
            query: row.query,
            components: row.components,
            relevance_score: row.relevance_score,
            valid_until: row.valid_until,
            created_at: row.created_at,
        }
    }
}
