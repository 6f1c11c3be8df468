//! Page cache entry types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A pre-generated content entry, retrieved from the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: Uuid,
    pub user_id: String,
    /// Fingerprint of (user, normalized query). See [`crate::fingerprint`].
    pub cache_key: String,
    pub cache_type: String,
    /// The query the slot was first written for. Not rewritten on upsert.
    pub query: String,
    /// Opaque generated content.
    pub components: serde_json::Value,
    pub relevance_score: f64,
    /// Entries past this instant are invisible to lookups.
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for writing a generated result into its slot.
#[derive(Debug, Clone)]
pub struct NewCacheEntry {
    pub user_id: String,
    pub cache_key: String,
    pub query: String,
    pub components: serde_json::Value,
    pub relevance_score: f64,
    pub valid_until: DateTime<Utc>,
}
