//! Cache-slot fingerprints.
//!
//! A fingerprint identifies the cache slot for a (user, query) pair. It must
//! be byte-for-byte identical wherever it is computed: the admission side
//! uses it to skip work whose result is already cached, and the generation
//! side uses it as the upsert key. Any divergence breaks deduplication
//! silently, so all callers go through [`cache_key`].

/// Fingerprint a (user, query) pair: lowercase and trim the query, hash
/// `"{user}:{query}"`, keep the first 16 hex characters of the digest.
pub fn cache_key(user_id: &str, query: &str) -> String {
    let normalized = query.trim().to_lowercase();
    let digest = blake3::hash(format!("{user_id}:{normalized}").as_bytes());
    let mut key = hex::encode(digest.as_bytes());
    key.truncate(16);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_input() {
        let a = cache_key("user-1", "movies tonight");
        let b = cache_key("user-1", "movies tonight");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        let base = cache_key("user-1", "movies tonight");
        assert_eq!(cache_key("user-1", "  Movies Tonight  "), base);
        assert_eq!(cache_key("user-1", "MOVIES TONIGHT"), base);
    }

    #[test]
    fn distinct_users_get_distinct_slots() {
        assert_ne!(
            cache_key("user-1", "movies tonight"),
            cache_key("user-2", "movies tonight")
        );
    }

    #[test]
    fn distinct_queries_get_distinct_slots() {
        assert_ne!(
            cache_key("user-1", "movies tonight"),
            cache_key("user-1", "weather tomorrow")
        );
    }

    #[test]
    fn hex_only() {
        let key = cache_key("user-1", "movies tonight");
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
