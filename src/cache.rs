//! In-process response cache for chat replies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Cache key for a user message: lower-case hex MD5 of its UTF-8 bytes.
pub fn cache_key(message: &str) -> String {
    format!("{:x}", md5::compute(message.as_bytes()))
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// TTL cache shared across request handlers.
#[derive(Clone, Debug)]
pub struct ResponseCache {
    ttl: Duration,
    enabled: bool,
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            enabled: true,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// A cache that never stores anything; every lookup misses.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(Duration::ZERO)
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }

        let mut entries = self.entries.lock().expect("cache lock poisoned");
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        if !self.enabled {
            return;
        }

        let entry = Entry {
            value: value.into(),
            expires_at: Instant::now() + self.ttl,
        };
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .insert(key.into(), entry);
    }

    /// Drop expired entries.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_md5_hex() {
        assert_eq!(cache_key(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(cache_key("hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn returns_stored_value_before_expiry() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.insert("k", "v");
        assert_eq!(cache.get("k"), Some("v".to_string()));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn expired_entries_miss_and_are_evicted() {
        let cache = ResponseCache::new(Duration::ZERO);
        cache.insert("k", "v");
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_removes_only_expired_entries() {
        let cache = ResponseCache::new(Duration::ZERO);
        cache.insert("old", "v");
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn disabled_cache_never_stores() {
        let cache = ResponseCache::disabled();
        cache.insert("k", "v");
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
    }
}
