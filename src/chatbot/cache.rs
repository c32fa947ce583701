//! Bounded answer cache keyed by normalized message text.
//!
//! Eviction is insertion-order FIFO: re-inserting an existing key replaces
//! its value but keeps its original slot in the eviction queue.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

/// Default number of answers kept.
pub const CACHE_LIMIT: usize = 100;

/// Cache key for a message: trimmed and lowercased.
pub fn normalize_key(text: &str) -> String {
    text.trim().to_lowercase()
}

struct Inner {
    entries: HashMap<String, String>,
    order: VecDeque<String>,
}

pub struct ResponseCache {
    limit: usize,
    inner: Mutex<Inner>,
}

impl ResponseCache {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.get(key).cloned()
    }

    /// Insert or replace. Evicts the oldest-inserted entry once over the limit.
    pub fn put(&self, key: String, answer: String) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = inner.entries.get_mut(&key) {
            *existing = answer;
            return;
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(key, answer);
        if inner.entries.len() > self.limit
            && let Some(oldest) = inner.order.pop_front()
        {
            inner.entries.remove(&oldest);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.clear();
        inner.order.clear();
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(CACHE_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("  When Does It START?  "), "when does it start?");
    }

    #[test]
    fn test_get_put() {
        let cache = ResponseCache::default();
        assert_eq!(cache.get("day 1"), None);
        cache.put("day 1".into(), "Build bases".into());
        assert_eq!(cache.get("day 1").as_deref(), Some("Build bases"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_oldest_inserted() {
        let cache = ResponseCache::new(CACHE_LIMIT);
        for i in 0..=CACHE_LIMIT {
            cache.put(format!("q{i}"), format!("a{i}"));
        }
        assert_eq!(cache.len(), CACHE_LIMIT);
        assert_eq!(cache.get("q0"), None);
        for i in 1..=CACHE_LIMIT {
            assert_eq!(cache.get(&format!("q{i}")), Some(format!("a{i}")));
        }
    }

    #[test]
    fn test_reinsert_keeps_eviction_slot() {
        let cache = ResponseCache::new(2);
        cache.put("a".into(), "1".into());
        cache.put("b".into(), "2".into());
        // Updating "a" must not make it younger than "b"
        cache.put("a".into(), "1b".into());
        assert_eq!(cache.get("a").as_deref(), Some("1b"));
        assert_eq!(cache.len(), 2);

        cache.put("c".into(), "3".into());
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b").as_deref(), Some("2"));
        assert_eq!(cache.get("c").as_deref(), Some("3"));
    }

    #[test]
    fn test_get_does_not_refresh() {
        let cache = ResponseCache::new(2);
        cache.put("a".into(), "1".into());
        cache.put("b".into(), "2".into());
        cache.get("a");
        cache.put("c".into(), "3".into());
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_clear() {
        let cache = ResponseCache::new(3);
        cache.put("a".into(), "1".into());
        cache.clear();
        assert!(cache.is_empty());
        cache.put("b".into(), "2".into());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_usable_after_panic_while_locked() {
        let cache = ResponseCache::new(2);
        cache.put("a".into(), "1".into());

        std::thread::scope(|s| {
            let joined = s
                .spawn(|| {
                    let _guard = cache.inner.lock().unwrap();
                    panic!("panic while holding the cache lock");
                })
                .join();
            assert!(joined.is_err());
        });
        assert!(cache.inner.is_poisoned());

        assert_eq!(cache.get("a").as_deref(), Some("1"));
        cache.put("b".into(), "2".into());
        cache.put("c".into(), "3".into());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        cache.clear();
        assert!(cache.is_empty());
    }
}
