//! Process-local result cache with per-entry TTL.
//!
//! Entries are advisory: a missing or expired key is a miss, never an
//! error. Capacity is bounded; the least recently used entry is evicted
//! first.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;

    async fn set(&self, key: &str, value: Value, ttl: Duration);

    /// Store several entries under one lock acquisition.
    async fn set_many(&self, entries: Vec<(String, Value, Duration)>);

    /// Returns whether the key was present.
    async fn delete(&self, key: &str) -> bool;

    /// Remove every key matching `pattern`, where `*` matches any run of
    /// characters. Returns the number of removed entries.
    async fn invalidate_pattern(&self, pattern: &str) -> usize;

    async fn stats(&self) -> CacheStats;
}

struct Entry {
    value: Value,
    expires_at: Instant,
}

pub struct InMemoryCache {
    entries: Mutex<lru::LruCache<String, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryCache {
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(lru::LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let lookup = entries
            .get(key)
            .map(|entry| (entry.expires_at > now).then(|| entry.value.clone()));
        let value = match lookup {
            Some(Some(value)) => Some(value),
            Some(None) => {
                entries.pop(key);
                None
            }
            None => None,
        };

        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(key = %key, hit = value.is_some(), "Cache lookup");
        value
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries
            .lock()
            .await
            .put(key.to_string(), Entry { value, expires_at });
    }

    async fn set_many(&self, items: Vec<(String, Value, Duration)>) {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        for (key, value, ttl) in items {
            entries.put(
                key,
                Entry {
                    value,
                    expires_at: now + ttl,
                },
            );
        }
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries.lock().await.pop(key).is_some()
    }

    async fn invalidate_pattern(&self, pattern: &str) -> usize {
        let mut entries = self.entries.lock().await;
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        if !doomed.is_empty() {
            tracing::debug!(pattern = %pattern, removed = doomed.len(), "Cache entries invalidated");
        }
        doomed.len()
    }

    async fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().await;
        CacheStats {
            entries: entries.len(),
            capacity: entries.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// `*` matches any (possibly empty) run of characters; everything else is literal.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let (first, last) = (parts[0], parts[parts.len() - 1]);
    let Some(mut remaining) = text.strip_prefix(first) else {
        return false;
    };
    for part in &parts[1..parts.len() - 1] {
        match remaining.find(part) {
            Some(idx) => remaining = &remaining[idx + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn glob_matching() {
        assert!(glob_match("*:abc", "manifest:abc"));
        assert!(glob_match("manifest:*", "manifest:abc"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a*b*c", "aXbYc"));
        assert!(!glob_match("*:abc", "manifest:abcd"));
        assert!(!glob_match("manifest:abc", "manifest:ab"));
        assert!(!glob_match("ab*ba", "aba"));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryCache::new(10);
        cache.set("manifest:abc", json!({"status": "success"}), TTL).await;
        assert_eq!(
            cache.get("manifest:abc").await,
            Some(json!({"status": "success"}))
        );

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get("manifest:abc").await, None);

        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 0));
    }

    #[tokio::test]
    async fn evicts_least_recently_used() {
        let cache = InMemoryCache::new(2);
        cache.set("a", json!(1), TTL).await;
        cache.set("b", json!(2), TTL).await;
        cache.get("a").await;
        cache.set("c", json!(3), TTL).await;

        assert!(cache.get("b").await.is_none());
        assert!(cache.get("a").await.is_some());
        assert!(cache.get("c").await.is_some());
    }

    #[tokio::test]
    async fn invalidates_by_pattern() {
        let cache = InMemoryCache::new(10);
        cache
            .set_many(vec![
                ("manifest:abc".to_string(), json!(1), TTL),
                ("properties:abc".to_string(), json!(2), TTL),
                ("manifest:def".to_string(), json!(3), TTL),
            ])
            .await;

        assert_eq!(cache.invalidate_pattern("*:abc").await, 2);
        assert!(cache.get("properties:abc").await.is_none());
        assert!(cache.get("manifest:def").await.is_some());
        assert!(!cache.delete("manifest:abc").await);
        assert!(cache.delete("manifest:def").await);
    }
}
