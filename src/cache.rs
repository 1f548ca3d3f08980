//! Reader result cache.
//!
//! One entry per query text, replaced wholesale on every successful read
//! (last write wins). Entries are never evicted; staleness only decides
//! whether a hit also schedules a refresh.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::Clock;
use crate::lock;
use crate::provider::ResultSet;

/// Last known result for a query text.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub query: String,
    pub result: Arc<ResultSet>,
    /// Unix milliseconds at which `result` was stored.
    pub last_updated: i64,
}

impl CacheEntry {
    /// Age of the entry at `now_millis`, clamped at zero.
    pub fn age_at(&self, now_millis: i64) -> Duration {
        let age = now_millis.saturating_sub(self.last_updated).max(0);
        Duration::from_millis(age as u64)
    }
}

/// Map from query text to its latest result.
pub struct ReaderCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl ReaderCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Exact-match lookup.
    pub fn get(&self, query: &str) -> Option<CacheEntry> {
        lock(&self.entries).get(query).cloned()
    }

    /// Insert or replace the entry for `query`, stamped with the current time.
    pub fn put(&self, query: &str, result: Arc<ResultSet>) {
        let entry = CacheEntry {
            query: query.to_string(),
            result,
            last_updated: self.clock.now_millis(),
        };
        lock(&self.entries).insert(entry.query.clone(), entry);
    }

    /// True when the entry is strictly older than `window`.
    pub fn is_stale(&self, entry: &CacheEntry, window: Duration) -> bool {
        Self::is_stale_at(entry, window, self.clock.now_millis())
    }

    pub fn is_stale_at(entry: &CacheEntry, window: Duration, now_millis: i64) -> bool {
        entry.age_at(now_millis) > window
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::provider::Value;

    fn result(n: i64) -> Arc<ResultSet> {
        Arc::new(ResultSet::new(vec!["n".into()], vec![vec![Value::Integer(n)]]))
    }

    #[test]
    fn test_get_miss_then_hit() {
        let cache = ReaderCache::new(Arc::new(ManualClock::new(0)));
        assert!(cache.get("SELECT 1").is_none());

        cache.put("SELECT 1", result(1));
        let entry = cache.get("SELECT 1").unwrap();
        assert_eq!(entry.query, "SELECT 1");
        assert_eq!(*entry.result, *result(1));

        // Exact text match only.
        assert!(cache.get("select 1").is_none());
        assert!(cache.get("SELECT 1 ").is_none());
    }

    #[test]
    fn test_freshness_boundary_is_exclusive() {
        let clock = ManualClock::new(10_000);
        let cache = ReaderCache::new(Arc::new(clock.clone()));
        let window = Duration::from_millis(60_000);

        cache.put("SELECT 1", result(1));
        let entry = cache.get("SELECT 1").unwrap();

        clock.set(10_000 + 60_000);
        assert!(!cache.is_stale(&entry, window), "age == window is fresh");

        clock.set(10_000 + 60_001);
        assert!(cache.is_stale(&entry, window), "age > window is stale");
    }

    #[test]
    fn test_put_replaces_and_restamps() {
        let clock = ManualClock::new(0);
        let cache = ReaderCache::new(Arc::new(clock.clone()));

        cache.put("q", result(1));
        clock.advance(Duration::from_secs(90));
        cache.put("q", result(2));

        let entry = cache.get("q").unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(*entry.result, *result(2));
        assert_eq!(entry.last_updated, 90_000);
    }

    #[test]
    fn test_last_write_wins() {
        let cache = ReaderCache::new(Arc::new(ManualClock::new(0)));
        // Completion order decides, not request order.
        cache.put("q", result(2));
        cache.put("q", result(1));
        assert_eq!(*cache.get("q").unwrap().result, *result(1));
    }

    #[test]
    fn test_clock_going_backwards_is_fresh() {
        let entry = CacheEntry {
            query: "q".into(),
            result: result(1),
            last_updated: 5_000,
        };
        assert!(!ReaderCache::is_stale_at(&entry, Duration::ZERO, 1_000));
        assert!(ReaderCache::is_stale_at(&entry, Duration::ZERO, 5_001));
    }
}
