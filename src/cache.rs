//! Best-effort in-process TTL cache with an injected clock.
//!
//! Replaces ad-hoc global caches: callers must tolerate the cache being
//! empty at any time, and tests drive expiry deterministically through the
//! `Clock` trait instead of sleeping.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use chrono::Utc;

/// Time source for cache expiry. Production uses `SystemClock`; tests use a
/// manual clock to step time forward.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, (V, i64)>>,
    ttl_ms: i64,
    clock: Arc<dyn Clock>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl_ms: i64) -> Self {
        Self::with_clock(ttl_ms, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl_ms: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl_ms,
            clock,
        }
    }

    /// Fetch a live entry. Expired entries are evicted on read.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let now = self.clock.now_ms();
        match entries.get(key) {
            Some((_, expires)) if *expires <= now => {
                entries.remove(key);
                None
            }
            Some((value, _)) => Some(value.clone()),
            None => None,
        }
    }

    pub fn set(&self, key: K, value: V) {
        let expires = self.clock.now_ms() + self.ttl_ms;
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .insert(key, (value, expires));
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.lock().expect("cache lock poisoned").remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().expect("cache lock poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct ManualClock(AtomicI64);

    impl ManualClock {
        fn advance(&self, ms: i64) {
            self.0.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn get_set_invalidate() {
        let cache: TtlCache<String, i32> = TtlCache::new(60_000);
        assert_eq!(cache.get(&"a".to_string()), None);

        cache.set("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        cache.invalidate(&"a".to_string());
        assert_eq!(cache.get(&"a".to_string()), None);
    }

    #[test]
    fn entries_expire_with_the_clock() {
        let clock = Arc::new(ManualClock(AtomicI64::new(0)));
        let cache: TtlCache<String, i32> = TtlCache::with_clock(1_000, clock.clone());

        cache.set("a".to_string(), 1);
        clock.advance(999);
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        clock.advance(1);
        assert_eq!(cache.get(&"a".to_string()), None);
    }

    #[test]
    fn overwrite_refreshes_expiry() {
        let clock = Arc::new(ManualClock(AtomicI64::new(0)));
        let cache: TtlCache<String, i32> = TtlCache::with_clock(1_000, clock.clone());

        cache.set("a".to_string(), 1);
        clock.advance(900);
        cache.set("a".to_string(), 2);
        clock.advance(900);
        assert_eq!(cache.get(&"a".to_string()), Some(2));
    }
}
