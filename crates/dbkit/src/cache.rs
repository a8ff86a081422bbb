//! Query-result cache.
//!
//! A select built with [`Model::cache`](crate::Model::cache) is looked up here before it
//! reaches the driver. Entries are keyed by the option's name, or by the statement text and
//! arguments when unnamed.

use crate::row::ResultSet;
use crate::value::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Storage for cached result sets.
pub trait ResultCache: Send + Sync {
    fn get(&self, key: &str) -> Option<ResultSet>;

    /// Store `rows`. `ttl` of `None` keeps the entry until removed.
    fn set(&self, key: &str, rows: ResultSet, ttl: Option<Duration>);

    fn remove(&self, key: &str);
}

/// Entries kept by [`MemoryResultCache::new`].
pub const DEFAULT_CAPACITY: usize = 1024;

/// In-process [`ResultCache`] with per-entry expiry and a capacity.
///
/// Expired entries are purged on every `set`. Past the capacity the least recently used
/// entry is evicted.
#[derive(Debug)]
pub struct MemoryResultCache {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug)]
struct MemoryInner {
    capacity: usize,
    map: HashMap<String, (ResultSet, Option<Instant>)>,
    order: VecDeque<String>,
}

impl Default for MemoryResultCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl MemoryResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache holding at most `capacity` entries. `0` stores nothing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                capacity,
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultCache for MemoryResultCache {
    fn get(&self, key: &str) -> Option<ResultSet> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match inner.map.get(key) {
            Some((_, Some(expires))) if *expires <= Instant::now() => {
                inner.remove(key);
                None
            }
            Some((rows, _)) => {
                let rows = rows.clone();
                inner.touch(key);
                Some(rows)
            }
            None => None,
        }
    }

    fn set(&self, key: &str, rows: ResultSet, ttl: Option<Duration>) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.purge_expired(now);
        if inner
            .map
            .insert(key.to_string(), (rows, ttl.map(|ttl| now + ttl)))
            .is_some()
        {
            inner.touch(key);
        } else {
            inner.order.push_back(key.to_string());
        }
        inner.evict_if_needed();
    }

    fn remove(&self, key: &str) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

impl MemoryInner {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key)
            && let Some(k) = self.order.remove(pos)
        {
            self.order.push_back(k);
        }
    }

    fn remove(&mut self, key: &str) {
        if self.map.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }

    fn purge_expired(&mut self, now: Instant) {
        let before = self.map.len();
        self.map
            .retain(|_, (_, expires)| expires.is_none_or(|expires| expires > now));
        if self.map.len() != before {
            let map = &self.map;
            self.order.retain(|k| map.contains_key(k));
            tracing::trace!(
                target: "dbkit.cache",
                purged = before - self.map.len(),
                "expired results purged"
            );
        }
    }

    fn evict_if_needed(&mut self) {
        while self.map.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.map.remove(&oldest);
        }
    }
}

/// Caching instructions for one select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOption {
    /// Entry lifetime; `None` never expires.
    pub ttl: Option<Duration>,
    /// Explicit cache key. Needed to clear the entry later.
    pub name: Option<String>,
    /// Remove the entry instead of reading or writing it.
    pub clear: bool,
}

impl CacheOption {
    /// Cache for `ttl`. A zero duration never expires.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: (!ttl.is_zero()).then_some(ttl),
            name: None,
            clear: false,
        }
    }

    /// Set an explicit cache key.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Remove the entry called `name`; the query itself runs uncached.
    pub fn clear(name: impl Into<String>) -> Self {
        Self {
            ttl: None,
            name: Some(name.into()),
            clear: true,
        }
    }

    /// The key for `sql` executed with `args`.
    pub fn key(&self, sql: &str, args: &[Value]) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let mut key = String::with_capacity(sql.len() + args.len() * 8);
        key.push_str("dbkit:");
        key.push_str(sql);
        for arg in args {
            let _ = write!(key, "|{arg:?}");
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::ColumnMeta;

    fn rows() -> ResultSet {
        ResultSet::new([ColumnMeta::new("id", "int8")])
            .with_row(vec![Value::Int(1)])
            .unwrap()
    }

    #[test]
    fn test_set_get_remove() {
        let cache = MemoryResultCache::new();
        cache.set("k", rows(), None);
        assert_eq!(cache.get("k"), Some(rows()));

        cache.remove("k");
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = MemoryResultCache::new();
        cache.set("k", rows(), Some(Duration::ZERO));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_set_purges_expired_entries() {
        let cache = MemoryResultCache::new();
        for i in 0..1000 {
            cache.set(&format!("k{i}"), rows(), Some(Duration::ZERO));
        }
        // each set purges everything stored before it
        assert_eq!(cache.len(), 1);

        cache.set("kept", rows(), None);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("kept").is_some());
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let cache = MemoryResultCache::with_capacity(2);
        cache.set("a", rows(), None);
        cache.set("b", rows(), None);
        assert!(cache.get("a").is_some());

        cache.set("c", rows(), None);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());

        // overwriting a key does not grow the cache
        cache.set("c", rows(), Some(Duration::from_secs(60)));
        assert_eq!(cache.len(), 2);

        let disabled = MemoryResultCache::with_capacity(0);
        disabled.set("a", rows(), None);
        assert!(disabled.is_empty());
    }

    #[test]
    fn test_option_keys() {
        let sql = "SELECT * FROM user WHERE id=?";
        let unnamed = CacheOption::new(Duration::from_secs(60));
        assert_eq!(unnamed.key(sql, &[Value::Int(1)]), unnamed.key(sql, &[Value::Int(1)]));
        assert_ne!(unnamed.key(sql, &[Value::Int(1)]), unnamed.key(sql, &[Value::Int(2)]));

        let named = CacheOption::new(Duration::from_secs(60)).named("users");
        assert_eq!(named.key(sql, &[Value::Int(1)]), "users");

        let clear = CacheOption::clear("users");
        assert!(clear.clear);
        assert_eq!(clear.key(sql, &[]), "users");
        assert_eq!(CacheOption::new(Duration::ZERO).ttl, None);
    }
}
