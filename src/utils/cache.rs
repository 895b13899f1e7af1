use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::debug;

use crate::data_structures::{FinancialSnapshot, IndexHistory, StockBundle};

pub const DEFAULT_TTL_SECS: u64 = 3600; // 1 hour

/// Which fetch operation produced a cached frame. Together with the symbol
/// this is the full cache key, so the same symbol can hold an index frame,
/// a stock frame, and a financials frame side by side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheOp {
    IndexHistory,
    StockBundle,
    Financials,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub op: CacheOp,
    pub symbol: String,
}

impl CacheKey {
    pub fn new(op: CacheOp, symbol: &str) -> Self {
        CacheKey { op, symbol: symbol.to_string() }
    }
}

#[derive(Clone, Debug)]
pub enum CachedFrame {
    Index(IndexHistory),
    Stock(StockBundle),
    Financials(FinancialSnapshot),
}

#[derive(Clone, Debug)]
struct CacheEntry {
    frame: CachedFrame,
    inserted_at: SystemTime,
}

/// In-memory TTL cache for dashboard frames. Owned by the application root
/// and injected into the fetch layer; holds only successful results. Callers
/// get clones, entries are never mutated in place.
pub struct FrameCache {
    ttl: Duration,
    entries: HashMap<CacheKey, CacheEntry>,
}

pub type SharedCache = Arc<Mutex<FrameCache>>;

impl FrameCache {
    pub fn new(ttl: Duration) -> Self {
        FrameCache { ttl, entries: HashMap::new() }
    }

    pub fn get(&self, key: &CacheKey, now: SystemTime) -> Option<CachedFrame> {
        if self.is_expired(key, now) {
            debug!(?key, "cache miss");
            return None;
        }
        debug!(?key, "cache hit");
        self.entries.get(key).map(|entry| entry.frame.clone())
    }

    pub fn put(&mut self, key: CacheKey, frame: CachedFrame, now: SystemTime) {
        debug!(?key, "caching frame");
        self.entries.insert(key, CacheEntry { frame, inserted_at: now });
    }

    /// Absent entries count as expired.
    pub fn is_expired(&self, key: &CacheKey, now: SystemTime) -> bool {
        match self.entries.get(key) {
            Some(entry) => {
                let age = now.duration_since(entry.inserted_at).unwrap_or_default();
                age >= self.ttl
            }
            None => true,
        }
    }

    /// Global invalidation: drops every entry, not just the selected symbol.
    pub fn invalidate_all(&mut self) {
        let removed = self.entries.len();
        self.entries.clear();
        debug!(removed, "cache invalidated");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::IndexHistory;

    fn index_frame(symbol: &str) -> CachedFrame {
        CachedFrame::Index(IndexHistory::empty(symbol))
    }

    fn cache_with_entry(ttl_secs: u64, now: SystemTime) -> (FrameCache, CacheKey) {
        let mut cache = FrameCache::new(Duration::from_secs(ttl_secs));
        let key = CacheKey::new(CacheOp::IndexHistory, "^GSPC");
        cache.put(key.clone(), index_frame("^GSPC"), now);
        (cache, key)
    }

    #[test]
    fn get_returns_entry_within_ttl() {
        let now = SystemTime::UNIX_EPOCH;
        let (cache, key) = cache_with_entry(3600, now);

        let later = now + Duration::from_secs(3599);
        assert!(cache.get(&key, later).is_some());
        assert!(!cache.is_expired(&key, later));
    }

    #[test]
    fn entry_expires_at_ttl() {
        let now = SystemTime::UNIX_EPOCH;
        let (cache, key) = cache_with_entry(3600, now);

        let later = now + Duration::from_secs(3600);
        assert!(cache.is_expired(&key, later));
        assert!(cache.get(&key, later).is_none());
    }

    #[test]
    fn absent_key_is_expired() {
        let cache = FrameCache::new(Duration::from_secs(3600));
        let key = CacheKey::new(CacheOp::Financials, "AAPL");
        assert!(cache.is_expired(&key, SystemTime::UNIX_EPOCH));
        assert!(cache.get(&key, SystemTime::UNIX_EPOCH).is_none());
    }

    #[test]
    fn invalidate_all_clears_every_key() {
        let now = SystemTime::UNIX_EPOCH;
        let mut cache = FrameCache::new(Duration::from_secs(3600));
        cache.put(CacheKey::new(CacheOp::IndexHistory, "^DJI"), index_frame("^DJI"), now);
        cache.put(CacheKey::new(CacheOp::IndexHistory, "^GSPC"), index_frame("^GSPC"), now);
        assert_eq!(cache.len(), 2);

        cache.invalidate_all();

        assert!(cache.is_empty());
        assert!(cache.get(&CacheKey::new(CacheOp::IndexHistory, "^DJI"), now).is_none());
    }

    #[test]
    fn same_symbol_distinct_operations_do_not_collide() {
        let now = SystemTime::UNIX_EPOCH;
        let mut cache = FrameCache::new(Duration::from_secs(3600));
        cache.put(CacheKey::new(CacheOp::IndexHistory, "AAPL"), index_frame("AAPL"), now);

        assert!(cache.get(&CacheKey::new(CacheOp::StockBundle, "AAPL"), now).is_none());
        assert!(cache.get(&CacheKey::new(CacheOp::IndexHistory, "AAPL"), now).is_some());
    }
}
