//! Cache of decoded posting lists.
//!
//! Small lists are kept until the reader is reset. Large lists (more than
//! `large_threshold` intervals) are stamped with a monotone clock on every
//! use; once their decoded size exceeds `max_cache_memory`, the least
//! recently used ones are dropped. Counts of dropped lists are remembered
//! so that `count()` never has to touch the postings file twice.

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashMap;
use tracing::debug;

use crate::index::config::ReaderConfig;
use crate::posting::PostingArrays;
use crate::types::Feature;

#[derive(Debug)]
struct CachedList {
    arrays: Arc<PostingArrays>,
    /// Last-use stamp; `None` for small lists.
    stamp: Option<u64>,
}

#[derive(Debug)]
pub struct PostingCache {
    large_threshold: usize,
    max_memory: usize,
    entries: AHashMap<Feature, CachedList>,
    counts: AHashMap<Feature, u64>,
    lru: BTreeMap<u64, Feature>,
    clock: u64,
    large_memory: usize,
}

impl PostingCache {
    pub fn new(config: &ReaderConfig) -> Self {
        PostingCache {
            large_threshold: config.large_threshold,
            max_memory: config.max_cache_memory,
            entries: AHashMap::new(),
            counts: AHashMap::new(),
            lru: BTreeMap::new(),
            clock: 0,
            large_memory: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Look up a cached list, refreshing its recency if it is large.
    pub fn get(&mut self, feature: Feature) -> Option<Arc<PostingArrays>> {
        let stamp = self.entries.get(&feature)?.stamp;
        if let Some(old) = stamp {
            let new = self.tick();
            self.lru.remove(&old);
            self.lru.insert(new, feature);
            if let Some(entry) = self.entries.get_mut(&feature) {
                entry.stamp = Some(new);
            }
        }
        self.entries.get(&feature).map(|entry| entry.arrays.clone())
    }

    /// Cache a freshly decoded list, evicting old large lists if needed.
    pub fn insert(&mut self, feature: Feature, arrays: Arc<PostingArrays>) {
        if let Some(previous) = self.entries.remove(&feature) {
            self.forget(&previous);
        }

        let stamp = if arrays.len() > self.large_threshold {
            let stamp = self.tick();
            self.lru.insert(stamp, feature);
            self.large_memory += arrays.memory_size();
            Some(stamp)
        } else {
            None
        };
        self.entries.insert(feature, CachedList { arrays, stamp });

        while self.large_memory > self.max_memory {
            let Some((&oldest, &victim)) = self.lru.first_key_value() else {
                break;
            };
            if victim == feature {
                break;
            }
            self.lru.remove(&oldest);
            if let Some(evicted) = self.entries.remove(&victim) {
                self.large_memory -= evicted.arrays.memory_size();
                self.counts.insert(victim, evicted.arrays.len() as u64);
                debug!(
                    feature = victim,
                    intervals = evicted.arrays.len(),
                    large_memory = self.large_memory,
                    "evicted posting list"
                );
            }
        }
    }

    fn forget(&mut self, entry: &CachedList) {
        if let Some(stamp) = entry.stamp {
            self.lru.remove(&stamp);
            self.large_memory -= entry.arrays.memory_size();
        }
    }

    /// Interval count of a feature, if known without I/O.
    pub fn count(&self, feature: Feature) -> Option<u64> {
        self.counts
            .get(&feature)
            .copied()
            .or_else(|| self.entries.get(&feature).map(|e| e.arrays.len() as u64))
    }

    /// Remember a count read from a block header.
    pub fn record_count(&mut self, feature: Feature, count: u64) {
        self.counts.insert(feature, count);
    }

    /// Whether a list is currently held.
    pub fn contains(&self, feature: Feature) -> bool {
        self.entries.contains_key(&feature)
    }

    /// Number of lists held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decoded bytes held by large lists.
    pub fn large_memory(&self) -> usize {
        self.large_memory
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.counts.clear();
        self.lru.clear();
        self.large_memory = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrays(n: usize) -> Arc<PostingArrays> {
        Arc::new(PostingArrays::new((0..n as i64).collect(), None, None))
    }

    fn cache(large_threshold: usize, max_cache_memory: usize) -> PostingCache {
        PostingCache::new(&ReaderConfig {
            large_threshold,
            max_cache_memory,
        })
    }

    #[test]
    fn test_small_lists_never_evicted() {
        let mut cache = cache(4, 0);
        for feature in 0..100 {
            cache.insert(feature, arrays(4));
        }
        assert_eq!(cache.len(), 100);
        assert_eq!(cache.large_memory(), 0);
        assert_eq!(cache.count(42), Some(4));
    }

    #[test]
    fn test_least_recently_used_large_list_goes_first() {
        // Each large list of 10 addresses costs 80 bytes; room for two.
        let mut cache = cache(4, 160);
        cache.insert(1, arrays(10));
        cache.insert(2, arrays(10));
        assert!(cache.get(1).is_some());
        cache.insert(3, arrays(10));

        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert!(cache.contains(3));
        assert_eq!(cache.large_memory(), 160);
        // Evicted lists keep their counts.
        assert_eq!(cache.count(2), Some(10));
    }

    #[test]
    fn test_oversized_list_is_kept_alone() {
        let mut cache = cache(4, 100);
        cache.insert(1, arrays(10));
        cache.insert(2, arrays(50));
        assert!(!cache.contains(1));
        assert!(cache.contains(2));
        assert_eq!(cache.large_memory(), 400);
    }

    #[test]
    fn test_reinsert_does_not_double_count() {
        let mut cache = cache(4, 1000);
        cache.insert(1, arrays(10));
        cache.insert(1, arrays(10));
        assert_eq!(cache.large_memory(), 80);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut cache = cache(4, 1000);
        cache.insert(1, arrays(10));
        cache.record_count(7, 3);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.count(7), None);
        assert_eq!(cache.large_memory(), 0);
    }
}
