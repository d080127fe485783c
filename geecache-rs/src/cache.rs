//! Provides a thread safe wrapper around an [LRUCache].
//!
//! Each [Group](crate::group::Group) owns exactly one **Cache**. The underlying LRU cache is only
//! allocated once the first value is stored, therefore groups which are never populated do not
//! occupy any memory.
use std::sync::Mutex;

use crate::byteview::ByteView;
use crate::lru::LRUCache;

/// Guards an [LRUCache] of [ByteView] values with a mutex.
///
/// The lock is only held while the underlying map is inspected or modified. No I/O happens while
/// it is held.
pub struct Cache {
    max_memory: usize,
    lru: Mutex<Option<LRUCache<ByteView>>>,
}

/// Provides a snapshot of the size and usage of a [Cache].
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct CacheStats {
    /// Contains the number of entries currently being stored.
    pub entries: usize,
    /// Contains the number of bytes allocated by keys and values.
    pub allocated_memory: usize,
    /// Contains the maximal number of bytes to allocate or 0 for an unbounded cache.
    pub max_memory: usize,
    /// Contains the number of lookups performed.
    pub reads: usize,
    /// Contains the number of lookups which found a value.
    pub hits: usize,
    /// Contains the number of values stored.
    pub writes: usize,
}

impl Cache {
    /// Creates a new cache which will be limited to **max_memory** bytes once allocated.
    pub fn new(max_memory: usize) -> Self {
        Cache {
            max_memory,
            lru: Mutex::new(None),
        }
    }

    /// Stores the given value for the given key.
    ///
    /// The underlying LRU cache is created on the first invocation.
    pub fn add(&self, key: &str, value: ByteView) {
        let mut lru = self.lru.lock().unwrap();
        lru.get_or_insert_with(|| LRUCache::new(self.max_memory))
            .put(key.to_owned(), value);
    }

    /// Returns the value stored for the given key (if present).
    pub fn get(&self, key: &str) -> Option<ByteView> {
        let mut lru = self.lru.lock().unwrap();
        lru.as_mut().and_then(|lru| lru.get(key).cloned())
    }

    /// Returns the memory limit of this cache.
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    /// Determines if the underlying LRU cache has already been allocated.
    pub fn is_allocated(&self) -> bool {
        self.lru.lock().unwrap().is_some()
    }

    /// Returns a snapshot of the current usage metrics.
    pub fn stats(&self) -> CacheStats {
        match self.lru.lock().unwrap().as_ref() {
            Some(lru) => CacheStats {
                entries: lru.len(),
                allocated_memory: lru.allocated_memory(),
                max_memory: self.max_memory,
                reads: lru.reads(),
                hits: lru.hits(),
                writes: lru.writes(),
            },
            None => CacheStats {
                max_memory: self.max_memory,
                ..CacheStats::default()
            },
        }
    }
}
