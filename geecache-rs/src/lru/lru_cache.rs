use linked_hash_map::LinkedHashMap;

/// Returns the allocated memory in bytes.
pub trait ByteSize {
    /// Returns the amount of memory in bytes which is accounted for a value.
    ///
    /// For byte buffers and strings this is the length of the payload. Fields allocated on the
    /// stack (length, capacity, pointers) are ignored.
    fn allocated_size(&self) -> usize;
}

impl ByteSize for String {
    fn allocated_size(&self) -> usize {
        self.len()
    }
}

impl ByteSize for Vec<u8> {
    fn allocated_size(&self) -> usize {
        self.len()
    }
}

/// Invoked with the key and value of each entry which is evicted from an [LRUCache].
pub type EvictionHandler<V> = Box<dyn FnMut(String, V) + Send>;

/// Provides a size constrained LRU cache.
///
/// A cache behaves just like a **Map** as long as there is no shortage in storage. However, if
/// the memory accounted for all keys and values grows above **max_memory**, old (least recently
/// used) entries will be evicted - hence the name LRU cache. The size of an entry is the length
/// of its key plus the [ByteSize] of its value.
///
/// A **max_memory** of 0 disables eviction completely and lets the cache grow without bounds.
///
/// Note that a cache isn't synchronized in any way. See [Cache](crate::cache::Cache) for a
/// thread safe wrapper.
///
/// # Examples
/// ```
/// # use geecache::lru::LRUCache;
/// // Specifies a cache which can hold up to 16 bytes of keys and values...
/// let mut lru = LRUCache::new(16);
///
/// lru.put("Foo".to_owned(), "Bar".to_owned());
/// assert_eq!(lru.get("Foo").unwrap(), &"Bar".to_owned());
///
/// // this will still fit (6 + 8 bytes)...
/// lru.put("Foo1".to_owned(), "XXXX".to_owned());
/// assert_eq!(lru.get("Foo").is_some(), true);
/// assert_eq!(lru.get("Foo1").is_some(), true);
///
/// // this will hit the max memory constraint...
/// lru.put("Foo2".to_owned(), "XXXX".to_owned());
/// // ..and therefore will throw the least recently used entry out:
/// assert_eq!(lru.get("Foo").is_some(), false);
/// assert_eq!(lru.get("Foo1").is_some(), true);
/// assert_eq!(lru.get("Foo2").is_some(), true);
///```
pub struct LRUCache<V: ByteSize> {
    allocated_memory: usize,
    max_memory: usize,
    reads: usize,
    hits: usize,
    writes: usize,
    map: LinkedHashMap<String, Entry<V>>,
    on_evicted: Option<EvictionHandler<V>>,
}

struct Entry<V: ByteSize> {
    mem_size: usize,
    value: V,
}

impl<V: ByteSize> LRUCache<V> {
    /// Creates a new cache which stores entries until they allocate **max_memory** bytes.
    ///
    /// Passing 0 as **max_memory** creates an unbounded cache.
    pub fn new(max_memory: usize) -> Self {
        LRUCache {
            allocated_memory: 0,
            max_memory,
            reads: 0,
            hits: 0,
            writes: 0,
            map: LinkedHashMap::new(),
            on_evicted: None,
        }
    }

    /// Creates a new cache which invokes the given handler for each evicted entry.
    ///
    /// The handler is invoked while the cache is being modified. When the cache is wrapped in a
    /// lock, the handler therefore runs while the lock is held and must neither block nor
    /// access the cache itself.
    ///
    /// # Examples
    /// ```
    /// # use geecache::lru::LRUCache;
    /// # use std::sync::{Arc, Mutex};
    /// let evicted = Arc::new(Mutex::new(Vec::new()));
    /// let log = evicted.clone();
    /// let mut lru = LRUCache::with_eviction_handler(
    ///     7,
    ///     Box::new(move |key, _value: String| log.lock().unwrap().push(key)),
    /// );
    ///
    /// lru.put("A".to_owned(), "123".to_owned());
    /// lru.put("B".to_owned(), "123".to_owned());
    ///
    /// assert_eq!(*evicted.lock().unwrap(), vec!["A".to_owned()]);
    /// ```
    pub fn with_eviction_handler(max_memory: usize, on_evicted: EvictionHandler<V>) -> Self {
        let mut lru = LRUCache::new(max_memory);
        lru.on_evicted = Some(on_evicted);
        lru
    }

    /// Stores the given value for the given key.
    ///
    /// If the key is already present, its value is replaced and the entry is marked as most
    /// recently used. Afterwards, least recently used entries are evicted until the cache fits
    /// into **max_memory** again. Note that an entry which is larger than the whole cache is
    /// therefore immediately evicted again.
    pub fn put(&mut self, key: String, value: V) {
        let entry = Entry {
            mem_size: key.len() + value.allocated_size(),
            value,
        };

        let mut delta_mem: isize = entry.mem_size as isize;

        // LinkedHashMap moves an existing key to the back (the most recently used position)...
        if let Some(stale_entry) = self.map.insert(key, entry) {
            delta_mem -= stale_entry.mem_size as isize;
        }

        self.writes += 1;
        self.allocated_memory = (self.allocated_memory as isize + delta_mem) as usize;

        self.enforce_constraints();
    }

    fn enforce_constraints(&mut self) {
        while self.max_memory > 0 && self.allocated_memory > self.max_memory {
            if !self.remove_oldest() {
                unreachable!("Failed to enforce constraints of a LRU cache!");
            }
        }
    }

    /// Returns the value which has previously been stored for the given key or **None** if
    /// no value is present.
    ///
    /// A hit marks the entry as most recently used.
    ///
    /// # Examples
    /// ```
    /// # use geecache::lru::LRUCache;
    /// let mut lru = LRUCache::new(1024);
    ///
    /// // After inserting a value...
    /// lru.put("Foo".to_owned(), "Bar".to_owned());
    /// // ..it can be retrieved.
    /// assert_eq!(lru.get("Foo").unwrap(), &"Bar".to_owned());
    /// assert_eq!(lru.get("Unknown"), None);
    ///```
    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.reads += 1;

        match self.map.get_refresh(key) {
            Some(entry) => {
                self.hits += 1;
                Some(&entry.value)
            }
            None => None,
        }
    }

    /// Evicts the least recently used entry.
    ///
    /// Returns **true** if an entry was evicted or **false** if the cache was already empty.
    ///
    /// # Examples
    /// ```
    /// # use geecache::lru::LRUCache;
    /// let mut lru = LRUCache::new(0);
    /// lru.put("A".to_owned(), "1".to_owned());
    /// lru.put("B".to_owned(), "2".to_owned());
    ///
    /// assert_eq!(lru.remove_oldest(), true);
    /// assert_eq!(lru.get("A"), None);
    /// assert_eq!(lru.len(), 1);
    ///
    /// assert_eq!(lru.remove_oldest(), true);
    /// assert_eq!(lru.remove_oldest(), false);
    /// ```
    pub fn remove_oldest(&mut self) -> bool {
        match self.map.pop_front() {
            Some((key, entry)) => {
                self.allocated_memory -= entry.mem_size;
                if let Some(on_evicted) = self.on_evicted.as_mut() {
                    on_evicted(key, entry.value);
                }
                true
            }
            None => false,
        }
    }

    /// Returns the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Determines if the cache is completely empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the maximal amount of memory to be occupied by keys and values.
    ///
    /// A value of 0 indicates an unbounded cache.
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    /// Returns the amount of memory allocated by the keys and values of this cache.
    pub fn allocated_memory(&self) -> usize {
        self.allocated_memory
    }

    /// Returns the memory utilization in percent or 0 for an unbounded cache.
    pub fn memory_utilization(&self) -> f32 {
        match self.max_memory {
            0 => 0.,
            n => self.allocated_memory as f32 / n as f32 * 100.,
        }
    }

    /// Returns the cache hit rate in percent.
    pub fn hit_rate(&self) -> f32 {
        match self.reads {
            0 => 0.,
            n => self.hits as f32 / n as f32 * 100.,
        }
    }

    /// Returns the total number of reads performed on this cache.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Returns the number of reads which found a value.
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Returns the total number of writes performed on this cache.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

#[cfg(test)]
mod tests {
    use crate::lru::LRUCache;
    use std::sync::{Arc, Mutex};

    #[test]
    fn recently_used_entries_survive() {
        // Room for exactly two entries of 4 bytes each...
        let mut lru = LRUCache::new(8);

        lru.put("A".to_owned(), "AAA".to_owned());
        lru.put("B".to_owned(), "BBB".to_owned());
        assert_eq!(lru.len(), 2);

        // "Using" A protects it, so that B becomes the eviction candidate...
        assert_eq!(lru.get("A").unwrap(), "AAA");
        lru.put("C".to_owned(), "CCC".to_owned());

        assert_eq!(lru.get("A").unwrap(), "AAA");
        assert_eq!(lru.get("B"), None);
        assert_eq!(lru.get("C").unwrap(), "CCC");
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn access_before_insert_protects_oldest_entry() {
        // Room for exactly three entries of 4 bytes each...
        let mut lru = LRUCache::new(12);

        lru.put("A".to_owned(), "AAA".to_owned());
        lru.put("B".to_owned(), "BBB".to_owned());
        lru.put("C".to_owned(), "CCC".to_owned());
        assert_eq!(lru.get("A").is_some(), true);
        lru.put("D".to_owned(), "DDD".to_owned());

        assert_eq!(lru.get("A").is_some(), true);
        assert_eq!(lru.get("B"), None);
        assert_eq!(lru.get("C").is_some(), true);
        assert_eq!(lru.get("D").is_some(), true);
    }

    #[test]
    fn max_memory_is_enforced() {
        let mut lru = LRUCache::new(12 * 4);

        // We expect 4 entries with a size of 12 bytes each to fully fit in the cache....
        lru.put("Hello0".to_owned(), "World0".to_owned());
        lru.put("Hello1".to_owned(), "World1".to_owned());
        lru.put("Hello2".to_owned(), "World2".to_owned());
        lru.put("Hello3".to_owned(), "World3".to_owned());
        assert_eq!(lru.len(), 4);
        assert_eq!(lru.allocated_memory(), 12 * 4);

        // If we replace an entry, the used memory is corrected...
        lru.put("Hello1".to_owned(), "".to_owned());
        assert_eq!(lru.allocated_memory(), 12 * 4 - 6);
        assert_eq!(lru.len(), 4);

        // Restore the original entry...
        lru.put("Hello1".to_owned(), "World1".to_owned());
        assert_eq!(lru.allocated_memory(), 12 * 4);

        // Adding an entry which is 13 bytes long, requires two entries to be dropped. As
        // "Hello1" has been touched recently, "Hello0" and "Hello2" have to go...
        lru.put("Hello4".to_owned(), "World04".to_owned());
        assert_eq!(lru.allocated_memory(), 12 * 2 + 13);
        assert_eq!(lru.len(), 3);
        assert_eq!(lru.get("Hello0"), None);
        assert_eq!(lru.get("Hello2"), None);
        assert_eq!(lru.get("Hello1").is_some(), true);
        assert_eq!(lru.get("Hello3").is_some(), true);
    }

    #[test]
    fn allocated_memory_never_exceeds_max_memory() {
        let mut lru = LRUCache::new(100);

        for i in 0..1000 {
            let key = format!("key-{}", i % 37);
            let value = "X".repeat((i * 7) % 45);
            lru.put(key, value);
            assert_eq!(lru.allocated_memory() <= 100, true);

            // Touch some other entry every now and then...
            let _ = lru.get(format!("key-{}", i % 11).as_str());
        }
    }

    #[test]
    fn unbounded_caches_never_evict() {
        let mut lru = LRUCache::new(0);
        for i in 0..10_000 {
            lru.put(format!("key-{}", i), "X".repeat(128));
        }

        assert_eq!(lru.len(), 10_000);
        assert_eq!(lru.get("key-0").is_some(), true);
        assert_eq!(lru.memory_utilization(), 0.);
    }

    #[test]
    fn oversized_entries_are_dropped_immediately() {
        let mut lru = LRUCache::new(10);
        lru.put("A".to_owned(), "1".to_owned());
        lru.put("Huge".to_owned(), "X".repeat(20));

        assert_eq!(lru.is_empty(), true);
        assert_eq!(lru.allocated_memory(), 0);
    }

    #[test]
    fn eviction_handler_is_invoked() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let evicted_log = evicted.clone();
        let mut lru = LRUCache::with_eviction_handler(
            10,
            Box::new(move |key, value: String| {
                evicted_log.lock().unwrap().push(format!("{}={}", key, value))
            }),
        );

        lru.put("key1".to_owned(), "123".to_owned());
        lru.put("key2".to_owned(), "456".to_owned());
        lru.put("k3".to_owned(), "v3".to_owned());
        lru.put("k4".to_owned(), "v4".to_owned());

        assert_eq!(
            *evicted.lock().unwrap(),
            vec!["key1=123".to_owned(), "key2=456".to_owned()]
        );

        // Explicitly removing the oldest entry also notifies the handler...
        assert_eq!(lru.remove_oldest(), true);
        assert_eq!(evicted.lock().unwrap().len(), 3);
    }

    #[test]
    fn remove_oldest_on_empty_cache_is_a_noop() {
        let mut lru: LRUCache<String> = LRUCache::new(10);
        assert_eq!(lru.remove_oldest(), false);
        assert_eq!(lru.allocated_memory(), 0);
        assert_eq!(lru.len(), 0);
    }

    #[test]
    fn metrics_are_computed_correctly() {
        let mut lru = LRUCache::new(10);

        // Write 3 values into the cache...
        lru.put("A".to_owned(), "A".to_owned());
        lru.put("B".to_owned(), "B".to_owned());
        lru.put("C".to_owned(), "C".to_owned());

        // Perform 4 reads, of which 3 hit a cache entry...
        assert_eq!(lru.get("A").is_some(), true);
        assert_eq!(lru.get("B").is_some(), true);
        assert_eq!(lru.get("C").is_some(), true);
        assert_eq!(lru.get("D").is_none(), true);

        // ... therefore we had 3 writes, 4 reads of which 3 hit a value which
        // yields a hit rate of 75%
        assert_eq!(lru.writes(), 3);
        assert_eq!(lru.reads(), 4);
        assert_eq!(lru.hits(), 3);
        assert_eq!(lru.hit_rate().round() as i32, 75);

        // The cache contains 6 bytes of data and has a max memory of 10 -> 60% memory utilization..
        assert_eq!(lru.allocated_memory(), 6);
        assert_eq!(lru.memory_utilization().round() as i32, 60);
    }
}
