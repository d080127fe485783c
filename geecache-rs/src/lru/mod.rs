//! Provides a size constrained LRU Cache.
//!
//! An LRU cache drops the least recently used entry if it is about to grow beyond its memory
//! limit. This is the storage engine of each cache group: the [Cache](crate::cache::Cache) wraps
//! an [LRUCache] in a lock and stores [ByteView](crate::byteview::ByteView) values in it.
//!
//! The cache can store all kinds of values for which the [ByteSize] trait is implemented. As
//! the size of each value is known statically, the cache never has to inspect or downcast the
//! values it stores.
mod lru_cache;

pub use lru_cache::ByteSize;
pub use lru_cache::EvictionHandler;
pub use lru_cache::LRUCache;
