//! Provides cache groups, the central abstraction of GeeCache.
//!
//! A [Group] is a named, size constrained cache which is backed by a data source (a [Getter]).
//! Groups are created and looked up via a [Groups] registry.
//!
//! # Loading values
//! When a value is requested via [Group::get] the following happens:
//! 1. If the key is present in the local cache, the cached value is returned.
//! 2. Otherwise the value is loaded. All concurrent requests for the same key are collapsed into
//!    a single load (see [SingleFlight](crate::singleflight::SingleFlight)).
//! 3. If a [PeerPicker] has been registered and selects another node as owner of the key, the
//!    value is fetched from this peer. Values obtained from a peer are not stored locally, only the
//!    owning peer caches them.
//! 4. If no peer is responsible or if the peer fails, the data source is asked for the value.
//!    The result is stored in the local cache and returned.
//!
//! # Example
//! ```
//! # use geecache::group::Groups;
//! # #[tokio::main]
//! # async fn main() {
//! let groups = Groups::new();
//! let scores = groups
//!     .create("scores", 2 << 10, |key: &str| -> anyhow::Result<Vec<u8>> {
//!         match key {
//!             "Tom" => Ok(b"630".to_vec()),
//!             _ => Err(anyhow::anyhow!("{} not exist", key)),
//!         }
//!     })
//!     .unwrap();
//!
//! assert_eq!(scores.get("Tom").await.unwrap().to_string(), "630");
//! assert_eq!(scores.get("Unknown").await.is_err(), true);
//!
//! // The group can also be looked up by its name...
//! assert_eq!(groups.find("scores").is_some(), true);
//! # }
//! ```
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use async_trait::async_trait;

use crate::byteview::ByteView;
use crate::cache::{Cache, CacheStats};
use crate::error::{CacheError, Result};
use crate::fmt::format_size;
use crate::peers::{PeerGetter, PeerPicker};
use crate::singleflight::SingleFlight;

/// Provides the data of a group in case of a cache miss.
///
/// Plain functions and closures of the form `Fn(&str) -> anyhow::Result<Vec<u8>>` can be used
/// directly. For data sources which have to perform async I/O, this trait can be implemented
/// manually.
#[async_trait]
pub trait Getter: Send + Sync {
    /// Loads the value for the given key from the underlying system of record.
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

#[async_trait]
impl<F> Getter for F
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        self(key)
    }
}

/// Counts what happened while serving requests.
#[derive(Default)]
struct Counters {
    gets: AtomicUsize,
    cache_hits: AtomicUsize,
    peer_loads: AtomicUsize,
    peer_errors: AtomicUsize,
    local_loads: AtomicUsize,
    local_load_errors: AtomicUsize,
}

impl Counters {
    fn increment(counter: &AtomicUsize) {
        let _ = counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Provides a snapshot of the metrics of a [Group].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupStats {
    /// Contains the number of (valid) requests.
    pub gets: usize,
    /// Contains the number of requests served from the local cache.
    pub cache_hits: usize,
    /// Contains the number of values successfully fetched from peers.
    pub peer_loads: usize,
    /// Contains the number of failed attempts to fetch a value from a peer.
    pub peer_errors: usize,
    /// Contains the number of values successfully loaded from the data source.
    pub local_loads: usize,
    /// Contains the number of failed attempts to load a value from the data source.
    pub local_load_errors: usize,
    /// Contains the metrics of the underlying cache.
    pub cache: CacheStats,
}

/// Represents a named cache which is backed by a data source.
pub struct Group {
    name: String,
    getter: Box<dyn Getter>,
    main_cache: Cache,
    peers: OnceLock<Arc<dyn PeerPicker>>,
    loader: SingleFlight<Result<ByteView>>,
    counters: Counters,
}

impl Group {
    fn new(name: &str, max_memory: usize, getter: Box<dyn Getter>) -> Self {
        Group {
            name: name.to_owned(),
            getter,
            main_cache: Cache::new(max_memory),
            peers: OnceLock::new(),
            loader: SingleFlight::new(),
            counters: Counters::default(),
        }
    }

    /// Returns the name of this group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value for the given key.
    ///
    /// The value is either served from the local cache, fetched from the peer owning the key or
    /// loaded via the data source of this group. Callers cannot (and should not) tell which path
    /// was taken.
    ///
    /// # Errors
    /// Fails with [CacheError::InvalidArgument] for an empty key and with
    /// [CacheError::Upstream] if the data source fails. Every caller which waited for the same
    /// failed load receives the same error.
    pub async fn get(&self, key: &str) -> Result<ByteView> {
        if key.is_empty() {
            return Err(CacheError::InvalidArgument);
        }

        Counters::increment(&self.counters.gets);

        if let Some(value) = self.main_cache.get(key) {
            Counters::increment(&self.counters.cache_hits);
            log::debug!("[{}] Cache hit for '{}'.", self.name, key);
            return Ok(value);
        }

        self.load(key).await
    }

    /// Registers the picker which is used to select the peer owning a key.
    ///
    /// # Panics
    /// Panics if a picker has already been registered for this group.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) {
        if self.peers.set(peers).is_err() {
            panic!(
                "register_peers has been called more than once for group {}",
                self.name
            );
        }
    }

    /// Returns a snapshot of the metrics of this group.
    pub fn stats(&self) -> GroupStats {
        GroupStats {
            gets: self.counters.gets.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            peer_loads: self.counters.peer_loads.load(Ordering::Relaxed),
            peer_errors: self.counters.peer_errors.load(Ordering::Relaxed),
            local_loads: self.counters.local_loads.load(Ordering::Relaxed),
            local_load_errors: self.counters.local_load_errors.load(Ordering::Relaxed),
            cache: self.main_cache.stats(),
        }
    }

    async fn load(&self, key: &str) -> Result<ByteView> {
        self.loader.work(key, || self.load_uncached(key)).await
    }

    /// Asks the owning peer (if any) and falls back to the data source.
    async fn load_uncached(&self, key: &str) -> Result<ByteView> {
        if let Some(peer) = self.peers.get().and_then(|peers| peers.pick_peer(key)) {
            match self.get_from_peer(peer.as_ref(), key).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    Counters::increment(&self.counters.peer_errors);
                    log::warn!(
                        "[{}] Failed to fetch '{}' from peer: {:#}",
                        self.name,
                        key,
                        error
                    );
                }
            }
        }

        self.get_locally(key).await
    }

    async fn get_from_peer(&self, peer: &dyn PeerGetter, key: &str) -> anyhow::Result<ByteView> {
        let data = peer.get(&self.name, key).await?;
        Counters::increment(&self.counters.peer_loads);

        Ok(ByteView::from(data))
    }

    async fn get_locally(&self, key: &str) -> Result<ByteView> {
        match self.getter.get(key).await {
            Ok(data) => {
                Counters::increment(&self.counters.local_loads);
                let value = ByteView::from(data);
                self.populate_cache(key, value.clone());

                Ok(value)
            }
            Err(error) => {
                Counters::increment(&self.counters.local_load_errors);
                log::debug!("[{}] Failed to load '{}': {:#}", self.name, key, error);

                Err(CacheError::upstream(key, error))
            }
        }
    }

    fn populate_cache(&self, key: &str, value: ByteView) {
        self.main_cache.add(key, value);
    }
}

/// Keeps track of all groups known to a node.
///
/// Groups are registered once and never removed.
#[derive(Default)]
pub struct Groups {
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl Groups {
    /// Creates a new and empty registry.
    pub fn new() -> Self {
        Groups::default()
    }

    /// Creates and registers a new group.
    ///
    /// The group will store up to **max_memory** bytes of keys and values (0 disables the limit)
    /// and loads missing values via the given **getter**.
    ///
    /// # Errors
    /// Fails if the name is empty or if a group with the same name already exists.
    pub fn create<G>(&self, name: &str, max_memory: usize, getter: G) -> Result<Arc<Group>>
    where
        G: Getter + 'static,
    {
        if name.is_empty() {
            return Err(CacheError::InvalidGroupName);
        }

        let mut groups = self.groups.write().unwrap();
        if groups.contains_key(name) {
            return Err(CacheError::DuplicateGroup(name.to_owned()));
        }

        let group = Arc::new(Group::new(name, max_memory, Box::new(getter)));
        let _ = groups.insert(name.to_owned(), group.clone());

        if max_memory > 0 {
            log::info!(
                "Created group {} (max memory: {}).",
                name,
                format_size(max_memory)
            );
        } else {
            log::info!("Created group {} (unbounded).", name);
        }

        Ok(group)
    }

    /// Returns the group with the given name (if present).
    pub fn find(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().unwrap().get(name).cloned()
    }

    /// Returns the names of all known groups in alphabetical order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().unwrap().keys().cloned().collect();
        names.sort();

        names
    }
}
