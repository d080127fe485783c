//! Provides the HTTP transport used by nodes to fetch values from each other.
//!
//! An [HttpPool] knows all nodes of the cluster and places them on a [HashRing]. Being a
//! [PeerPicker], it decides for each key which node owns it. For every remote node it keeps an
//! [HttpGetter], which fetches values via `GET <peer><base path><group>/<key>`. The counterpart
//! which answers these requests is the [Server](crate::server::Server).
//!
//! # Example
//! ```
//! # use geecache::http::HttpPool;
//! # use geecache::peers::PeerPicker;
//! let pool = HttpPool::new("http://localhost:8001");
//!
//! // Without any peers, every key is handled locally...
//! assert_eq!(pool.pick_peer("Tom").is_none(), true);
//!
//! pool.set(&["http://localhost:8001", "http://localhost:8002", "http://localhost:8003"]);
//! assert_eq!(pool.peers().len(), 3);
//! ```
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::{Body, Client, StatusCode, Uri};

use crate::consistenthash::HashRing;
use crate::peers::{PeerGetter, PeerPicker};

/// Contains the path prefix under which values are served.
pub const DEFAULT_BASE_PATH: &str = "/_geecache/";

/// Contains the number of virtual nodes placed on the ring per peer.
pub const DEFAULT_REPLICAS: usize = 50;

/// Specifies how long to wait for a peer to deliver a value.
///
/// Once this elapses, the value is loaded locally instead.
const PEER_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Keeps track of all peers and picks the one owning a key.
pub struct HttpPool {
    base_path: String,
    client: Client<HttpConnector, Body>,
    state: Mutex<PoolState>,
}

/// Contains everything which is replaced when the set of peers changes.
struct PoolState {
    self_url: String,
    peers: Vec<String>,
    ring: HashRing,
    getters: HashMap<String, Arc<HttpGetter>>,
}

impl HttpPool {
    /// Creates a new pool for the node reachable via the given base URL.
    ///
    /// The pool starts without any peers, therefore all keys are handled locally until
    /// [set](HttpPool::set) is called.
    pub fn new(self_url: &str) -> Self {
        HttpPool {
            base_path: DEFAULT_BASE_PATH.to_owned(),
            client: Client::new(),
            state: Mutex::new(PoolState {
                self_url: self_url.to_owned(),
                peers: Vec::new(),
                ring: HashRing::with_replicas(DEFAULT_REPLICAS),
                getters: HashMap::new(),
            }),
        }
    }

    /// Returns the path prefix under which values are requested.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Returns the base URL of this node.
    pub fn self_url(&self) -> String {
        self.state.lock().unwrap().self_url.clone()
    }

    /// Changes the base URL under which this node is known to its peers.
    pub fn set_self(&self, self_url: &str) {
        self.state.lock().unwrap().self_url = self_url.to_owned();
    }

    /// Returns the base URLs of all known peers.
    pub fn peers(&self) -> Vec<String> {
        self.state.lock().unwrap().peers.clone()
    }

    /// Replaces the set of peers.
    ///
    /// The list should contain this node itself. A new ring is built and a client is created for
    /// each peer.
    pub fn set<S: AsRef<str>>(&self, peers: &[S]) {
        let mut ring = HashRing::with_replicas(DEFAULT_REPLICAS);
        ring.add(peers);

        let mut getters = HashMap::new();
        for peer in peers {
            let peer = peer.as_ref();
            let _ = getters.insert(
                peer.to_owned(),
                Arc::new(HttpGetter {
                    base_url: format!("{}{}", peer, self.base_path),
                    client: self.client.clone(),
                }),
            );
        }

        let mut state = self.state.lock().unwrap();
        state.peers = peers.iter().map(|peer| peer.as_ref().to_owned()).collect();
        state.ring = ring;
        state.getters = getters;

        log::info!(
            "[{}] Known peers: {}",
            state.self_url,
            state.peers.join(", ")
        );
    }
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let state = self.state.lock().unwrap();
        let peer = state.ring.get(key)?;
        if peer == state.self_url {
            return None;
        }

        log::debug!("[{}] Picked peer {} for '{}'.", state.self_url, peer, key);
        let getter: Arc<dyn PeerGetter> = state.getters.get(peer)?.clone();

        Some(getter)
    }
}

/// Fetches values from a single remote node.
pub struct HttpGetter {
    base_url: String,
    client: Client<HttpConnector, Body>,
}

impl HttpGetter {
    /// Returns the URL prefix (peer URL and base path) used for requests.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PeerGetter for HttpGetter {
    async fn get(&self, group: &str, key: &str) -> anyhow::Result<Vec<u8>> {
        let url = format!(
            "{}{}/{}",
            self.base_url,
            urlencoding::encode(group),
            urlencoding::encode(key)
        );
        let uri: Uri = url
            .parse()
            .with_context(|| format!("Invalid peer URL: {}", url))?;

        let response = tokio::time::timeout(PEER_REQUEST_TIMEOUT, self.client.get(uri))
            .await
            .with_context(|| format!("Timeout while requesting {}", url))?
            .with_context(|| format!("Failed to request {}", url))?;

        if response.status() != StatusCode::OK {
            anyhow::bail!("server returned: {}", response.status());
        }

        let body = hyper::body::to_bytes(response.into_body())
            .await
            .with_context(|| format!("Failed to read response body of {}", url))?;

        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use crate::group::Groups;
    use crate::http::HttpPool;
    use crate::peers::PeerPicker;
    use std::sync::Arc;

    #[test]
    fn keys_owned_by_this_node_are_not_picked() {
        let pool = HttpPool::new("http://a:8001");
        pool.set(&["http://a:8001", "http://b:8001", "http://c:8001"]);

        let mut local = 0;
        let mut remote = 0;
        for i in 0..1000 {
            match pool.pick_peer(&format!("key-{}", i)) {
                Some(_) => remote += 1,
                None => local += 1,
            }
        }

        // Roughly a third of all keys is owned by this node...
        assert_eq!(local > 100, true);
        assert_eq!(remote > 100, true);
    }

    #[test]
    fn getters_address_the_base_path_of_their_peer() {
        let pool = HttpPool::new("http://a:8001");
        pool.set(&["http://b:8002"]);

        assert_eq!(pool.pick_peer("Tom").is_some(), true);
        let state = pool.state.lock().unwrap();
        assert_eq!(
            state.getters["http://b:8002"].base_url(),
            "http://b:8002/_geecache/"
        );
    }

    #[test]
    fn changing_the_own_identity_changes_ownership() {
        let pool = HttpPool::new("http://a:8001");
        pool.set(&["http://b:8002"]);
        assert_eq!(pool.pick_peer("Tom").is_some(), true);

        pool.set_self("http://b:8002");
        assert_eq!(pool.pick_peer("Tom").is_none(), true);
        assert_eq!(pool.self_url(), "http://b:8002");
    }

    #[test]
    fn unreachable_peers_are_bypassed() {
        crate::testing::test_async(async {
            let pool = Arc::new(HttpPool::new("http://127.0.0.1:8001"));
            pool.set(&["http://127.0.0.1:1"]);

            let groups = Groups::new();
            let scores = groups
                .create("scores", 0, |key: &str| -> anyhow::Result<Vec<u8>> {
                    Ok(format!("local {}", key).into_bytes())
                })
                .unwrap();
            scores.register_peers(pool);

            assert_eq!(scores.get("Tom").await.unwrap().to_string(), "local Tom");
            assert_eq!(scores.stats().peer_errors, 1);
            assert_eq!(scores.stats().local_loads, 1);
        });
    }
}
