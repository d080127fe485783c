//! Represents a single cache node and owns all of its central components.
//!
//! A node consists of its [Config], the registry of all [Groups], the [HttpPool] used to talk
//! to other nodes and optionally the [Server] which answers their requests. It also keeps the
//! central **is_running** flag which is toggled to *false* once [Node::terminate] is invoked.
//!
//! Nodes are most probably created via the [Builder](crate::builder::Builder).
//!
//! # Examples
//!
//! ```
//! # use geecache::builder::Builder;
//! # #[tokio::main]
//! # async fn main() {
//! let node = Builder::new().build().await;
//!
//! let scores = node
//!     .create_group("scores", 2 << 10, |key: &str| -> anyhow::Result<Vec<u8>> {
//!         Ok(key.as_bytes().to_vec())
//!     })
//!     .unwrap();
//! assert_eq!(scores.get("Tom").await.unwrap().to_string(), "Tom");
//!
//! // By default the node is running...
//! assert_eq!(node.is_running(), true);
//!
//! // Once terminated, all loops (server, config watcher) exit...
//! node.terminate();
//! assert_eq!(node.is_running(), false);
//! # }
//! ```
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Notify;

use crate::config::Config;
use crate::error::Result;
use crate::group::{Getter, Group, Groups};
use crate::http::HttpPool;
use crate::server::Server;

/// Bundles all components of a cache node.
pub struct Node {
    is_running: AtomicBool,
    termination: Notify,
    config: Arc<Config>,
    groups: Groups,
    pool: Arc<HttpPool>,
    server: OnceLock<Arc<Server>>,
}

impl Node {
    /// Creates a new node using the given config.
    ///
    /// The pool initially knows no peers and uses the **self_url** of the given config.
    pub fn new(config: Config) -> Arc<Self> {
        let self_url = config.current().self_url();

        Arc::new(Node {
            is_running: AtomicBool::new(true),
            termination: Notify::new(),
            config: Arc::new(config),
            groups: Groups::new(),
            pool: Arc::new(HttpPool::new(&self_url)),
            server: OnceLock::new(),
        })
    }

    /// Provides access to the config of this node.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Provides access to all groups of this node.
    pub fn groups(&self) -> &Groups {
        &self.groups
    }

    /// Provides access to the pool which knows all peers of this node.
    pub fn pool(&self) -> &Arc<HttpPool> {
        &self.pool
    }

    /// Returns the server of this node, unless it has been disabled in the
    /// [Builder](crate::builder::Builder).
    pub fn server(&self) -> Option<Arc<Server>> {
        self.server.get().cloned()
    }

    /// Creates the server for the given node.
    ///
    /// Repeated calls return the already existing server.
    pub fn install_server(node: &Arc<Node>) -> Arc<Server> {
        node.server
            .get_or_init(|| Arc::new(Server::new(node.clone())))
            .clone()
    }

    /// Creates a new group which uses the peers of this node.
    ///
    /// See [Groups::create] for a description of the parameters and possible errors.
    pub fn create_group<G>(&self, name: &str, max_memory: usize, getter: G) -> Result<Arc<Group>>
    where
        G: Getter + 'static,
    {
        let group = self.groups.create(name, max_memory, getter)?;
        group.register_peers(self.pool.clone());

        Ok(group)
    }

    /// Applies **node.self** and **peers** of the current config to the pool.
    pub fn apply_config(&self) {
        let handle = self.config.current();

        let self_url = handle.self_url();
        if self_url != self.pool.self_url() {
            log::info!("This node is now known as {}.", self_url);
            self.pool.set_self(&self_url);
        }

        let peers = handle.peers();
        if peers != self.pool.peers() {
            self.pool.set(&peers);
        }
    }

    /// Re-applies the peer config whenever the config changes.
    pub fn watch_config(node: &Arc<Node>) {
        let node = node.clone();
        let mut notifier = node.config.notifier();
        crate::spawn!(async move {
            while node.is_running() {
                tokio::select! {
                    message = notifier.recv() => match message {
                        Ok(_) | Err(RecvError::Lagged(_)) => node.apply_config(),
                        Err(RecvError::Closed) => return,
                    },
                    _ = node.await_termination() => (),
                }
            }
        });
    }

    /// Determines if the node is still running or if [Node::terminate] has already been called.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Terminates the node.
    ///
    /// This toggles the [is_running()](Node::is_running) flag to **false** and wakes up all
    /// tasks waiting in [await_termination](Node::await_termination).
    pub fn terminate(&self) {
        self.is_running.store(false, Ordering::Release);
        self.termination.notify_waiters();
    }

    /// Completes once [Node::terminate] is invoked.
    ///
    /// Returns immediately if the node has already been terminated.
    pub async fn await_termination(&self) {
        let notified = self.termination.notified();
        if self.is_running() {
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::Builder;
    use crate::node::Node;
    use crate::peers::PeerPicker;
    use crate::server::Server;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    async fn start_node(loads: Arc<AtomicUsize>) -> Arc<Node> {
        let node = Builder::new().enable_server().build().await;
        node.config()
            .load_from_string("server:\n    host: 127.0.0.1\n    port: 0", None)
            .unwrap();
        let _ = node
            .create_group("scores", 0, move |key: &str| -> anyhow::Result<Vec<u8>> {
                let _ = loads.fetch_add(1, Ordering::SeqCst);
                Ok(format!("value of {}", key).into_bytes())
            })
            .unwrap();

        Server::fork_and_await(&node.server().unwrap()).await;

        node
    }

    fn url_of(node: &Node) -> String {
        format!("http://{}", node.server().unwrap().local_address().unwrap())
    }

    async fn await_peers(node: &Node, expected: usize) {
        let mut attempts = 0;
        while node.pool().peers().len() != expected {
            attempts += 1;
            assert_eq!(attempts < 100, true);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[test]
    fn remote_keys_are_fetched_from_their_owner() {
        crate::testing::test_async(async {
            let loads_a = Arc::new(AtomicUsize::new(0));
            let loads_b = Arc::new(AtomicUsize::new(0));
            let node_a = start_node(loads_a.clone()).await;
            let node_b = start_node(loads_b.clone()).await;
            let url_a = url_of(&node_a);
            let url_b = url_of(&node_b);

            // Announce the cluster via the config, just like a real deployment would...
            for (node, url) in [(&node_a, &url_a), (&node_b, &url_b)] {
                node.config()
                    .load_from_string(
                        &format!(
                            "server:\n    host: 127.0.0.1\n    port: 0\nnode:\n    self: {}\npeers:\n    - {}\n    - {}",
                            url, url_a, url_b
                        ),
                        None,
                    )
                    .unwrap();
                await_peers(node, 2).await;
            }
            assert_eq!(node_a.pool().self_url(), url_a);

            // Find a key owned by node B...
            let key = (0..1000)
                .map(|i| format!("key-{}", i))
                .find(|key| node_a.pool().pick_peer(key).is_some())
                .unwrap();

            let scores_a = node_a.groups().find("scores").unwrap();
            let scores_b = node_b.groups().find("scores").unwrap();
            assert_eq!(
                scores_a.get(&key).await.unwrap().to_string(),
                format!("value of {}", key)
            );

            assert_eq!(loads_a.load(Ordering::SeqCst), 0);
            assert_eq!(loads_b.load(Ordering::SeqCst), 1);
            assert_eq!(scores_a.stats().peer_loads, 1);
            assert_eq!(scores_a.stats().cache.entries, 0);
            assert_eq!(scores_b.stats().cache.entries, 1);

            // The owner serves subsequent requests from its cache...
            let _ = scores_a.get(&key).await.unwrap();
            assert_eq!(loads_b.load(Ordering::SeqCst), 1);
            assert_eq!(scores_b.stats().cache_hits, 1);

            node_a.terminate();
            node_b.terminate();
        });
    }

    #[test]
    fn nodes_without_peers_load_everything_locally() {
        crate::testing::test_async(async {
            let node = Builder::new().build().await;
            let scores = node
                .create_group("scores", 0, |key: &str| -> anyhow::Result<Vec<u8>> {
                    Ok(key.as_bytes().to_vec())
                })
                .unwrap();

            assert_eq!(node.pool().pick_peer("Tom").is_none(), true);
            assert_eq!(scores.get("Tom").await.unwrap().to_string(), "Tom");
            assert_eq!(scores.stats().local_loads, 1);
        });
    }

    #[test]
    fn termination_wakes_up_waiting_tasks() {
        crate::testing::test_async(async {
            let node = Builder::new().build().await;

            let waiting_node = node.clone();
            let waiter = tokio::spawn(async move { waiting_node.await_termination().await });
            tokio::time::sleep(Duration::from_millis(10)).await;

            node.terminate();
            assert_eq!(node.is_running(), false);
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();

            // Waiting on a terminated node completes immediately...
            node.await_termination().await;
        });
    }
}
