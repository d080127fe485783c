//! Provides a builder which can be used to setup and initialize a cache node.
//!
//! As most components of a [Node] are optional, a builder permits to selectively enable or
//! disable them.
//!
//! # Example
//! Setting up a node with all features enabled:
//! ```no_run
//! # use geecache::builder::Builder;
//! #[tokio::main]
//! async fn main() {
//!     // Enable all features and build the node...
//!     let node = Builder::new().enable_all().build().await;
//!
//!     // Create groups here...
//!
//!     // Start the main event loop of the server...
//!     node.server().unwrap().event_loop().await;
//! }
//! ```
use std::sync::Arc;

use crate::config::Config;
use crate::node::Node;
use crate::{init_logging, GEECACHE_REVISION, GEECACHE_VERSION};

/// Contains the file which is read if the config is enabled.
const CONFIG_FILE: &str = "config/settings.yml";

/// Initializes a node by creating and initializing all of its components.
#[derive(Default)]
pub struct Builder {
    setup_logging: bool,
    enable_signals: bool,
    setup_config: bool,
    setup_server: bool,
}

impl Builder {
    /// Creates a new builder which has all optional components disabled.
    pub fn new() -> Self {
        Builder::default()
    }

    /// Enables all features.
    ///
    /// Note that using this method (and then maybe disabling selected components) is quite
    /// convenient, but be aware that new components which might be added in a library update
    /// will then also be enabled by default.
    pub fn enable_all(mut self) -> Self {
        self.setup_logging = true;
        self.enable_signals = true;
        self.setup_config = true;
        self.setup_server = true;

        self
    }

    /// Enables the automatic setup of the logging system.
    ///
    /// This initializes **simplelog** to log to stdout, which is all that is needed when running
    /// in a docker container.
    pub fn enable_logging(mut self) -> Self {
        self.setup_logging = true;
        self
    }

    /// Disables the automatic setup of the logging system after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_logging(mut self) -> Self {
        self.setup_logging = false;
        self
    }

    /// Installs a signal listener which terminates the node once **CTRL-C** or **SIGHUP**
    /// is received.
    ///
    /// For more details see: [signals](crate::signals)
    pub fn enable_signals(mut self) -> Self {
        self.enable_signals = true;
        self
    }

    /// Disables installing the signal listener after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_signals(mut self) -> Self {
        self.enable_signals = false;
        self
    }

    /// Loads the config from **config/settings.yml** and watches this file for changes.
    ///
    /// Otherwise the node starts with an empty config which can still be filled via
    /// [Config::load_from_string](crate::config::Config::load_from_string).
    pub fn enable_config(mut self) -> Self {
        self.setup_config = true;
        self
    }

    /// Disables loading the config file after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_config(mut self) -> Self {
        self.setup_config = false;
        self
    }

    /// Creates a [Server](crate::server::Server) for the node.
    ///
    /// Note that still, the main event loop has to be invoked manually via:
    /// `node.server().unwrap().event_loop().await`.
    pub fn enable_server(mut self) -> Self {
        self.setup_server = true;
        self
    }

    /// Disables creating a **Server** after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_server(mut self) -> Self {
        self.setup_server = false;
        self
    }

    /// Builds the [Node] with all the enabled components being set up.
    pub async fn build(self) -> Arc<Node> {
        if self.setup_logging {
            init_logging();
        }

        log::info!(
            "||. GEECACHE (v {} - rev {}) running on {} core(s) in {} CPU(s)",
            GEECACHE_VERSION,
            GEECACHE_REVISION,
            num_cpus::get(),
            num_cpus::get_physical()
        );

        let node = Node::new(Config::new(CONFIG_FILE));

        if self.enable_signals {
            crate::signals::install(node.clone());
        }

        if self.setup_config {
            crate::config::install(node.clone()).await;
        }

        node.apply_config();
        Node::watch_config(&node);

        if self.setup_server {
            let _ = Node::install_server(&node);
        }

        node
    }
}
