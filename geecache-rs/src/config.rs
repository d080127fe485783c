//! Contains the system configuration.
//!
//! Provides access to the system configuration which is loaded from the **config/settings.yml**
//! file. This file is observed for changes and re-loaded once a change is detected. Each user of
//! the config should therefore attach itself to the [Config::notifier] and re-process the config
//! once a change message is received. This way a node can e.g. move to another port or learn
//! about new peers without being restarted (and thus without losing its cache contents).
//!
//! Note that **Config::current()** returns a snapshot of the currently loaded document. This
//! handle should not be stored, as it will not be updated once a new config has been loaded.
//!
//! # Layout
//! ```yaml
//! server:
//!     host: 0.0.0.0
//!     port: 8001
//! node:
//!     self: http://localhost:8001
//! peers:
//!     - http://localhost:8001
//!     - http://localhost:8002
//! groups:
//!     scores:
//!         max_memory: 2k
//!         data:
//!             Tom: 630
//!             Jack: 589
//! ```
//!
//! # Examples
//!
//! Reading the config:
//! ```
//! # use geecache::config::Config;
//! let config = Config::new("settings.yml");
//! config.load_from_string("
//! server:
//!     port: 9999
//! ", None).unwrap();
//!
//! assert_eq!(config.current().query("server.port").as_i64(), Some(9999));
//! assert_eq!(config.current().server_address(), "0.0.0.0:9999");
//! assert_eq!(config.current().self_url(), "http://localhost:9999");
//! ```
//!
//! Attaching a change listener:
//! ```no_run
//! # use geecache::builder::Builder;
//! # #[tokio::main]
//! # async fn main() {
//! # let node = Builder::new().enable_config().build().await;
//! let config = node.config().clone();
//! tokio::spawn(async move {
//!     let mut notifier = config.notifier();
//!     loop {
//!         match notifier.recv().await {
//!             Ok(_) => log::info!("Config update received..."),
//!             _ => return,
//!         }
//!     }
//! });
//! # }
//! ```
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwap;
use yaml_rust::{Yaml, YamlLoader};

use crate::fmt::parse_size;
use crate::node::Node;

/// Contains the port to use if none is configured.
pub const DEFAULT_PORT: u16 = 8001;

/// Contains the host (interface) to bind to if none is configured.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Contains the memory limit of a group if none is configured.
pub const DEFAULT_GROUP_MEMORY: usize = 16 * 1024 * 1024;

/// Provides access to the system configuration.
///
/// A config instance is owned by each [Node]. If enabled via the
/// [Builder](crate::builder::Builder), it is loaded from disk and observed for changes.
pub struct Config {
    filename: String,
    tx: tokio::sync::broadcast::Sender<()>,
    config: ArcSwap<(Yaml, Option<SystemTime>)>,
}

/// Represents the change listener.
///
/// Internally this is simply the receiver of a broadcast. The actual message being broadcast
/// can and should be ignored. All that matters is, once a message has been received, the config
/// was changed and needs to be re-processed.
pub type ChangeNotifier = tokio::sync::broadcast::Receiver<()>;

/// Represents a handle to the currently loaded configuration.
///
/// Note that this handle should not be stored or kept around for long, as it will not be updated
/// if the underlying config changed.
pub struct Handle {
    config: Arc<(Yaml, Option<SystemTime>)>,
}

/// Describes a group which is defined in the config.
///
/// Groups are backed by the static **data** map given in the config, which is mostly useful for
/// demos and tests.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupSettings {
    /// Contains the name of the group.
    pub name: String,
    /// Contains the memory limit in bytes.
    pub max_memory: usize,
    /// Contains the key-value pairs which act as data source.
    pub data: Vec<(String, String)>,
}

impl Config {
    /// Creates a new (empty) config which will read the given file once [load](Config::load) is
    /// invoked.
    ///
    /// Note that this will not install a change listener. This is only done by the
    /// [install] function.
    pub fn new(file: &str) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(1);
        Config {
            filename: file.to_owned(),
            config: ArcSwap::new(Arc::new((Yaml::Hash(Default::default()), None))),
            tx,
        }
    }

    /// Obtains a change notifier which receives a message once the config changed.
    pub fn notifier(&self) -> ChangeNotifier {
        self.tx.subscribe()
    }

    /// Obtains a handle to the currently loaded configuration.
    pub fn current(&self) -> Handle {
        Handle {
            config: self.config.load_full(),
        }
    }

    /// Determines the last modified date of the config file on disk.
    ///
    /// An unmounted docker volume is presented as directory, therefore we only accept files.
    async fn last_modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.filename)
            .await
            .ok()
            .filter(|meta| meta.is_file())
            .and_then(|meta| meta.modified().ok())
    }

    /// Forces the config to read the underlying file.
    ///
    /// Note that this is normally called by the framework and should not be invoked manually.
    pub async fn load(&self) -> anyhow::Result<()> {
        log::info!("Loading config file {}...", &self.filename);

        let last_modified = match self.last_modified().await {
            Some(last_modified) => last_modified,
            None => {
                log::info!("Config file doesn't exist or is an unmounted docker volume - skipping config load.");
                return Ok(());
            }
        };

        let config_data = tokio::fs::read_to_string(&self.filename)
            .await
            .map_err(|error| {
                anyhow::anyhow!("Cannot load config file {}: {}", &self.filename, error)
            })?;

        self.load_from_string(config_data.as_str(), Some(last_modified))
    }

    /// Loads a configuration from the given string instead of a file.
    ///
    /// This is intended to be used in test environments where we cannot / do not want to load
    /// a config file from disk. A malformed document is rejected and the previous config is kept.
    pub fn load_from_string(
        &self,
        data: &str,
        last_modified: Option<SystemTime>,
    ) -> anyhow::Result<()> {
        let mut docs = YamlLoader::load_from_str(data).map_err(|error| {
            anyhow::anyhow!("Cannot parse config file {}: {}", &self.filename, error)
        })?;

        let doc = match docs.drain(..).next() {
            Some(doc @ Yaml::Hash(_)) => doc,
            _ => Yaml::Hash(Default::default()),
        };

        self.config.store(Arc::new((doc, last_modified)));

        // Notify all listeners - we ignore if there are none...
        let _ = self.tx.send(());

        Ok(())
    }
}

impl Handle {
    /// Provides access to the currently loaded configuration.
    pub fn config(&self) -> &Yaml {
        &self.config.0
    }

    /// Resolves a dot separated path like `server.port` within the loaded configuration.
    ///
    /// Returns [Yaml::BadValue] if any part of the path doesn't exist.
    pub fn query(&self, query: impl AsRef<str>) -> &Yaml {
        query
            .as_ref()
            .split('.')
            .fold(self.config(), |node, key| &node[key])
    }

    /// Returns the configured port or [DEFAULT_PORT].
    ///
    /// Port 0 is accepted and makes the operating system pick a free port.
    pub fn port(&self) -> u16 {
        self.query("server.port")
            .as_i64()
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Returns the address (host:port) the server should bind to.
    pub fn server_address(&self) -> String {
        format!(
            "{}:{}",
            self.query("server.host").as_str().unwrap_or(DEFAULT_HOST),
            self.port()
        )
    }

    /// Returns the base URL under which this node is reachable by its peers.
    ///
    /// Uses **node.self** or `http://localhost:<port>` as fallback.
    pub fn self_url(&self) -> String {
        self.query("node.self")
            .as_str()
            .map(|url| url.trim_end_matches('/').to_owned())
            .unwrap_or_else(|| format!("http://localhost:{}", self.port()))
    }

    /// Returns the base URLs of all nodes in the cluster.
    pub fn peers(&self) -> Vec<String> {
        self.query("peers")
            .as_vec()
            .map(|peers| {
                peers
                    .iter()
                    .filter_map(Yaml::as_str)
                    .map(|url| url.trim_end_matches('/').to_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns all groups defined in the **groups** section.
    ///
    /// Invalid entries are logged and skipped.
    pub fn groups(&self) -> Vec<GroupSettings> {
        let mut result = Vec::new();
        if let Some(groups) = self.query("groups").as_hash() {
            for (name, settings) in groups {
                match parse_group(name, settings) {
                    Ok(group) => result.push(group),
                    Err(error) => log::error!("Skipping invalid group config: {:#}", error),
                }
            }
        }

        result
    }
}

fn parse_group(name: &Yaml, settings: &Yaml) -> anyhow::Result<GroupSettings> {
    let name = scalar_to_string(name)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| anyhow::anyhow!("A group name must be a non-empty string."))?;

    let max_memory = match &settings["max_memory"] {
        Yaml::BadValue | Yaml::Null => DEFAULT_GROUP_MEMORY,
        Yaml::Integer(size) => usize::try_from(*size).map_err(|_| {
            anyhow::anyhow!("Group {}: max_memory must not be negative.", name)
        })?,
        Yaml::String(size) => parse_size(size)
            .map_err(|error| anyhow::anyhow!("Group {}: {}", name, error))?,
        other => anyhow::bail!("Group {}: invalid max_memory: {:?}", name, other),
    };

    let mut data = Vec::new();
    if let Some(entries) = settings["data"].as_hash() {
        for (key, value) in entries {
            match (scalar_to_string(key), scalar_to_string(value)) {
                (Some(key), Some(value)) => data.push((key, value)),
                _ => anyhow::bail!("Group {}: data must only contain scalar values.", name),
            }
        }
    }

    Ok(GroupSettings {
        name,
        max_memory,
        data,
    })
}

fn scalar_to_string(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(value) | Yaml::Real(value) => Some(value.clone()),
        Yaml::Integer(value) => Some(value.to_string()),
        Yaml::Boolean(value) => Some(value.to_string()),
        _ => None,
    }
}

/// Loads the **config/settings.yml** into the config of the given node and installs a change
/// listener for this file.
///
/// Note that this listener only watches the "last modified" date of the file and doesn't perform
/// a structural comparison. Therefore it is the duty of each config user to gracefully handle
/// partial config changes.
///
/// This is called by the [Builder](crate::builder::Builder) unless the config is disabled.
pub async fn install(node: Arc<Node>) {
    let path = Path::new("config");
    if let Err(error) = tokio::fs::create_dir_all(path).await {
        log::warn!(
            "Failed to create config base directory {}: {}",
            path.to_string_lossy(),
            error
        )
    }

    if let Err(error) = node.config().load().await {
        log::error!("{}", error);
    }

    run_config_change_monitor(node);
}

fn run_config_change_monitor(node: Arc<Node>) {
    crate::spawn!(async move {
        while node.is_running() {
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            let config = node.config();

            // Reload if the file is present and either newer than the loaded one or if nothing
            // has been loaded from disk yet...
            let last_modified = config.last_modified().await;
            let last_loaded = config.config.load().1;
            if last_modified.is_some() && (last_loaded.is_none() || last_modified > last_loaded) {
                match config.load().await {
                    Ok(_) => log::info!("System configuration was re-loaded."),
                    Err(error) => log::error!("Failed to re-load system config: {}", error),
                }
            }
        }
    });
}
