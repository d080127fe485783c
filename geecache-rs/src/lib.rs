//! GeeCache is a library for building distributed, read-through in-memory caches.
//!
//! # Introduction
//! **GeeCache** keeps frequently requested values in memory so that an expensive system of
//! record (a database, a remote service, a complex computation) is only asked once per value.
//! Values are organized in named **groups**. Each group is backed by a data source which is
//! consulted on a cache miss.
//!
//! Several nodes can form a cluster. Keys are distributed among all nodes via consistent hashing,
//! so that each value is only cached by the node owning its key. A node which receives a request
//! for a key owned by another node fetches it from this peer via HTTP.
//!
//! # Features
//! * **Size constrained LRU caches** which evict the least recently used entries once the
//!   configured memory limit is exceeded (see [lru]).
//! * **Request collapsing**: concurrent requests for the same missing key only load the value
//!   once (see [singleflight]).
//! * **Consistent hashing** with virtual nodes so that adding a node only moves a minority of
//!   keys (see [consistenthash]).
//! * **100% Async/Await** - the whole transport builds upon [tokio](https://tokio.rs/) and
//!   [hyper](https://hyper.rs/).
//! * **Reload-aware config facility** which permits to change the peers or even the port of a
//!   node without restarting it (and therefore without losing the cache contents).
//!
//! # Modules
//! * [group]: Groups and their registry - the main entry point of the library.
//! * [byteview]: The immutable value type handed out by groups.
//! * [peers] / [http]: Selecting the node which owns a key and talking to it.
//! * [node] / [builder] / [server]: Running a cache node.
//!
//! # Example
//! ```
//! # use geecache::group::Groups;
//! # #[tokio::main]
//! # async fn main() {
//! let groups = Groups::new();
//! let scores = groups
//!     .create("scores", 2 << 10, |key: &str| -> anyhow::Result<Vec<u8>> {
//!         Ok(format!("score of {}", key).into_bytes())
//!     })
//!     .unwrap();
//!
//! assert_eq!(scores.get("Tom").await.unwrap().to_string(), "score of Tom");
//! # }
//! ```
//!
//! A complete example of running a node can be found in **geecache-io**.
#![deny(
    warnings,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
use simplelog::{format_description, ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod builder;
pub mod byteview;
pub mod cache;
pub mod config;
pub mod consistenthash;
pub mod error;
pub mod fmt;
pub mod group;
pub mod http;
pub mod lru;
pub mod node;
pub mod peers;
pub mod server;
pub mod signals;
pub mod singleflight;

/// Contains the version of the GeeCache library.
pub const GEECACHE_VERSION: &str = "DEVELOPMENT-SNAPSHOT";

/// Contains the git commit hash of the GeeCache build being used.
pub const GEECACHE_REVISION: &str = "NO-REVISION";

/// Initializes the logging system.
///
/// Note that most probably the simplest way is to use a [Builder](builder::Builder) to set up a
/// node, which will also set up logging if enabled.
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    // Tests may initialize the logging system several times...
    INIT_LOGGING.call_once(|| {
        if let Err(error) = SimpleLogger::init(
            LevelFilter::Debug,
            ConfigBuilder::new()
                .set_time_format_custom(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
                ))
                .set_thread_level(LevelFilter::Trace)
                .set_target_level(LevelFilter::Error)
                .set_location_level(LevelFilter::Trace)
                .build(),
        ) {
            panic!("Failed to initialize logging system: {}", error);
        }
    });
}

/// Provides a simple macro to execute an async lambda within `tokio::spawn`.
///
/// Note that this also applies std::mem::drop on the returned join handle as we're never
/// interested in it.
///
/// # Example
/// ```rust
/// # #[macro_use] extern crate geecache;
/// # #[tokio::main]
/// # async fn main() {
/// spawn!(async move {
///     // perform some async stuff here...
/// });
/// # }
#[macro_export]
macro_rules! spawn {
    ($e:expr) => {{
        std::mem::drop(tokio::spawn($e));
    }};
}
