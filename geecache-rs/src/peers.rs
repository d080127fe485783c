//! Defines the capabilities a [Group](crate::group::Group) needs to talk to other nodes.
//!
//! A group doesn't know how peers are found or how to talk to them. It only asks a [PeerPicker]
//! which peer owns a key and then uses the returned [PeerGetter] to fetch the value. The
//! [HttpPool](crate::http::HttpPool) provides both capabilities via HTTP and consistent hashing,
//! but any other transport or routing scheme can be plugged in.
use std::sync::Arc;

use async_trait::async_trait;

/// Selects the peer which owns a given key.
pub trait PeerPicker: Send + Sync {
    /// Returns the client for the peer owning the given key.
    ///
    /// Returns **None** if the key should be handled locally. This is also the case if the
    /// owning peer is this node itself.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}

/// Fetches values from a remote peer.
#[async_trait]
pub trait PeerGetter: Send + Sync {
    /// Fetches the value for the given key within the given group from the remote peer.
    async fn get(&self, group: &str, key: &str) -> anyhow::Result<Vec<u8>>;
}
