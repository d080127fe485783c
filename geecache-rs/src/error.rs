//! Contains the errors which are reported to callers of a cache group.
//!
//! Note that a cache miss is never an error, it is represented as **None**. Also failures when
//! talking to peers are not part of this list, as these are handled internally by falling back
//! to the local data source.
use std::sync::Arc;

use thiserror::Error;

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Enumerates the errors reported by [Groups](crate::group::Groups) and
/// [Group](crate::group::Group).
///
/// Errors are cheap to clone, so that a single failed load can be reported to every caller
/// which waited for it.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// An empty key was passed to [Group::get](crate::group::Group::get).
    #[error("key is required")]
    InvalidArgument,

    /// The data source failed to provide a value for the given key.
    #[error("failed to load '{key}': {cause}")]
    Upstream {
        /// Contains the key which was requested.
        key: String,
        /// Contains the error reported by the data source.
        cause: Arc<anyhow::Error>,
    },

    /// A group was about to be created with an empty name.
    #[error("a group name is required")]
    InvalidGroupName,

    /// A group with the given name has already been created.
    #[error("a group named '{0}' already exists")]
    DuplicateGroup(String),
}

impl CacheError {
    /// Wraps an error reported by a data source.
    pub fn upstream(key: &str, cause: anyhow::Error) -> Self {
        CacheError::Upstream {
            key: key.to_owned(),
            cause: Arc::new(cause),
        }
    }
}
