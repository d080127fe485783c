//! Provides the immutable value type which is stored in and returned by a cache group.
//!
//! A [ByteView] wraps an arbitrary byte payload. As the cache hands out values to many callers
//! while still keeping them in its own storage, a view is never mutated after it has been
//! created. All accessors which hand out the raw data return a copy, so that a caller can never
//! modify what is stored in the cache.
//!
//! # Example
//! ```
//! # use geecache::byteview::ByteView;
//! let view = ByteView::from("630");
//!
//! assert_eq!(view.len(), 3);
//! assert_eq!(view.to_string(), "630");
//!
//! // Modifying the returned slice leaves the view untouched...
//! let mut data = view.byte_slice();
//! data[0] = b'9';
//! assert_eq!(view.to_string(), "630");
//! ```
use std::fmt;
use std::fmt::Display;

use bytes::Bytes;

use crate::lru::ByteSize;

/// Represents an immutable view on a byte payload.
///
/// Cloning a view is cheap, as the underlying buffer is shared. However, the buffer itself is
/// never exposed mutably.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteView {
    data: Bytes,
}

impl ByteView {
    /// Creates a new view by copying the given data.
    ///
    /// The caller is free to modify or reuse its buffer afterwards.
    pub fn copy_from(data: &[u8]) -> Self {
        ByteView {
            data: Bytes::copy_from_slice(data),
        }
    }

    /// Returns the number of bytes in this view.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Determines if the view contains no data at all.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a copy of the underlying data.
    pub fn byte_slice(&self) -> Vec<u8> {
        self.data.to_vec()
    }
}

impl ByteSize for ByteView {
    fn allocated_size(&self) -> usize {
        self.len()
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(data: Vec<u8>) -> Self {
        ByteView {
            data: Bytes::from(data),
        }
    }
}

impl From<&[u8]> for ByteView {
    fn from(data: &[u8]) -> Self {
        ByteView::copy_from(data)
    }
}

impl From<&str> for ByteView {
    fn from(data: &str) -> Self {
        ByteView::copy_from(data.as_bytes())
    }
}

impl Display for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.data))
    }
}

impl fmt::Debug for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteView({:?})", String::from_utf8_lossy(&self.data))
    }
}
