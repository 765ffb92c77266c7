//! Storage backend abstractions
//!
//! The transfer engine only talks to storage through the traits in this
//! module: an [`Object`] it can open ranged reads on, and an [`Fs`] that
//! advertises which write capabilities it has.
//!
//! Two backends ship with the crate:
//!
//! - [`LocalFs`]: local filesystem, random-access writes
//! - [`MemoryFs`]: in-memory store with native multipart and/or random-access writes

mod local;
mod memory;

pub use local::*;
pub use memory::*;

use crate::error::Result;
use crate::multipart::{OpenChunkWriter, OpenWriterAt};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::AsyncRead;

/// Read stream returned by [`Object::open`]
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Byte range for a partial read, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeOption {
    /// First byte to read
    pub start: u64,
    /// Last byte to read (inclusive)
    pub end: u64,
}

impl RangeOption {
    /// Create a range covering `[start, end]`
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of bytes covered
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }

    /// A range always covers at least one byte
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Clamp the range to an object of `size` bytes, returning `(offset, len)`
    pub fn decode(&self, size: u64) -> (u64, u64) {
        if self.start >= size {
            return (size, 0);
        }
        let end = self.end.min(size - 1);
        (self.start, end - self.start + 1)
    }
}

impl fmt::Display for RangeOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes={}-{}", self.start, self.end)
    }
}

/// Optional behaviours of a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Features {
    /// Storage lives on this machine
    pub is_local: bool,
    /// Ranged reads must not be issued concurrently
    pub no_multi_threading: bool,
    /// Objects become visible while being written, so metadata is applied afterwards
    pub partial_uploads: bool,
}

/// A stored object
#[async_trait]
pub trait Object: Send + Sync {
    /// Name of the object relative to its backend root
    fn remote(&self) -> &str;

    /// Size in bytes, `None` if unknown
    fn size(&self) -> Option<u64>;

    /// Features of the backend holding this object
    fn features(&self) -> Features;

    /// Last modification time
    async fn mod_time(&self) -> SystemTime;

    /// Open the object for reading, optionally restricted to a byte range
    async fn open(&self, range: Option<RangeOption>) -> Result<BoxedReader>;

    /// Set the modification time
    async fn set_mod_time(&self, time: SystemTime) -> Result<()>;

    /// Delete the object
    async fn remove(&self) -> Result<()>;
}

/// A storage backend
#[async_trait]
pub trait Fs: Send + Sync {
    /// Human-readable backend name, used in logs and errors
    fn name(&self) -> &str;

    /// Optional behaviours of this backend
    fn features(&self) -> Features;

    /// Look up an existing object
    async fn new_object(&self, remote: &str) -> Result<Arc<dyn Object>>;

    /// Native chunked-write capability, if the backend has one
    fn chunk_writer_opener(&self) -> Option<&dyn OpenChunkWriter> {
        None
    }

    /// Random-access write capability, if the backend has one
    fn writer_at_opener(&self) -> Option<&dyn OpenWriterAt> {
        None
    }
}
