//! Chunk writer capability
//!
//! A destination takes chunks either through a backend-native chunked upload
//! ([`OpenChunkWriter`]) or through random-access writes ([`OpenWriterAt`])
//! that [`WriterAtChunkWriter`] adapts into the same contract. The choice is
//! made once per transfer and held in a [`SessionWriter`].

use crate::backend::{Fs, Object};
use crate::config::TransferConfig;
use crate::error::{MultiCopyError, Result};
use crate::multipart::{ChunkReader, WriterAtChunkWriter};
use async_trait::async_trait;
use std::sync::Arc;

/// What the destination told us when the chunk writer was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkWriterInfo {
    /// Chunk size the destination will accept
    pub chunk_size: u64,
    /// Preferred number of concurrent chunk writes
    pub concurrency: usize,
    /// Keep partially written data on failure instead of aborting
    pub leave_parts_on_error: bool,
}

/// Writes an object as independently addressed chunks
///
/// `write_chunk` may be called concurrently and out of order for disjoint
/// chunk indices. `close` commits the object once every chunk succeeded;
/// `abort` removes partial state and must be callable without `close`.
#[async_trait]
pub trait ChunkWriter: Send + Sync {
    /// Write chunk `index` from `reader`, returning the bytes written
    async fn write_chunk(&self, index: usize, reader: &mut ChunkReader) -> Result<u64>;

    /// Commit the object
    async fn close(&self) -> Result<()>;

    /// Discard any partially written state
    async fn abort(&self) -> Result<()>;

    /// Whether this writer may rewind the chunk reader (e.g. to retry a part)
    fn needs_seekable_input(&self) -> bool {
        true
    }
}

/// Backend capability: open a native chunk writer
#[async_trait]
pub trait OpenChunkWriter: Send + Sync {
    /// Start a chunked upload of `src` to `remote`
    async fn open_chunk_writer(
        &self,
        remote: &str,
        src: &dyn Object,
    ) -> Result<(ChunkWriterInfo, Box<dyn ChunkWriter>)>;
}

/// Random-access destination handle
#[async_trait]
pub trait WriterAtCloser: Send + Sync {
    /// Write `buf` at absolute byte `offset`, returning the bytes written
    async fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize>;

    /// Finish writing; commits the object for this style of backend
    async fn close(&self) -> Result<()>;
}

/// Backend capability: open a random-access writer
#[async_trait]
pub trait OpenWriterAt: Send + Sync {
    /// Create `remote` with room for `size` bytes
    async fn open_writer_at(&self, remote: &str, size: u64) -> Result<Box<dyn WriterAtCloser>>;
}

/// Which write path a destination supports, native preferred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterKind {
    /// Backend-native chunked upload
    Native,
    /// Random-access writes through the offset adapter
    Adapted,
}

impl WriterKind {
    /// Pick the write path for `dst`, failing if it has neither capability
    pub fn detect(dst: &dyn Fs) -> Result<Self> {
        if dst.chunk_writer_opener().is_some() {
            Ok(Self::Native)
        } else if dst.writer_at_opener().is_some() {
            Ok(Self::Adapted)
        } else {
            Err(MultiCopyError::CapabilityMissing(dst.name().to_string()))
        }
    }
}

/// The chunk writer driving one transfer
pub enum SessionWriter {
    /// Backend-provided chunk writer
    Native(Box<dyn ChunkWriter>),
    /// Random-access writer behind the offset adapter
    Adapted(WriterAtChunkWriter),
}

impl SessionWriter {
    /// Open the writer of the given kind for `src` → `remote` on `dst`
    pub async fn open(
        kind: WriterKind,
        dst: &Arc<dyn Fs>,
        remote: &str,
        src: &dyn Object,
        config: &TransferConfig,
    ) -> Result<(ChunkWriterInfo, Self)> {
        match kind {
            WriterKind::Native => {
                let opener = dst
                    .chunk_writer_opener()
                    .ok_or_else(|| MultiCopyError::CapabilityMissing(dst.name().to_string()))?;
                let (info, writer) = opener.open_chunk_writer(remote, src).await?;
                Ok((info, Self::Native(writer)))
            }
            WriterKind::Adapted => {
                let (info, writer) =
                    WriterAtChunkWriter::open(Arc::clone(dst), remote, src, config).await?;
                Ok((info, Self::Adapted(writer)))
            }
        }
    }

    fn inner(&self) -> &dyn ChunkWriter {
        match self {
            Self::Native(writer) => writer.as_ref(),
            Self::Adapted(writer) => writer,
        }
    }
}

#[async_trait]
impl ChunkWriter for SessionWriter {
    async fn write_chunk(&self, index: usize, reader: &mut ChunkReader) -> Result<u64> {
        self.inner().write_chunk(index, reader).await
    }

    async fn close(&self) -> Result<()> {
        self.inner().close().await
    }

    async fn abort(&self) -> Result<()> {
        self.inner().abort().await
    }

    fn needs_seekable_input(&self) -> bool {
        self.inner().needs_seekable_input()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryFs, MemoryOptions};

    #[test]
    fn test_detect_prefers_native() {
        let fs = MemoryFs::new("mem", MemoryOptions::default().with_chunk_writer(true).with_writer_at(true));
        assert_eq!(WriterKind::detect(&fs).unwrap(), WriterKind::Native);
    }

    #[test]
    fn test_detect_falls_back_to_adapter() {
        let fs = MemoryFs::new("mem", MemoryOptions::default().with_chunk_writer(false).with_writer_at(true));
        assert_eq!(WriterKind::detect(&fs).unwrap(), WriterKind::Adapted);
    }

    #[test]
    fn test_detect_without_capability() {
        let fs = MemoryFs::new("mem", MemoryOptions::default().with_chunk_writer(false).with_writer_at(false));
        let err = WriterKind::detect(&fs).unwrap_err();
        assert!(matches!(err, MultiCopyError::CapabilityMissing(name) if name == "mem"));
    }
}
