//! Chunk writer built on a random-access writer
//!
//! Backends that can only write at arbitrary offsets (local disks, for
//! example) still get parallel chunked copies: each chunk is written at
//! `index * chunk_size` through an [`OffsetWriter`].

use crate::backend::{Fs, Object};
use crate::config::TransferConfig;
use crate::error::{MultiCopyError, Result};
use crate::multipart::{
    calculate_num_chunks, expected_chunk_len, ChunkReader, ChunkWriter, ChunkWriterInfo,
    OffsetWriter, WriterAtCloser,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// Bytes moved per read from the chunk stream
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// [`ChunkWriter`] over a [`WriterAtCloser`]
pub struct WriterAtChunkWriter {
    remote: String,
    size: u64,
    chunk_size: u64,
    chunks: usize,
    writer_at: Box<dyn WriterAtCloser>,
    write_buffer_size: usize,
    fs: Arc<dyn Fs>,
}

impl WriterAtChunkWriter {
    /// Open a random-access writer for `remote` on `dst` and wrap it
    ///
    /// Chunk size, write buffer and concurrency come from `config`.
    pub async fn open(
        dst: Arc<dyn Fs>,
        remote: &str,
        src: &dyn Object,
        config: &TransferConfig,
    ) -> Result<(ChunkWriterInfo, Self)> {
        let opener = dst
            .writer_at_opener()
            .ok_or_else(|| MultiCopyError::CapabilityMissing(dst.name().to_string()))?;
        let size = src
            .size()
            .ok_or_else(|| MultiCopyError::UnknownSize(src.remote().to_string()))?;
        let chunk_size = config.multi_thread_chunk_size;
        if chunk_size == 0 {
            return Err(MultiCopyError::InvalidChunkSize(0));
        }

        let writer_at = opener.open_writer_at(remote, size).await?;

        let write_buffer_size = config.multi_thread_write_buffer_size;
        if write_buffer_size > 0 {
            tracing::debug!(
                "{}: multi-thread copy: write buffer set to {}",
                src.remote(),
                write_buffer_size
            );
        }

        let writer = Self {
            remote: remote.to_string(),
            size,
            chunk_size,
            chunks: calculate_num_chunks(size, chunk_size),
            writer_at,
            write_buffer_size,
            fs: Arc::clone(&dst),
        };
        let info = ChunkWriterInfo {
            chunk_size,
            concurrency: config.multi_thread_streams,
            leave_parts_on_error: false,
        };
        Ok((info, writer))
    }
}

#[async_trait]
impl ChunkWriter for WriterAtChunkWriter {
    async fn write_chunk(&self, index: usize, reader: &mut ChunkReader) -> Result<u64> {
        tracing::debug!("{}: writing chunk {}", self.remote, index);

        let expected = expected_chunk_len(index, self.chunk_size, self.chunks, self.size);
        let base = index as u64 * self.chunk_size;
        let mut writer = OffsetWriter::new(self.writer_at.as_ref(), base, self.write_buffer_size);

        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).await?;
        }
        writer
            .flush()
            .await
            .map_err(|e| e.with_context("multi-thread copy: flush failed"))?;

        let actual = writer.written();
        if actual != expected {
            return Err(MultiCopyError::ChunkSizeMismatch {
                index,
                expected,
                actual,
            });
        }
        Ok(actual)
    }

    async fn close(&self) -> Result<()> {
        self.writer_at.close().await
    }

    async fn abort(&self) -> Result<()> {
        // Release the handle first; the object can't be removed on some platforms while open
        if let Err(e) = self.writer_at.close().await {
            tracing::debug!("{}: closing writer before abort failed: {}", self.remote, e);
        }
        let obj = self.fs.new_object(&self.remote).await.map_err(|e| {
            e.with_context("multi-thread copy: failed to find temp file when aborting chunk writer")
        })?;
        obj.remove().await
    }

    fn needs_seekable_input(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::Account;
    use crate::backend::{BoxedReader, Features, MemoryFs, MemoryObject, MemoryOptions};
    use std::io::Cursor;

    fn config(chunk_size: u64, buffer: usize) -> TransferConfig {
        TransferConfig {
            multi_thread_chunk_size: chunk_size,
            multi_thread_write_buffer_size: buffer,
            ..Default::default()
        }
    }

    fn stream(account: &Arc<Account>, data: Vec<u8>) -> ChunkReader {
        let inner: BoxedReader = Box::new(Cursor::new(data));
        ChunkReader::Stream(account.wrap(inner))
    }

    fn adapter_fs() -> Arc<dyn Fs> {
        Arc::new(MemoryFs::new(
            "mem",
            MemoryOptions::default().with_chunk_writer(false).with_writer_at(true),
        ))
    }

    #[tokio::test]
    async fn test_chunks_land_at_their_offsets() {
        let fs = adapter_fs();
        let src = MemoryObject::detached("src", vec![0u8; 1000], Features::default());
        let (info, writer) = WriterAtChunkWriter::open(Arc::clone(&fs), "dst", &src, &config(300, 0))
            .await
            .unwrap();
        assert_eq!(info.chunk_size, 300);
        assert!(!writer.needs_seekable_input());

        let account = Arc::new(Account::new("dst"));
        // Out of order on purpose
        let n3 = writer.write_chunk(3, &mut stream(&account, vec![b'D'; 100])).await.unwrap();
        let n1 = writer.write_chunk(1, &mut stream(&account, vec![b'B'; 300])).await.unwrap();
        let n0 = writer.write_chunk(0, &mut stream(&account, vec![b'A'; 300])).await.unwrap();
        let n2 = writer.write_chunk(2, &mut stream(&account, vec![b'C'; 300])).await.unwrap();
        assert_eq!(n0 + n1 + n2 + n3, 1000);
        writer.close().await.unwrap();

        let obj = fs.new_object("dst").await.unwrap();
        let mut data = Vec::new();
        obj.open(None).await.unwrap().read_to_end(&mut data).await.unwrap();
        assert_eq!(data.len(), 1000);
        assert_eq!(data[0], b'A');
        assert_eq!(data[300], b'B');
        assert_eq!(data[600], b'C');
        assert_eq!(data[900], b'D');
        assert_eq!(data[999], b'D');
    }

    #[tokio::test]
    async fn test_buffered_writes_match_unbuffered() {
        let fs = adapter_fs();
        let payload: Vec<u8> = (0..250u32).map(|i| (i % 251) as u8).collect();
        let src = MemoryObject::detached("src", payload.clone(), Features::default());
        let (_, writer) = WriterAtChunkWriter::open(Arc::clone(&fs), "dst", &src, &config(100, 7))
            .await
            .unwrap();

        let account = Arc::new(Account::new("dst"));
        for (index, chunk) in payload.chunks(100).enumerate() {
            writer.write_chunk(index, &mut stream(&account, chunk.to_vec())).await.unwrap();
        }
        writer.close().await.unwrap();

        let mut data = Vec::new();
        let obj = fs.new_object("dst").await.unwrap();
        obj.open(None).await.unwrap().read_to_end(&mut data).await.unwrap();
        assert_eq!(data, payload);
    }

    #[tokio::test]
    async fn test_short_chunk_is_rejected() {
        let fs = adapter_fs();
        let src = MemoryObject::detached("src", vec![0u8; 1000], Features::default());
        let (_, writer) = WriterAtChunkWriter::open(Arc::clone(&fs), "dst", &src, &config(300, 0))
            .await
            .unwrap();

        let account = Arc::new(Account::new("dst"));
        let err = writer.write_chunk(1, &mut stream(&account, vec![0; 299])).await.unwrap_err();
        assert!(matches!(
            err,
            MultiCopyError::ChunkSizeMismatch { index: 1, expected: 300, actual: 299 }
        ));
    }

    #[tokio::test]
    async fn test_abort_removes_partial_object() {
        let fs = adapter_fs();
        let src = MemoryObject::detached("src", vec![0u8; 10], Features::default());
        let (_, writer) = WriterAtChunkWriter::open(Arc::clone(&fs), "dst", &src, &config(5, 0))
            .await
            .unwrap();
        let account = Arc::new(Account::new("dst"));
        writer.write_chunk(0, &mut stream(&account, vec![1; 5])).await.unwrap();

        writer.abort().await.unwrap();
        assert!(fs.new_object("dst").await.is_err());
    }

    #[tokio::test]
    async fn test_open_rejects_zero_chunk_size() {
        let fs = adapter_fs();
        let src = MemoryObject::detached("src", vec![0u8; 10], Features::default());
        let result = WriterAtChunkWriter::open(fs, "dst", &src, &config(0, 0)).await;
        assert!(matches!(result, Err(MultiCopyError::InvalidChunkSize(0))));
    }
}
