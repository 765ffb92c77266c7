//! Copying of a single chunk
//!
//! A [`ChunkCopier`] holds what every chunk of one transfer shares and
//! moves one chunk from a ranged source read into the chunk writer.

use crate::accounting::Account;
use crate::backend::Object;
use crate::error::{ChunkStage, MultiCopyError, Result};
use crate::multipart::{ChunkBuffer, ChunkRange, ChunkReader, ChunkWriter};
use std::sync::Arc;

/// Per-transfer state shared by all chunk copies
pub struct ChunkCopier {
    src: Arc<dyn Object>,
    size: u64,
    part_size: u64,
    num_chunks: usize,
    no_seek: bool,
    memory_limit: usize,
    account: Arc<Account>,
}

impl ChunkCopier {
    /// Create a copier for `src` split into `num_chunks` parts of `part_size`
    ///
    /// With `no_seek` set, chunks are streamed straight from the source;
    /// otherwise each is buffered first so the writer can rewind it.
    pub fn new(
        src: Arc<dyn Object>,
        size: u64,
        part_size: u64,
        num_chunks: usize,
        no_seek: bool,
        memory_limit: usize,
        account: Arc<Account>,
    ) -> Self {
        Self {
            src,
            size,
            part_size,
            num_chunks,
            no_seek,
            memory_limit,
            account,
        }
    }

    /// Copy chunk `index` into `writer`
    ///
    /// An index starting at or past the end of the source is a no-op.
    pub async fn copy_chunk(&self, index: usize, writer: &dyn ChunkWriter) -> Result<()> {
        let Some(range) = ChunkRange::for_index(index, self.part_size, self.size) else {
            return Ok(());
        };
        let remote = self.src.remote();
        let in_flight = self.account.begin_chunk();
        tracing::debug!(
            "{}: multi-thread copy: chunk {}/{} ({}-{}) size {}: starting",
            remote,
            index + 1,
            self.num_chunks,
            range.start,
            range.end,
            range.len()
        );

        let fail = |stage: ChunkStage, e: MultiCopyError| {
            tracing::debug!(
                "{}: multi-thread copy: chunk {}/{} failed: {}: {}",
                remote,
                index + 1,
                self.num_chunks,
                stage,
                e
            );
            MultiCopyError::chunk(index, range.start, range.end, stage, e)
        };

        let source = self
            .src
            .open(Some(range.to_range_option()))
            .await
            .map_err(|e| fail(ChunkStage::Open, e))?;

        let mut reader = if self.no_seek {
            ChunkReader::Stream(self.account.wrap(source))
        } else {
            let buffer = ChunkBuffer::fill(source, range.len(), self.memory_limit)
                .await
                .map_err(|e| fail(ChunkStage::Read, e.into()))?;
            ChunkReader::Buffered(self.account.wrap(buffer))
        };

        let written = writer
            .write_chunk(index, &mut reader)
            .await
            .map_err(|e| fail(ChunkStage::Write, e))?;

        in_flight.finish();
        tracing::debug!(
            "{}: multi-thread copy: chunk {}/{} ({}-{}) size {}: finished",
            remote,
            index + 1,
            self.num_chunks,
            range.start,
            range.end,
            written
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Features, MemoryObject};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::io::AsyncReadExt;

    /// Collects chunks in memory and remembers whether they were seekable
    #[derive(Default)]
    struct CollectingWriter {
        chunks: Mutex<Vec<(usize, Vec<u8>, bool)>>,
        fail: bool,
    }

    #[async_trait]
    impl ChunkWriter for CollectingWriter {
        async fn write_chunk(&self, index: usize, reader: &mut ChunkReader) -> Result<u64> {
            if self.fail {
                return Err(MultiCopyError::backend("refused"));
            }
            let seekable = reader.is_seekable();
            let mut data = Vec::new();
            reader.read_to_end(&mut data).await?;
            let n = data.len() as u64;
            self.chunks.lock().unwrap().push((index, data, seekable));
            Ok(n)
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }

        async fn abort(&self) -> Result<()> {
            Ok(())
        }
    }

    fn copier(data: Vec<u8>, part_size: u64, no_seek: bool) -> (ChunkCopier, Arc<Account>) {
        let size = data.len() as u64;
        let src: Arc<dyn Object> = Arc::new(MemoryObject::detached("src", data, Features::default()));
        let account = Arc::new(Account::new("src"));
        let num_chunks = crate::multipart::calculate_num_chunks(size, part_size);
        let copier = ChunkCopier::new(src, size, part_size, num_chunks, no_seek, 1024, Arc::clone(&account));
        (copier, account)
    }

    #[tokio::test]
    async fn test_copies_the_right_range() {
        let data: Vec<u8> = (0..150u8).collect();
        let (copier, account) = copier(data.clone(), 64, false);
        let writer = CollectingWriter::default();

        copier.copy_chunk(2, &writer).await.unwrap();

        let chunks = writer.chunks.lock().unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].0, 2);
        assert_eq!(chunks[0].1, data[128..150].to_vec());
        assert!(chunks[0].2);
        assert_eq!(account.bytes(), 22);
        assert_eq!(account.chunks_done(), 1);
    }

    #[tokio::test]
    async fn test_no_seek_streams_directly() {
        let (copier, _) = copier(vec![3u8; 100], 50, true);
        let writer = CollectingWriter::default();
        copier.copy_chunk(0, &writer).await.unwrap();
        assert!(!writer.chunks.lock().unwrap()[0].2);
    }

    #[tokio::test]
    async fn test_chunk_past_end_is_a_no_op() {
        let (copier, account) = copier(vec![0u8; 150], 64, false);
        let writer = CollectingWriter::default();

        copier.copy_chunk(3, &writer).await.unwrap();
        copier.copy_chunk(99, &writer).await.unwrap();

        assert!(writer.chunks.lock().unwrap().is_empty());
        assert_eq!(account.bytes(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_carries_chunk_context() {
        let (copier, _) = copier(vec![0u8; 150], 64, false);
        let writer = CollectingWriter {
            fail: true,
            ..Default::default()
        };

        let err = copier.copy_chunk(1, &writer).await.unwrap_err();
        match err {
            MultiCopyError::Chunk {
                index,
                start,
                end,
                stage,
                ..
            } => {
                assert_eq!((index, start, end), (1, 64, 128));
                assert_eq!(stage, ChunkStage::Write);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
