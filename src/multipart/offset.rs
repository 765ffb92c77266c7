//! Sequential writer over a random-access handle
//!
//! An [`OffsetWriter`] turns consecutive `write_all` calls into `write_at`
//! calls on a shared [`WriterAtCloser`], starting at a fixed base offset.
//! Small writes are coalesced into a buffer of configurable size.

use crate::error::{MultiCopyError, Result};
use crate::multipart::WriterAtCloser;

/// Writes a byte stream at consecutive offsets from a base
pub struct OffsetWriter<'a> {
    writer_at: &'a dyn WriterAtCloser,
    base: u64,
    offset: u64,
    pending: Vec<u8>,
    capacity: usize,
}

impl<'a> OffsetWriter<'a> {
    /// Write from `base` onwards, buffering up to `buffer_size` bytes
    ///
    /// A `buffer_size` of zero writes straight through.
    pub fn new(writer_at: &'a dyn WriterAtCloser, base: u64, buffer_size: usize) -> Self {
        Self {
            writer_at,
            base,
            offset: base,
            pending: Vec::with_capacity(buffer_size),
            capacity: buffer_size,
        }
    }

    /// Append `buf` to the stream
    pub async fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        if self.capacity == 0 {
            return self.write_through(buf).await;
        }
        while !buf.is_empty() {
            let room = self.capacity - self.pending.len();
            let take = room.min(buf.len());
            self.pending.extend_from_slice(&buf[..take]);
            buf = &buf[take..];
            if self.pending.len() == self.capacity {
                self.flush().await?;
            }
        }
        Ok(())
    }

    /// Write out anything still buffered
    pub async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending);
        let result = self.write_through(&pending).await;
        self.pending = pending;
        self.pending.clear();
        result
    }

    /// Bytes handed to the underlying writer so far
    pub fn written(&self) -> u64 {
        self.offset - self.base
    }

    async fn write_through(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.writer_at.write_at(buf, self.offset).await?;
            if n == 0 {
                return Err(MultiCopyError::from(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    format!("write_at wrote no bytes at offset {}", self.offset),
                )));
            }
            self.offset += n as u64;
            buf = &buf[n..];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every write and optionally caps how much each call accepts
    #[derive(Default)]
    struct RecordingWriterAt {
        writes: Mutex<Vec<(u64, Vec<u8>)>>,
        max_per_call: Option<usize>,
    }

    #[async_trait]
    impl WriterAtCloser for RecordingWriterAt {
        async fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
            let n = self.max_per_call.map_or(buf.len(), |max| max.min(buf.len()));
            self.writes.lock().unwrap().push((offset, buf[..n].to_vec()));
            Ok(n)
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unbuffered_writes_at_consecutive_offsets() {
        let target = RecordingWriterAt::default();
        let mut writer = OffsetWriter::new(&target, 100, 0);
        writer.write_all(b"abc").await.unwrap();
        writer.write_all(b"de").await.unwrap();

        let writes = target.writes.lock().unwrap().clone();
        assert_eq!(writes, vec![(100, b"abc".to_vec()), (103, b"de".to_vec())]);
        assert_eq!(writer.written(), 5);
    }

    #[tokio::test]
    async fn test_buffered_writes_are_coalesced() {
        let target = RecordingWriterAt::default();
        let mut writer = OffsetWriter::new(&target, 10, 4);
        for byte in b"abcdefg" {
            writer.write_all(&[*byte]).await.unwrap();
        }
        assert_eq!(target.writes.lock().unwrap().len(), 1);
        writer.flush().await.unwrap();

        let writes = target.writes.lock().unwrap().clone();
        assert_eq!(writes, vec![(10, b"abcd".to_vec()), (14, b"efg".to_vec())]);
        assert_eq!(writer.written(), 7);
    }

    #[tokio::test]
    async fn test_short_writes_are_retried() {
        let target = RecordingWriterAt {
            max_per_call: Some(2),
            ..Default::default()
        };
        let mut writer = OffsetWriter::new(&target, 0, 0);
        writer.write_all(b"hello").await.unwrap();

        let offsets: Vec<u64> = target.writes.lock().unwrap().iter().map(|(o, _)| *o).collect();
        assert_eq!(offsets, vec![0, 2, 4]);
        assert_eq!(writer.written(), 5);
    }

    #[tokio::test]
    async fn test_zero_length_write_is_an_error() {
        let target = RecordingWriterAt {
            max_per_call: Some(0),
            ..Default::default()
        };
        let mut writer = OffsetWriter::new(&target, 0, 0);
        assert!(writer.write_all(b"x").await.is_err());
    }
}
