//! Rewindable chunk buffer
//!
//! Holds one chunk read fully from the source so the destination can seek
//! back over it. Chunks up to the memory limit stay in RAM; larger ones
//! spill to an anonymous temporary file.

use crate::backend::BoxedReader;
use std::io::{self, Cursor, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWriteExt, ReadBuf};

/// A fully buffered chunk
pub enum ChunkBuffer {
    /// Chunk held in memory
    Memory(Cursor<Vec<u8>>),
    /// Chunk spilled to a temporary file
    Disk(File),
}

impl ChunkBuffer {
    /// Read exactly `size` bytes from `reader`
    ///
    /// Fails with `UnexpectedEof` if the reader ends early.
    pub async fn fill(reader: BoxedReader, size: u64, memory_limit: usize) -> io::Result<Self> {
        let mut limited = reader.take(size);

        if size <= memory_limit as u64 {
            let mut data = Vec::with_capacity(size as usize);
            limited.read_to_end(&mut data).await?;
            if data.len() as u64 != size {
                return Err(short_read(size, data.len() as u64));
            }
            return Ok(Self::Memory(Cursor::new(data)));
        }

        let std_file = tokio::task::spawn_blocking(tempfile::tempfile)
            .await
            .map_err(io::Error::other)??;
        let mut file = File::from_std(std_file);
        let n = tokio::io::copy(&mut limited, &mut file).await?;
        if n != size {
            return Err(short_read(size, n));
        }
        file.flush().await?;
        file.seek(SeekFrom::Start(0)).await?;
        Ok(Self::Disk(file))
    }

    /// Whether the chunk lives in memory
    pub fn is_in_memory(&self) -> bool {
        matches!(self, Self::Memory(_))
    }
}

fn short_read(expected: u64, actual: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("source ended after {} of {} bytes", actual, expected),
    )
}

impl AsyncRead for ChunkBuffer {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Memory(cursor) => Pin::new(cursor).poll_read(cx, buf),
            Self::Disk(file) => Pin::new(file).poll_read(cx, buf),
        }
    }
}

impl AsyncSeek for ChunkBuffer {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        match self.get_mut() {
            Self::Memory(cursor) => Pin::new(cursor).start_seek(position),
            Self::Disk(file) => Pin::new(file).start_seek(position),
        }
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        match self.get_mut() {
            Self::Memory(cursor) => Pin::new(cursor).poll_complete(cx),
            Self::Disk(file) => Pin::new(file).poll_complete(cx),
        }
    }
}
